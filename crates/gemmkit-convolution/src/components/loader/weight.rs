use gemmkit_common::{Numeric, SharedMemory, UnitPos};
use gemmkit_matmul::components::global::LoaderLayout;

use super::{ConvGeometry, ConvTileLoader, TapWalk, UnitSlot};

/// Weight loader shared by both paths.
///
/// The B tile is staged transposed: one row per filter, `bk` channels of the current tap.
/// Filters past the group are zero. Flipping happens here only when the input side walks
/// taps in kernel order, which is the case on the general path.
#[derive(Debug, Clone)]
pub struct WeightLoader {
    slot: UnitSlot,
    kernel_shape: [usize; 2],
    strides: [usize; 2],
    flip: bool,
    /// Start of the unit's segment in each staged filter, `None` past the group.
    rows: Vec<Option<usize>>,
    taps: TapWalk,
}

impl WeightLoader {
    /// The loader of `unit` for the tile starting at filter `c_col` of a group of `filters`
    /// filters, the first of which is `filter_offset`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        layout: &LoaderLayout,
        geometry: &ConvGeometry,
        taps: TapWalk,
        flip: bool,
        filters: usize,
        c_col: usize,
        filter_offset: usize,
        unit: UnitPos,
    ) -> Self {
        let slot = UnitSlot::new(layout, unit);
        let [s_o, s_h, s_w] = geometry.weight_strides;

        let rows = (0..slot.n_rows)
            .map(|r| {
                let o = c_col + slot.row(r);
                (o < filters).then(|| (filter_offset + o) * s_o + slot.bj)
            })
            .collect();

        Self {
            slot,
            kernel_shape: geometry.kernel_shape,
            strides: [s_h, s_w],
            flip,
            rows,
            taps,
        }
    }

    fn tap(&self, dim: usize) -> usize {
        match self.flip {
            true => self.kernel_shape[dim] - 1 - self.taps.tap[dim],
            false => self.taps.tap[dim],
        }
    }
}

impl ConvTileLoader for WeightLoader {
    fn load<E: Numeric>(
        &self,
        src: &[E],
        dst: &mut SharedMemory<E>,
        remaining_k: Option<usize>,
    ) {
        let tap = self.tap(0) * self.strides[0] + self.tap(1) * self.strides[1];
        let cols = self.slot.cols(remaining_k);

        for (r, row) in self.rows.iter().enumerate() {
            match row {
                Some(start) => {
                    let offset = start + tap + self.taps.channel;
                    self.slot.write_row(dst, r, cols, |j| src[offset + j]);
                }
                None => self.slot.write_row(dst, r, 0, |_| E::default()),
            }
        }
    }

    fn next(&mut self) {
        self.taps.next();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ConvOptions, ConvParams, loader::CubeConvLoader};
    use gemmkit_common::{Cube, CubeCount, CubeDim, CubePos};
    use pretty_assertions::assert_eq;

    const BK: usize = 8;
    const LD: usize = BK + 4;

    fn cube() -> Cube {
        Cube::new(CubePos::default(), CubeDim::new_planes(1), CubeCount::new(1, 1, 1))
    }

    // 2 groups of 6 filters over 2×2 taps of 12 channels, each weight holding its own index.
    fn setup(flip: bool, c_col: usize, cube: &Cube) -> (CubeConvLoader<WeightLoader>, Vec<f32>) {
        let options = ConvOptions::default().with_groups(2).with_flip(flip);
        let params = ConvParams::new(1, 24, 12, [4, 4], [2, 2], &options).unwrap();
        let geometry = ConvGeometry::new(&params);
        let layout = LoaderLayout::new(16, BK, LD, true, 32);
        let weights = (0..params.weight_len()).map(|v| v as f32).collect();

        let loader = CubeConvLoader::new(cube, |unit| {
            WeightLoader::new(
                &layout,
                &geometry,
                TapWalk::dense(params.kernel_shape, BK),
                flip,
                6,
                c_col,
                6,
                unit,
            )
        });

        (loader, weights)
    }

    // Index of weight (o, h, w, c) in the [12, 2, 2, 12] tensor.
    fn index(o: usize, h: usize, w: usize, c: usize) -> f32 {
        (o * 48 + h * 24 + w * 12 + c) as f32
    }

    #[test]
    fn filters_of_the_group_are_staged_by_row() {
        let cube = cube();
        let (mut loader, weights) = setup(false, 0, &cube);
        let mut smem = cube.shared_memory::<f32>(16 * LD);

        loader.load_unsafe(&weights, &mut smem);
        cube.sync_cube();
        assert_eq!(smem.read(2 * LD + 5), index(6 + 2, 0, 0, 5));
        // Filters past the 6 of the group are zero.
        assert_eq!(smem.read(7 * LD + 5), 0.0);

        // Three taps later, tap (1, 1), the last channels are masked.
        for _ in 0..3 {
            loader.next();
        }
        cube.sync_cube();
        loader.load_safe(&weights, &mut smem, 3);
        cube.sync_cube();
        assert_eq!(smem.read(LD + 2), index(7, 1, 1, 2));
        assert_eq!(smem.read(LD + 3), 0.0);

        // Then back to tap (0, 0) for the second channel block.
        loader.next();
        cube.sync_cube();
        loader.load_unsafe(&weights, &mut smem);
        cube.sync_cube();
        assert_eq!(smem.read(LD + 2), index(7, 0, 0, 8 + 2));
    }

    #[test]
    fn flipped_taps_read_the_mirrored_weight() {
        let cube = cube();
        let (loader, weights) = setup(true, 0, &cube);
        let mut smem = cube.shared_memory::<f32>(16 * LD);

        loader.load_unsafe(&weights, &mut smem);
        cube.sync_cube();
        assert_eq!(smem.read(4), index(6, 1, 1, 4));
    }
}
