use gemmkit_common::{Numeric, PLANE_DIM, SharedMemory};

use super::{FRAGMENT_ELEMS_PER_LANE, FRAGMENT_SIZE, Fragment, Strided, TileDims, fragment_coord};
use crate::components::{Epilogue, GemmConfig, MatmulPrecision, TransformNone};

/// Where the fragments of one plane sit in the cube's output tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneGeometry {
    /// Row of the plane's first fragment.
    pub tm: usize,
    /// Column of the plane's first fragment.
    pub tn: usize,
    /// Fragments along m.
    pub frags_m: usize,
    /// Fragments along n.
    pub frags_n: usize,
    /// Rows between two fragments of the plane.
    pub tm_stride: usize,
    /// Columns between two fragments of the plane.
    pub tn_stride: usize,
}

/// One element of the accumulator, as seen by the lane holding it.
#[derive(Debug, Clone, Copy)]
pub struct FragmentElement {
    /// Index of the fragment in the plane, row-major over `frags_m × frags_n`.
    pub frag: usize,
    pub fm: usize,
    pub fn_: usize,
    /// Row in the cube tile.
    pub row: usize,
    /// Column in the cube tile.
    pub col: usize,
}

impl PlaneGeometry {
    pub fn new(config: &GemmConfig, plane: u32) -> Self {
        let tiling = config.tiling();
        let plane = plane as usize;

        Self {
            tm: FRAGMENT_SIZE * (plane / tiling.wn),
            tn: FRAGMENT_SIZE * (plane % tiling.wn),
            frags_m: tiling.tm(),
            frags_n: tiling.tn(),
            tm_stride: FRAGMENT_SIZE * tiling.wm,
            tn_stride: FRAGMENT_SIZE * tiling.wn,
        }
    }

    /// Visits, lane by lane, every accumulator element of the plane.
    ///
    /// With `bounds`, a lane whose origin is outside skips everything, and the others skip
    /// fragment rows and columns past the bounds.
    pub fn for_each_element(&self, bounds: Option<TileDims>, mut func: impl FnMut(FragmentElement)) {
        for lane in 0..PLANE_DIM {
            let (sm, sn) = fragment_coord(lane);
            let (row0, col0) = (self.tm + sm, self.tn + sn);

            let (rows, cols) = match bounds {
                Some(dims) => {
                    if dims.rows <= row0 || dims.cols <= col0 {
                        continue;
                    }
                    (dims.rows - row0, dims.cols - col0)
                }
                None => (usize::MAX, usize::MAX),
            };

            for i in 0..self.frags_m {
                if i * self.tm_stride >= rows {
                    continue;
                }
                for j in 0..self.frags_n {
                    for e in 0..FRAGMENT_ELEMS_PER_LANE {
                        if j * self.tn_stride + e >= cols {
                            continue;
                        }
                        func(FragmentElement {
                            frag: i * self.frags_n + j,
                            fm: sm,
                            fn_: sn + e,
                            row: row0 + i * self.tm_stride,
                            col: col0 + j * self.tn_stride + e,
                        });
                    }
                }
            }
        }
    }
}

/// Multiply-accumulate of one plane over staged tiles.
///
/// The plane owns `frags_m × frags_n` accumulator fragments in `MP::EA`. Each K step loads one
/// column of A fragments and one row of B fragments from shared memory, then multiplies every
/// pair. Results are cast to the output type only when stored.
pub struct WarpMma<MP: MatmulPrecision, Ep: Epilogue<MP::EA> = TransformNone> {
    geometry: PlaneGeometry,
    bk: usize,
    a_str_m: usize,
    a_str_k: usize,
    b_str_k: usize,
    b_str_n: usize,
    a_frags: Vec<Fragment<MP::EA>>,
    b_frags: Vec<Fragment<MP::EA>>,
    acc: Vec<Fragment<MP::EA>>,
    epilogue: Ep,
}

impl<MP: MatmulPrecision> WarpMma<MP, TransformNone> {
    pub fn new(config: &GemmConfig, plane: u32) -> Self {
        Self::with_epilogue(config, plane, TransformNone)
    }
}

impl<MP: MatmulPrecision, Ep: Epilogue<MP::EA>> WarpMma<MP, Ep> {
    /// A plane whose stores go through `epilogue`.
    pub fn with_epilogue(config: &GemmConfig, plane: u32, epilogue: Ep) -> Self {
        let geometry = PlaneGeometry::new(config, plane);
        let (lda, ldb) = (config.lda_tgp(), config.ldb_tgp());
        let (a_str_m, a_str_k) = match config.transpose_a() {
            true => (1, lda),
            false => (lda, 1),
        };
        let (b_str_k, b_str_n) = match config.transpose_b() {
            true => (1, ldb),
            false => (ldb, 1),
        };

        Self {
            geometry,
            bk: config.tiling().bk,
            a_str_m,
            a_str_k,
            b_str_k,
            b_str_n,
            a_frags: vec![Fragment::zeros(); geometry.frags_m],
            b_frags: vec![Fragment::zeros(); geometry.frags_n],
            acc: vec![Fragment::zeros(); geometry.frags_m * geometry.frags_n],
            epilogue,
        }
    }

    pub fn geometry(&self) -> &PlaneGeometry {
        &self.geometry
    }

    /// Accumulates the product of the staged tiles.
    pub fn mma(&mut self, a_s: &SharedMemory<MP::EI>, b_s: &SharedMemory<MP::EI>) {
        let g = self.geometry;

        for kk in (0..self.bk).step_by(FRAGMENT_SIZE) {
            for lane in 0..PLANE_DIM {
                let (sm, sn) = fragment_coord(lane);

                for e in 0..FRAGMENT_ELEMS_PER_LANE {
                    for (i, frag) in self.a_frags.iter_mut().enumerate() {
                        let row = g.tm + i * g.tm_stride + sm;
                        let index = row * self.a_str_m + (kk + sn + e) * self.a_str_k;
                        frag.set(sm, sn + e, a_s.read(index).cast());
                    }
                    for (j, frag) in self.b_frags.iter_mut().enumerate() {
                        let col = g.tn + j * g.tn_stride + sn + e;
                        let index = (kk + sm) * self.b_str_k + col * self.b_str_n;
                        frag.set(sm, sn + e, b_s.read(index).cast());
                    }
                }
            }

            for i in 0..g.frags_m {
                for n in 0..g.frags_n {
                    let j = match i % 2 {
                        0 => n,
                        _ => g.frags_n - 1 - n,
                    };
                    self.acc[i * g.frags_n + j].mma(&self.a_frags[i], &self.b_frags[j]);
                }
            }
        }
    }

    /// Applies `op` to every accumulator in place.
    pub fn apply_epilogue<Op: Epilogue<MP::EA>>(&mut self, op: Op) {
        let acc = &mut self.acc;
        self.geometry.for_each_element(None, |elem| {
            let frag = &mut acc[elem.frag];
            frag.set(elem.fm, elem.fn_, op.apply(frag.get(elem.fm, elem.fn_)));
        });
    }

    /// Combines every accumulator with the matching element of `c`.
    pub fn apply_epilogue_with<EC: Numeric, Op: Epilogue<MP::EA>>(
        &mut self,
        c: &[EC],
        c_layout: Strided,
        op: Op,
    ) {
        self.combine(c, c_layout, None, op);
    }

    /// Same as [apply_epilogue_with](Self::apply_epilogue_with), reading `c` only within `dims`.
    pub fn apply_epilogue_with_safe<EC: Numeric, Op: Epilogue<MP::EA>>(
        &mut self,
        c: &[EC],
        c_layout: Strided,
        dims: TileDims,
        op: Op,
    ) {
        self.combine(c, c_layout, Some(dims), op);
    }

    /// Writes the whole output tile.
    pub fn store_result<O: Numeric>(&self, d: &mut [O], d_layout: Strided) {
        self.store(d, d_layout, None);
    }

    /// Writes the part of the output tile within `dims`.
    pub fn store_result_safe<O: Numeric>(&self, d: &mut [O], d_layout: Strided, dims: TileDims) {
        self.store(d, d_layout, Some(dims));
    }

    /// Writes the elements within `bounds` to the positions `index` maps them to.
    ///
    /// `index` takes the row and column of an element in the cube tile and returns `None`
    /// for elements that must not be written. This serves outputs that are not a strided
    /// window, such as the pixels of an implicit convolution.
    pub fn store_result_indexed<O: Numeric>(
        &self,
        d: &mut [O],
        bounds: Option<TileDims>,
        index: impl Fn(usize, usize) -> Option<usize>,
    ) {
        self.geometry.for_each_element(bounds, |elem| {
            if let Some(at) = index(elem.row, elem.col) {
                let value = self.acc[elem.frag].get(elem.fm, elem.fn_);
                d[at] = self.epilogue.apply(value).cast();
            }
        });
    }

    /// Writes `op(acc, c)` for the whole tile, without updating the accumulators.
    pub fn store_result_with<O: Numeric, EC: Numeric, Op: Epilogue<MP::EA>>(
        &self,
        d: &mut [O],
        d_layout: Strided,
        c: &[EC],
        c_layout: Strided,
        op: Op,
    ) {
        self.store_with(d, d_layout, c, c_layout, None, op);
    }

    /// Same as [store_result_with](Self::store_result_with), within `dims`.
    pub fn store_result_with_safe<O: Numeric, EC: Numeric, Op: Epilogue<MP::EA>>(
        &self,
        d: &mut [O],
        d_layout: Strided,
        c: &[EC],
        c_layout: Strided,
        dims: TileDims,
        op: Op,
    ) {
        self.store_with(d, d_layout, c, c_layout, Some(dims), op);
    }

    fn combine<EC: Numeric, Op: Epilogue<MP::EA>>(
        &mut self,
        c: &[EC],
        c_layout: Strided,
        bounds: Option<TileDims>,
        op: Op,
    ) {
        let acc = &mut self.acc;
        self.geometry.for_each_element(bounds, |elem| {
            let frag = &mut acc[elem.frag];
            let source = c[c_layout.index(elem.row, elem.col)].cast();
            frag.set(
                elem.fm,
                elem.fn_,
                op.apply_with(frag.get(elem.fm, elem.fn_), source),
            );
        });
    }

    fn store<O: Numeric>(&self, d: &mut [O], d_layout: Strided, bounds: Option<TileDims>) {
        self.geometry.for_each_element(bounds, |elem| {
            let value = self.acc[elem.frag].get(elem.fm, elem.fn_);
            d[d_layout.index(elem.row, elem.col)] = self.epilogue.apply(value).cast();
        });
    }

    fn store_with<O: Numeric, EC: Numeric, Op: Epilogue<MP::EA>>(
        &self,
        d: &mut [O],
        d_layout: Strided,
        c: &[EC],
        c_layout: Strided,
        bounds: Option<TileDims>,
        op: Op,
    ) {
        self.geometry.for_each_element(bounds, |elem| {
            let value = self.acc[elem.frag].get(elem.fm, elem.fn_);
            let source = c[c_layout.index(elem.row, elem.col)].cast();
            d[d_layout.index(elem.row, elem.col)] = op.apply_with(value, source).cast();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{TilingScheme, TransformAxpby, TransformScale};
    use gemmkit_common::{Cube, CubeCount, CubeDim, CubePos};
    use pretty_assertions::assert_eq;

    fn cube() -> Cube {
        Cube::new(CubePos::default(), CubeDim::new_planes(1), CubeCount::new(1, 1, 1))
    }

    // Stages a 16×8 A (row i filled with i) and an 8×16 B identity-like tile, then runs one step.
    fn staged(config: &GemmConfig, cube: &Cube) -> (SharedMemory<f32>, SharedMemory<f32>) {
        let mut a_s = cube.shared_memory::<f32>(config.a_shared_len());
        let mut b_s = cube.shared_memory::<f32>(config.b_shared_len());

        for i in 0..16 {
            for k in 0..8 {
                a_s.write(i * config.lda_tgp() + k, i as f32);
            }
        }
        for k in 0..8 {
            for j in 0..16 {
                b_s.write(k * config.ldb_tgp() + j, if j % 8 == k { 1.0 } else { 0.0 });
            }
        }
        cube.sync_cube();

        (a_s, b_s)
    }

    fn config() -> GemmConfig {
        GemmConfig::new::<f32>(TilingScheme::new(16, 16, 8, 1, 1), false, false, (16, 16, 8))
            .unwrap()
    }

    #[test]
    fn one_step_matches_product() {
        let config = config();
        let cube = cube();
        let (a_s, b_s) = staged(&config, &cube);
        let mut mma = WarpMma::<f32>::new(&config, 0);

        mma.mma(&a_s, &b_s);
        let mut out = vec![0.0f32; 16 * 16];
        mma.store_result(&mut out, Strided::row_major(0, 16));

        for i in 0..16 {
            for j in 0..16 {
                assert_eq!(out[i * 16 + j], i as f32, "at ({i}, {j})");
            }
        }
    }

    #[test]
    fn safe_store_leaves_out_of_bounds_untouched() {
        let config = config();
        let cube = cube();
        let (a_s, b_s) = staged(&config, &cube);
        let mut mma = WarpMma::<f32>::new(&config, 0);

        mma.mma(&a_s, &b_s);
        let mut out = vec![-1.0f32; 16 * 16];
        mma.store_result_safe(&mut out, Strided::row_major(0, 16), TileDims::new(11, 5));

        for i in 0..16 {
            for j in 0..16 {
                let expected = if i < 11 && j < 5 { i as f32 } else { -1.0 };
                assert_eq!(out[i * 16 + j], expected, "at ({i}, {j})");
            }
        }
    }

    #[test]
    fn store_applies_kernel_epilogue() {
        let config = config();
        let cube = cube();
        let (a_s, b_s) = staged(&config, &cube);
        let mut mma = WarpMma::<f32, _>::with_epilogue(&config, 0, TransformScale::new(2.0f32));

        mma.mma(&a_s, &b_s);
        let mut out = vec![0.0f32; 16 * 16];
        mma.store_result(&mut out, Strided::row_major(0, 16));

        assert_eq!(out[3 * 16 + 7], 6.0);
    }

    #[test]
    fn fused_source_matches_in_place_epilogue() {
        let config = config();
        let cube = cube();
        let (a_s, b_s) = staged(&config, &cube);
        let c: Vec<f32> = (0..16 * 16).map(|v| v as f32).collect();
        let c_layout = Strided::row_major(0, 16);
        let op = TransformAxpby::new(2.0f32, 0.5);

        let mut fused = WarpMma::<f32>::new(&config, 0);
        fused.mma(&a_s, &b_s);
        let mut out_fused = vec![0.0f32; 16 * 16];
        fused.store_result_with(&mut out_fused, c_layout, &c, c_layout, op);

        let mut in_place = WarpMma::<f32>::new(&config, 0);
        in_place.mma(&a_s, &b_s);
        in_place.apply_epilogue_with(&c, c_layout, op);
        let mut out = vec![0.0f32; 16 * 16];
        in_place.store_result(&mut out, c_layout);

        assert_eq!(out_fused, out);
        assert_eq!(out[2 * 16 + 3], 2.0 * 2.0 + 0.5 * 35.0);
    }

    #[test]
    fn safe_fused_store_after_in_place_scale() {
        let config = config();
        let cube = cube();
        let (a_s, b_s) = staged(&config, &cube);
        let c = vec![1.0f32; 16 * 16];
        let layout = Strided::row_major(0, 16);

        let mut mma = WarpMma::<f32>::new(&config, 0);
        mma.mma(&a_s, &b_s);
        mma.apply_epilogue(TransformScale::new(3.0f32));
        let mut out = vec![-1.0f32; 16 * 16];
        mma.store_result_with_safe(
            &mut out,
            layout,
            &c,
            layout,
            TileDims::new(9, 14),
            TransformAxpby::new(1.0f32, 2.0),
        );

        for i in 0..16 {
            for j in 0..16 {
                let expected = if i < 9 && j < 14 { 3.0 * i as f32 + 2.0 } else { -1.0 };
                assert_eq!(out[i * 16 + j], expected, "at ({i}, {j})");
            }
        }
    }

    #[test]
    fn indexed_store_skips_unmapped_elements() {
        let config = config();
        let cube = cube();
        let (a_s, b_s) = staged(&config, &cube);
        let mut mma = WarpMma::<f32>::new(&config, 0);

        mma.mma(&a_s, &b_s);
        // Odd rows are dropped, even rows land transposed.
        let mut out = vec![-1.0f32; 16 * 16];
        mma.store_result_indexed(&mut out, Some(TileDims::new(16, 12)), |row, col| {
            (row % 2 == 0).then_some(col * 16 + row)
        });

        for i in 0..16 {
            for j in 0..16 {
                let expected = if i % 2 == 0 && j < 12 { i as f32 } else { -1.0 };
                assert_eq!(out[j * 16 + i], expected, "at ({i}, {j})");
            }
        }
    }

    #[test]
    fn transposed_b_reads_columns() {
        let config =
            GemmConfig::new::<f32>(TilingScheme::new(8, 8, 8, 1, 1), false, true, (8, 8, 8))
                .unwrap();
        let cube = cube();
        let mut a_s = cube.shared_memory::<f32>(config.a_shared_len());
        let mut b_s = cube.shared_memory::<f32>(config.b_shared_len());

        // A = I, B staged as Bᵀ (n rows of k), with B[k][n] = 10·k + n.
        for i in 0..8 {
            for k in 0..8 {
                a_s.write(i * config.lda_tgp() + k, if i == k { 1.0 } else { 0.0 });
                b_s.write(i * config.ldb_tgp() + k, (10 * k + i) as f32);
            }
        }
        cube.sync_cube();

        let mut mma = WarpMma::<f32>::new(&config, 0);
        mma.mma(&a_s, &b_s);
        let mut out = vec![0.0f32; 64];
        mma.store_result(&mut out, Strided::row_major(0, 8));

        assert_eq!(out[3 * 8 + 5], 35.0);
    }
}
