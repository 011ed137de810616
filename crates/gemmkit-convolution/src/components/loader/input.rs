use gemmkit_common::{Numeric, SharedMemory, UnitPos};
use gemmkit_matmul::components::global::LoaderLayout;

use super::{ConvGeometry, ConvTileLoader, TapWalk, UnitSlot};
use crate::components::{Conv2DGeneralJumpParams, ImplicitGemmConv2DParams};

/// A staged row of the input tile: the receptive field of one output pixel.
#[derive(Debug, Clone, Copy)]
struct PixelRow {
    /// Whether the row is a pixel of a real batch, rows past `M` are not.
    in_batch: bool,
    /// Dilated input coordinates of tap `(0, 0)`.
    ih: isize,
    iw: isize,
    src: isize,
}

/// Input loader of the channel-aligned path.
///
/// Every K step reads `bk` channels of one tap. The source index of each row follows the
/// jumps of [ImplicitGemmConv2DParams], so stepping is one addition per row. Taps falling in
/// the padding are staged as zeros.
#[derive(Debug, Clone)]
pub struct ImplicitInputLoader {
    slot: UnitSlot,
    geometry: ConvGeometry,
    rows: Vec<PixelRow>,
    weight_h: usize,
    weight_w: usize,
    jumps: [isize; 3],
}

impl ImplicitInputLoader {
    /// The loader of `unit` for the tile starting at output pixel `c_row`, reading the
    /// channels of a group from `channel_offset` on.
    pub fn new(
        layout: &LoaderLayout,
        geometry: ConvGeometry,
        gemm: &ImplicitGemmConv2DParams,
        c_row: usize,
        channel_offset: usize,
        unit: UnitPos,
    ) -> Self {
        let slot = UnitSlot::new(layout, unit);
        let [s_n, s_h, s_w] = geometry.in_strides.map(|s| s as isize);
        let [out_h, out_w] = geometry.out_shape;

        // Flipped kernels start at the far corner of the window and walk backwards.
        let start = match geometry.flip {
            true => {
                let [kh, kw] = geometry.kernel_shape;
                let [kdil_h, kdil_w] = geometry.kernel_dilation;
                ((kh - 1) * kdil_h) as isize * s_h + ((kw - 1) * kdil_w) as isize * s_w
            }
            false => 0,
        };

        let rows = (0..slot.n_rows)
            .map(|r| {
                let m = c_row + slot.row(r);
                let n = m / (out_h * out_w);
                let hw = m % (out_h * out_w);
                let ih = geometry.in_origin(0, hw / out_w);
                let iw = geometry.in_origin(1, hw % out_w);

                PixelRow {
                    in_batch: n < geometry.batches,
                    ih,
                    iw,
                    src: n as isize * s_n
                        + ih * s_h
                        + iw * s_w
                        + (channel_offset + slot.bj) as isize
                        + start,
                }
            })
            .collect();

        Self {
            slot,
            geometry,
            rows,
            weight_h: 0,
            weight_w: 0,
            jumps: [gemm.inp_jump_w, gemm.inp_jump_h, gemm.inp_jump_c],
        }
    }
}

impl ConvTileLoader for ImplicitInputLoader {
    fn load<E: Numeric>(
        &self,
        src: &[E],
        dst: &mut SharedMemory<E>,
        remaining_k: Option<usize>,
    ) {
        let g = &self.geometry;
        let dh = (g.flipped_tap(0, self.weight_h) * g.kernel_dilation[0]) as isize;
        let dw = (g.flipped_tap(1, self.weight_w) * g.kernel_dilation[1]) as isize;
        let cols = self.slot.cols(remaining_k);

        for (r, row) in self.rows.iter().enumerate() {
            let ih = row.ih + dh;
            let iw = row.iw + dw;
            let valid = row.in_batch
                && (0..g.in_shape[0] as isize).contains(&ih)
                && (0..g.in_shape[1] as isize).contains(&iw);

            let cols = if valid { cols } else { 0 };
            self.slot.write_row(dst, r, cols, |j| src[(row.src + j as isize) as usize]);
        }
    }

    fn next(&mut self) {
        let [kh, kw] = self.geometry.kernel_shape;
        let [jump_w, jump_h, jump_c] = self.jumps;

        self.weight_w += 1;
        let jump = if self.weight_w < kw {
            jump_w
        } else {
            self.weight_w = 0;
            self.weight_h += 1;
            if self.weight_h < kh {
                jump_h
            } else {
                self.weight_h = 0;
                jump_c
            }
        };

        for row in self.rows.iter_mut() {
            row.src += jump;
        }
    }
}

/// Input loader of the general path.
///
/// Rows are the pixels of one output phase, and the loader only visits the taps contributing
/// to that phase. Channel blocks may be partial, and input dilation is resolved when
/// loading: a tap reads the real pixel `coord / idil` of its dilated coordinate.
#[derive(Debug, Clone)]
pub struct GeneralInputLoader {
    slot: UnitSlot,
    geometry: ConvGeometry,
    rows: Vec<PixelRow>,
    taps: TapWalk,
}

impl GeneralInputLoader {
    /// The loader of `unit` for the tile starting at row `c_row` of the phase whose first
    /// output pixel is `phase`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        layout: &LoaderLayout,
        geometry: ConvGeometry,
        jump: &Conv2DGeneralJumpParams,
        phase: [usize; 2],
        taps: TapWalk,
        c_row: usize,
        channel_offset: usize,
        unit: UnitPos,
    ) -> Self {
        let slot = UnitSlot::new(layout, unit);
        let s_n = geometry.in_strides[0];

        let rows = (0..slot.n_rows)
            .map(|r| {
                let m = c_row + slot.row(r);
                let n = m / jump.adj_out_hw;
                let hw = m % jump.adj_out_hw;
                let oh = jump.out_coord(hw / jump.adj_out_w, jump.f_out_jump_h, phase[0]);
                let ow = jump.out_coord(hw % jump.adj_out_w, jump.f_out_jump_w, phase[1]);

                PixelRow {
                    in_batch: n < geometry.batches,
                    ih: geometry.in_origin(0, oh),
                    iw: geometry.in_origin(1, ow),
                    src: (n * s_n + channel_offset + slot.bj) as isize,
                }
            })
            .collect();

        Self {
            slot,
            geometry,
            rows,
            taps,
        }
    }

    // Real input coordinate of a dilated one, if it is a pixel of the input.
    fn in_coord(&self, dim: usize, dilated: isize) -> Option<usize> {
        let idil = self.geometry.input_dilation[dim] as isize;
        if dilated < 0 || dilated % idil != 0 {
            return None;
        }
        let coord = (dilated / idil) as usize;
        (coord < self.geometry.in_shape[dim]).then_some(coord)
    }
}

impl ConvTileLoader for GeneralInputLoader {
    fn load<E: Numeric>(
        &self,
        src: &[E],
        dst: &mut SharedMemory<E>,
        remaining_k: Option<usize>,
    ) {
        let g = &self.geometry;
        let [_, s_h, s_w] = g.in_strides;
        let dh = (self.taps.tap[0] * g.kernel_dilation[0]) as isize;
        let dw = (self.taps.tap[1] * g.kernel_dilation[1]) as isize;
        let cols = self.slot.cols(remaining_k);

        for (r, row) in self.rows.iter().enumerate() {
            let pixel = match row.in_batch {
                true => self
                    .in_coord(0, row.ih + dh)
                    .zip(self.in_coord(1, row.iw + dw)),
                false => None,
            };

            match pixel {
                Some((ih, iw)) => {
                    let offset = row.src as usize + ih * s_h + iw * s_w + self.taps.channel;
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
