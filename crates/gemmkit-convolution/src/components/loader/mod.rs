//! Loaders staging implicit GEMM operands straight from the convolution tensors.
//!
//! Units split a tile the same way the GEMM [LoaderLayout] does. What differs is the source:
//! every staged row of the input tile is one output pixel, and [next](ConvTileLoader::next)
//! moves it to the next kernel tap instead of following a flat stride.
mod input;
mod weight;

pub use input::*;
pub use weight::*;

use gemmkit_common::{Cube, Numeric, SharedMemory, UnitPos};
use gemmkit_matmul::components::global::LoaderLayout;

use crate::components::ConvParams;

/// One unit's share of an implicit operand tile.
pub trait ConvTileLoader {
    /// Stages the unit's elements. With `remaining_k`, only the first `remaining_k` channels
    /// of the current channel block are read and the rest of the block is zero.
    fn load<E: Numeric>(
        &self,
        src: &[E],
        dst: &mut SharedMemory<E>,
        remaining_k: Option<usize>,
    );

    /// Moves to the next K step.
    fn next(&mut self);
}

/// The loaders of every unit of a cube, run together.
#[derive(Debug, Clone)]
pub struct CubeConvLoader<L> {
    units: Vec<L>,
}

impl<L: ConvTileLoader> CubeConvLoader<L> {
    pub fn new(cube: &Cube, unit_loader: impl FnMut(UnitPos) -> L) -> Self {
        Self {
            units: cube.units().map(unit_loader).collect(),
        }
    }

    pub fn load_unsafe<E: Numeric>(&self, src: &[E], dst: &mut SharedMemory<E>) {
        for loader in self.units.iter() {
            loader.load(src, dst, None);
        }
    }

    pub fn load_safe<E: Numeric>(
        &self,
        src: &[E],
        dst: &mut SharedMemory<E>,
        remaining_k: usize,
    ) {
        for loader in self.units.iter() {
            loader.load(src, dst, Some(remaining_k));
        }
    }

    pub fn next(&mut self) {
        for loader in self.units.iter_mut() {
            loader.next();
        }
    }
}

/// The spatial geometry the loaders need, copied out of [ConvParams].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub batches: usize,
    pub in_shape: [usize; 2],
    pub out_shape: [usize; 2],
    pub kernel_shape: [usize; 2],
    pub stride: [usize; 2],
    pub padding: [usize; 2],
    pub kernel_dilation: [usize; 2],
    pub input_dilation: [usize; 2],
    /// Input strides of the batch, row and column dimensions.
    pub in_strides: [usize; 3],
    /// Weight strides of the filter, row and column dimensions.
    pub weight_strides: [usize; 3],
    pub flip: bool,
}

impl ConvGeometry {
    pub fn new(params: &ConvParams<2>) -> Self {
        Self {
            batches: params.batches,
            in_shape: params.in_shape,
            out_shape: params.out_shape,
            kernel_shape: params.kernel_shape,
            stride: params.stride,
            padding: params.padding,
            kernel_dilation: params.kernel_dilation,
            input_dilation: params.input_dilation,
            in_strides: [
                params.in_strides[0],
                params.in_strides[1],
                params.in_strides[2],
            ],
            weight_strides: [
                params.weight_strides[0],
                params.weight_strides[1],
                params.weight_strides[2],
            ],
            flip: params.flip,
        }
    }

    /// The weight tap applied at step `t` of the sweep along `dim`.
    pub fn flipped_tap(&self, dim: usize, t: usize) -> usize {
        match self.flip {
            true => self.kernel_shape[dim] - 1 - t,
            false => t,
        }
    }

    /// First dilated input coordinate read by output `out` along `dim`, before any tap.
    pub fn in_origin(&self, dim: usize, out: usize) -> isize {
        (out * self.stride[dim]) as isize - self.padding[dim] as isize
    }
}

/// Where a unit stages its elements in the tile.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UnitSlot {
    pub bi: usize,
    pub bj: usize,
    pub dst: usize,
    pub trows: usize,
    pub n_rows: usize,
    pub vec_size: usize,
    pub dst_ld: usize,
}

impl UnitSlot {
    pub fn new(layout: &LoaderLayout, unit: UnitPos) -> Self {
        let thread_idx = unit.absolute() as usize;
        let tcols = layout.tcols();
        let bi = thread_idx / tcols;
        let bj = layout.vec_size() * (thread_idx % tcols);

        Self {
            bi,
            bj,
            dst: bi * layout.dst_ld + bj,
            trows: layout.trows(),
            n_rows: layout.n_rows(),
            vec_size: layout.vec_size(),
            dst_ld: layout.dst_ld,
        }
    }

    /// Tile row of the unit's `r`-th staged row.
    pub fn row(&self, r: usize) -> usize {
        self.bi + r * self.trows
    }

    /// Elements of the unit's row segment to read, given the channels left in the block.
    pub fn cols(&self, remaining_k: Option<usize>) -> usize {
        match remaining_k {
            Some(k) => k.saturating_sub(self.bj).min(self.vec_size),
            None => self.vec_size,
        }
    }

    /// Writes the unit's `r`-th row segment, `read(j)` giving element `j` or zero past `cols`.
    pub fn write_row<E: Numeric>(
        &self,
        dst: &mut SharedMemory<E>,
        r: usize,
        cols: usize,
        read: impl Fn(usize) -> E,
    ) {
        let start = self.dst + r * self.trows * self.dst_ld;
        for j in 0..self.vec_size {
            let value = match j < cols {
                true => read(j),
                false => E::zero(),
            };
            dst.write(start + j, value);
        }
    }
}

/// Sweep over the contributing taps of a kernel, kernel width fastest, then over channel
/// blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapWalk {
    base: [usize; 2],
    jump: [usize; 2],
    kernel: [usize; 2],
    bk: usize,
    /// Current tap, before any flip.
    pub tap: [usize; 2],
    /// First channel of the current block.
    pub channel: usize,
}

impl TapWalk {
    /// Taps `base + i·jump` of every dimension.
    pub fn new(base: [usize; 2], jump: [usize; 2], kernel: [usize; 2], bk: usize) -> Self {
        Self {
            base,
            jump,
            kernel,
            bk,
            tap: base,
            channel: 0,
        }
    }

    /// Every tap of the kernel.
    pub fn dense(kernel: [usize; 2], bk: usize) -> Self {
        Self::new([0, 0], [1, 1], kernel, bk)
    }

    pub fn next(&mut self) {
        self.tap[1] += self.jump[1];
        if self.tap[1] < self.kernel[1] {
            return;
        }
        self.tap[1] = self.base[1];

        self.tap[0] += self.jump[0];
        if self.tap[0] < self.kernel[0] {
            return;
        }
        self.tap[0] = self.base[0];

        self.channel += self.bk;
    }
}
