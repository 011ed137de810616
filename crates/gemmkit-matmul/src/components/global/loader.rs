use core::marker::PhantomData;
use derive_new::new;
use gemmkit_common::{Cube, Numeric, SharedMemory, UnitPos};

use crate::components::{FormattedConfigError, MatmulSetupError, tile::TileDims};

/// How the units of a cube split the staging of a `brows×bcols` tile.
///
/// Each unit copies `vec_size` consecutive elements of a row, `tcols` units cover a row and
/// the cube covers `trows` rows per pass.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderLayout {
    pub brows: usize,
    pub bcols: usize,
    /// Leading dimension of the destination in shared memory.
    pub dst_ld: usize,
    /// Whether the reduction dimension runs along the columns of the tile.
    pub reduction_contiguous: bool,
    pub num_units: usize,
}

impl LoaderLayout {
    pub fn vec_size(&self) -> usize {
        (self.brows * self.bcols) / self.num_units
    }

    pub fn tcols(&self) -> usize {
        self.bcols / self.vec_size()
    }

    pub fn trows(&self) -> usize {
        self.num_units / self.tcols()
    }

    pub fn n_rows(&self) -> usize {
        self.brows.div_ceil(self.trows())
    }

    /// Checks that every unit copies the same number of whole row segments.
    pub fn validate(&self) -> Result<(), MatmulSetupError> {
        let layout = *self;
        let tile = self.brows * self.bcols;

        if tile < self.num_units || tile % self.num_units != 0 {
            return Err(FormattedConfigError::new(move || {
                format!(
                    "A {}x{} tile can't be split evenly between {} units",
                    layout.brows, layout.bcols, layout.num_units
                )
            })
            .into());
        }

        if self.bcols % self.vec_size() != 0
            || self.num_units % self.tcols() != 0
            || self.brows % self.trows() != 0
        {
            return Err(FormattedConfigError::new(move || {
                format!(
                    "Units can't copy whole row segments of a {}x{} tile with {} elements each",
                    layout.brows,
                    layout.bcols,
                    layout.vec_size()
                )
            })
            .into());
        }

        Ok(())
    }
}

/// Copies one unit's share of an operand tile from global to shared memory.
///
/// The assignment is computed once; [next](TileLoader::next) moves the source window by one
/// K step so the same loader serves the whole reduction.
#[derive(Debug, Clone)]
pub struct TileLoader<E> {
    layout: LoaderLayout,
    src_ld: usize,
    tile_stride: usize,
    bi: usize,
    bj: usize,
    src: usize,
    dst: usize,
    _elem: PhantomData<E>,
}

impl<E: Numeric> TileLoader<E> {
    /// A loader for `unit`, whose tile starts at `src_offset` in a matrix of leading
    /// dimension `src_ld`.
    pub fn new(layout: LoaderLayout, src_offset: usize, src_ld: usize, unit: UnitPos) -> Self {
        let thread_idx = unit.absolute() as usize;
        let tcols = layout.tcols();
        let bi = thread_idx / tcols;
        let bj = layout.vec_size() * (thread_idx % tcols);

        Self {
            layout,
            src_ld,
            tile_stride: match layout.reduction_contiguous {
                true => layout.bcols,
                false => layout.brows * src_ld,
            },
            bi,
            bj,
            src: src_offset + bi * src_ld + bj,
            dst: bi * layout.dst_ld + bj,
            _elem: PhantomData,
        }
    }

    /// Copies the unit's elements without bounds checks.
    pub fn load_unsafe(&self, src: &[E], dst: &mut SharedMemory<E>) {
        for i in (0..self.layout.brows).step_by(self.layout.trows()) {
            for j in 0..self.layout.vec_size() {
                dst.write(
                    self.dst + i * self.layout.dst_ld + j,
                    src[self.src + i * self.src_ld + j],
                );
            }
        }
    }

    /// Copies the unit's elements that lie within `dims` of the tile origin, and writes zeros
    /// everywhere else.
    pub fn load_safe(&self, src: &[E], dst: &mut SharedMemory<E>, dims: TileDims) {
        if dims.rows <= self.bi || dims.cols <= self.bj {
            for i in (0..self.layout.brows).step_by(self.layout.trows()) {
                for j in 0..self.layout.vec_size() {
                    dst.write(self.dst + i * self.layout.dst_ld + j, E::zero());
                }
            }
            return;
        }

        let rows = dims.rows - self.bi;
        let cols = dims.cols - self.bj;

        for i in (0..self.layout.brows).step_by(self.layout.trows()) {
            for j in 0..self.layout.vec_size() {
                let value = match i < rows && j < cols {
                    true => src[self.src + i * self.src_ld + j],
                    false => E::zero(),
                };
                dst.write(self.dst + i * self.layout.dst_ld + j, value);
            }
        }
    }

    /// Transforms the unit's staged elements in place.
    pub fn apply_inplace_op(&self, dst: &mut SharedMemory<E>, op: impl Fn(E) -> E) {
        for i in (0..self.layout.brows).step_by(self.layout.trows()) {
            for j in 0..self.layout.vec_size() {
                dst.update(self.dst + i * self.layout.dst_ld + j, &op);
            }
        }
    }

    /// Moves the source window to the next K step.
    pub fn next(&mut self) {
        self.src += self.tile_stride;
    }
}

/// The loaders of every unit of a cube, run together.
#[derive(Debug, Clone)]
pub struct CubeTileLoader<E> {
    units: Vec<TileLoader<E>>,
}

impl<E: Numeric> CubeTileLoader<E> {
    pub fn new(layout: LoaderLayout, src_offset: usize, src_ld: usize, cube: &Cube) -> Self {
        Self {
            units: cube
                .units()
                .map(|unit| TileLoader::new(layout, src_offset, src_ld, unit))
                .collect(),
        }
    }

    pub fn load_unsafe(&self, src: &[E], dst: &mut SharedMemory<E>) {
        for loader in self.units.iter() {
            loader.load_unsafe(src, dst);
        }
    }

    pub fn load_safe(&self, src: &[E], dst: &mut SharedMemory<E>, dims: TileDims) {
        for loader in self.units.iter() {
            loader.load_safe(src, dst, dims);
        }
    }

    pub fn apply_inplace_op(&self, dst: &mut SharedMemory<E>, op: impl Fn(E) -> E) {
        for loader in self.units.iter() {
            loader.apply_inplace_op(dst, &op);
        }
    }

    pub fn next(&mut self) {
        for loader in self.units.iter_mut() {
            loader.next();
        }
    }
}
