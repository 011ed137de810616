use core::fmt::Debug;
use gemmkit_common::{Numeric, index::elem_to_loc};
use half::{bf16, f16};

/// Value stored in a block mask.
///
/// A `bool` only gates its block. A numeric value gates on non-zero and also scales the
/// block it lets through.
pub trait MaskElement: Copy + Debug + Send + Sync + 'static {
    /// Whether the value scales the block.
    const MULTIPLICATIVE: bool;

    fn is_set(&self) -> bool;

    /// Scale applied to the block, `1` for gating masks.
    fn scale<A: Numeric>(&self) -> A;
}

impl MaskElement for bool {
    const MULTIPLICATIVE: bool = false;

    fn is_set(&self) -> bool {
        *self
    }

    fn scale<A: Numeric>(&self) -> A {
        A::one()
    }
}

macro_rules! impl_numeric_mask {
    ($($ty:ty),*) => {
        $(
            impl MaskElement for $ty {
                const MULTIPLICATIVE: bool = true;

                fn is_set(&self) -> bool {
                    self.to_f64() != 0.0
                }

                fn scale<A: Numeric>(&self) -> A {
                    self.cast()
                }
            }
        )*
    };
}

impl_numeric_mask!(f16, bf16, f32, f64, i32);

/// Masking applied to one operand of a masked GEMV.
///
/// [NoMask] disables masking at compile time. [BlockMask] holds one value per square block
/// of the operand.
pub trait BlockMasking: Clone + Debug + Send + Sync {
    /// Whether the operand is masked at all.
    const ENABLED: bool;
    /// Whether the mask scales the blocks it lets through.
    const MULTIPLICATIVE: bool;

    /// Gate and scale of the block at `(row, col)` in block units, offset by the batch.
    ///
    /// `None` when the block is masked out.
    fn block<A: Numeric>(&self, batch_offset: usize, row: usize, col: usize) -> Option<A>;

    /// Side of a block, if masked.
    fn block_size(&self) -> Option<usize>;

    /// Offset of batch `z`.
    fn batch_offset(&self, z: usize, batch_shape: &[usize]) -> usize;

    /// Number of mask elements needed to cover a `rows×cols` grid of blocks for every batch.
    fn required_len(&self, grid: (usize, usize), batch_shape: &[usize]) -> usize;

    /// Number of mask elements provided.
    fn num_elems(&self) -> usize;

    /// Batch strides, empty when shared by every batch.
    fn batch_strides(&self) -> &[usize];
}

/// The absence of a mask.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMask;

impl BlockMasking for NoMask {
    const ENABLED: bool = false;
    const MULTIPLICATIVE: bool = false;

    fn block<A: Numeric>(&self, _batch_offset: usize, _row: usize, _col: usize) -> Option<A> {
        Some(A::one())
    }

    fn block_size(&self) -> Option<usize> {
        None
    }

    fn batch_offset(&self, _z: usize, _batch_shape: &[usize]) -> usize {
        0
    }

    fn required_len(&self, _grid: (usize, usize), _batch_shape: &[usize]) -> usize {
        0
    }

    fn num_elems(&self) -> usize {
        0
    }

    fn batch_strides(&self) -> &[usize] {
        &[]
    }
}

/// One mask value per `block_size × block_size` block.
///
/// Block `(row, col)` of batch `z` lives at `batch + row·strides[0] + col·strides[1]`. Vector
/// masks are single rows of blocks. Batch strides are either empty, sharing the mask between
/// batches, or aligned on the GEMV batch shape, a stride of `0` broadcasting that dimension.
#[derive(Debug, Clone)]
pub struct BlockMask<'a, M: MaskElement> {
    pub data: &'a [M],
    pub block_size: usize,
    pub strides: [usize; 2],
    pub batch_strides: Vec<usize>,
}

impl<'a, M: MaskElement> BlockMask<'a, M> {
    /// A contiguous mask over a `rows×cols` grid of blocks, shared by every batch.
    pub fn matrix(data: &'a [M], block_size: usize, cols: usize) -> Self {
        Self {
            data,
            block_size,
            strides: [cols, 1],
            batch_strides: vec![],
        }
    }

    /// A contiguous mask over a vector, shared by every batch.
    pub fn vector(data: &'a [M], block_size: usize) -> Self {
        Self::matrix(data, block_size, 0)
    }

    /// Gives every batch its own mask.
    pub fn with_batch_strides(mut self, batch_strides: Vec<usize>) -> Self {
        self.batch_strides = batch_strides;
        self
    }
}

impl<M: MaskElement> BlockMasking for BlockMask<'_, M> {
    const ENABLED: bool = true;
    const MULTIPLICATIVE: bool = M::MULTIPLICATIVE;

    fn block<A: Numeric>(&self, batch_offset: usize, row: usize, col: usize) -> Option<A> {
        let value = self.data[batch_offset + row * self.strides[0] + col * self.strides[1]];

        match value.is_set() {
            true => Some(value.scale()),
            false => None,
        }
    }

    fn block_size(&self) -> Option<usize> {
        Some(self.block_size)
    }

    fn batch_offset(&self, z: usize, batch_shape: &[usize]) -> usize {
        match self.batch_strides.is_empty() {
            true => 0,
            false => elem_to_loc(z, batch_shape, &self.batch_strides),
        }
    }

    fn required_len(&self, (rows, cols): (usize, usize), batch_shape: &[usize]) -> usize {
        let batch_extent: usize = batch_shape
            .iter()
            .zip(self.batch_strides.iter())
            .map(|(shape, stride)| (shape - 1) * stride)
            .sum();

        batch_extent + (rows - 1) * self.strides[0] + (cols - 1) * self.strides[1] + 1
    }

    fn num_elems(&self) -> usize {
        self.data.len()
    }

    fn batch_strides(&self) -> &[usize] {
        &self.batch_strides
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bool_masks_gate_numeric_masks_scale() {
        let gates = [true, false];
        let scales = [0.5f32, 0.0];

        let gate = BlockMask::vector(&gates, 32);
        let scale = BlockMask::vector(&scales, 32);

        assert_eq!(gate.block::<f32>(0, 0, 0), Some(1.0));
        assert_eq!(gate.block::<f32>(0, 0, 1), None);
        assert_eq!(scale.block::<f32>(0, 0, 0), Some(0.5));
        assert_eq!(scale.block::<f32>(0, 0, 1), None);
    }

    #[test]
    fn matrix_mask_covers_its_grid() {
        let data = [true; 6];
        let mask = BlockMask::matrix(&data, 8, 3).with_batch_strides(vec![6]);

        assert_eq!(mask.required_len((2, 3), &[1]), 6);
        assert_eq!(mask.required_len((2, 3), &[2]), 12);
        assert_eq!(mask.batch_offset(1, &[2]), 6);
    }
}
