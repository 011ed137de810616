use gemmkit_common::index::{contiguous_strides, elem_to_loc_broadcast};

use crate::components::{
    FormattedConfigError, MatmulIdent, MatmulKind, MatmulProblem, MatmulSetupError,
};

/// A batched matrix-vector product.
///
/// Not transposed, the matrix is `[out, in]` and the kernel computes `mat·vec`. Transposed, it
/// is `[in, out]` and the kernel computes `vecᵀ·mat`. The output is contiguous, one vector of
/// `out_size` per batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GemvProblem {
    pub out_size: usize,
    pub in_size: usize,
    pub transposed: bool,
    /// Leading dimension of the matrix.
    pub matrix_ld: usize,
    pub batch_shape: Vec<usize>,
    pub mat_batch_strides: Vec<usize>,
    pub vec_batch_strides: Vec<usize>,
}

impl GemvProblem {
    /// A single contiguous product.
    pub fn new(out_size: usize, in_size: usize, transposed: bool) -> Self {
        Self {
            out_size,
            in_size,
            transposed,
            matrix_ld: if transposed { out_size } else { in_size },
            batch_shape: vec![],
            mat_batch_strides: vec![],
            vec_batch_strides: vec![],
        }
    }

    /// Contiguous batches of matrices and vectors.
    pub fn with_batches(self, batch_shape: Vec<usize>) -> Self {
        let mut mat_strides = batch_shape.clone();
        mat_strides.push(self.out_size * self.in_size);
        let mut vec_strides = batch_shape.clone();
        vec_strides.push(self.in_size);

        let mat_strides = contiguous_strides(&mat_strides);
        let vec_strides = contiguous_strides(&vec_strides);
        let rank = batch_shape.len();

        self.with_batch_strides(
            batch_shape,
            mat_strides[..rank].to_vec(),
            vec_strides[..rank].to_vec(),
        )
    }

    /// Batches with explicit strides. A stride of `0` broadcasts the operand.
    pub fn with_batch_strides(
        mut self,
        batch_shape: Vec<usize>,
        mat_batch_strides: Vec<usize>,
        vec_batch_strides: Vec<usize>,
    ) -> Self {
        self.batch_shape = batch_shape;
        self.mat_batch_strides = mat_batch_strides;
        self.vec_batch_strides = vec_batch_strides;
        self
    }

    /// The GEMV equivalent of a matrix-vector or vector-matrix problem.
    ///
    /// A column-major matrix flips the kernel: an `m×k` column-major lhs is a `[k, m]` matrix
    /// read by the transposed kernel.
    pub fn from_matmul(problem: &MatmulProblem) -> Option<Self> {
        let batch_shape = problem.batch_dims();

        let (mat, vec, out_size, transposed) = match MatmulKind::from(problem) {
            MatmulKind::MatVec | MatmulKind::InnerProduct => (
                MatmulIdent::Lhs,
                MatmulIdent::Rhs,
                problem.m,
                problem.lhs_layout.is_transposed(),
            ),
            MatmulKind::VecMat => (
                MatmulIdent::Rhs,
                MatmulIdent::Lhs,
                problem.n,
                !problem.rhs_layout.is_transposed(),
            ),
            MatmulKind::General => return None,
        };

        Some(Self {
            out_size,
            in_size: problem.k,
            transposed,
            matrix_ld: problem.leading_dim(mat),
            batch_shape,
            mat_batch_strides: problem.batch_strides(mat),
            vec_batch_strides: problem.batch_strides(vec),
        })
    }

    pub fn num_batches(&self) -> usize {
        self.batch_shape.iter().product()
    }

    /// Checks the problem is not empty and that the strides match the batch shape.
    pub fn validate(&self) -> Result<(), MatmulSetupError> {
        if self.out_size == 0 || self.in_size == 0 {
            let (out, input) = (self.out_size, self.in_size);
            return Err(FormattedConfigError::new(move || {
                format!("Empty GEMV problem out={out} in={input}")
            })
            .into());
        }

        let rank = self.batch_shape.len();
        if self.mat_batch_strides.len() != rank || self.vec_batch_strides.len() != rank {
            return Err(FormattedConfigError::new(move || {
                format!("GEMV batch strides must have rank {rank}")
            })
            .into());
        }

        let min_ld = if self.transposed {
            self.out_size
        } else {
            self.in_size
        };
        if self.matrix_ld < min_ld {
            let ld = self.matrix_ld;
            return Err(FormattedConfigError::new(move || {
                format!("GEMV matrix leading dimension {ld} is smaller than its rows ({min_ld})")
            })
            .into());
        }

        Ok(())
    }

    /// Number of matrix elements addressed by the problem.
    pub fn matrix_len(&self) -> usize {
        let (rows, cols) = match self.transposed {
            false => (self.out_size, self.in_size),
            true => (self.in_size, self.out_size),
        };

        self.batch_extent(&self.mat_batch_strides) + (rows - 1) * self.matrix_ld + cols
    }

    /// Number of vector elements addressed by the problem.
    pub fn vector_len(&self) -> usize {
        self.batch_extent(&self.vec_batch_strides) + self.in_size
    }

    pub fn out_len(&self) -> usize {
        self.num_batches() * self.out_size
    }

    /// Grid of mask blocks over the matrix, in its storage orientation.
    pub fn matrix_blocks(&self, block: usize) -> (usize, usize) {
        let (rows, cols) = match self.transposed {
            false => (self.out_size, self.in_size),
            true => (self.in_size, self.out_size),
        };

        (rows.div_ceil(block), cols.div_ceil(block))
    }

    /// Offsets of batch `z` in the matrix and the vector.
    ///
    /// Contiguous batches use their flat stride, others N-dimensional resolution.
    pub fn batch_offsets(&self, z: usize) -> (usize, usize) {
        match self.batch_shape.len() {
            0 => (0, 0),
            1 => (z * self.mat_batch_strides[0], z * self.vec_batch_strides[0]),
            _ => {
                let [mat, vec] = elem_to_loc_broadcast(
                    z,
                    &self.batch_shape,
                    [&self.mat_batch_strides, &self.vec_batch_strides],
                );
                (mat, vec)
            }
        }
    }

    fn batch_extent(&self, strides: &[usize]) -> usize {
        self.batch_shape
            .iter()
            .zip(strides.iter())
            .map(|(shape, stride)| (shape - 1) * stride)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::MatrixLayout;
    use pretty_assertions::assert_eq;

    #[test]
    fn mat_vec_maps_to_gemv() {
        let problem = MatmulProblem::new(16, 1, 40).with_batches(vec![3], vec![3]);
        let gemv = GemvProblem::from_matmul(&problem).unwrap();

        assert!(!gemv.transposed);
        assert_eq!(gemv.out_size, 16);
        assert_eq!(gemv.matrix_ld, 40);
        assert_eq!(gemv.mat_batch_strides, vec![640]);
        assert_eq!(gemv.vec_batch_strides, vec![40]);
    }

    #[test]
    fn vec_mat_maps_to_transposed_gemv() {
        let problem = MatmulProblem::new(1, 24, 40);
        let gemv = GemvProblem::from_matmul(&problem).unwrap();

        assert!(gemv.transposed);
        assert_eq!(gemv.out_size, 24);
        assert_eq!(gemv.matrix_ld, 24);

        let problem = problem.with_layouts(MatrixLayout::RowMajor, MatrixLayout::ColMajor);
        let gemv = GemvProblem::from_matmul(&problem).unwrap();

        assert!(!gemv.transposed);
        assert_eq!(gemv.matrix_ld, 40);
    }

    #[test]
    fn contiguous_batches() {
        let problem = GemvProblem::new(8, 5, false).with_batches(vec![2, 3]);

        assert_eq!(problem.mat_batch_strides, vec![120, 40]);
        assert_eq!(problem.vec_batch_strides, vec![15, 5]);
        assert_eq!(problem.matrix_len(), 240);
        assert_eq!(problem.batch_offsets(4), (160, 20));
        assert!(problem.validate().is_ok());
    }
}
