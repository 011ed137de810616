use gemmkit_common::index::contiguous_strides;
use serde::{Deserialize, Serialize};

use super::{FormattedConfigError, MatmulIdent, MatmulSetupError};

#[derive(Clone, Debug)]
/// Description of a matmul problem to solve, regardless of actual data
pub struct MatmulProblem {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    /// Batch shapes of lhs and rhs, broadcast against each other from the right.
    pub batches: (Vec<usize>, Vec<usize>),
    pub lhs_layout: MatrixLayout,
    pub rhs_layout: MatrixLayout,
}

impl MatmulProblem {
    /// A single, row-major `m×k · k×n` problem.
    pub fn new(m: usize, n: usize, k: usize) -> Self {
        Self {
            m,
            n,
            k,
            batches: (vec![], vec![]),
            lhs_layout: MatrixLayout::RowMajor,
            rhs_layout: MatrixLayout::RowMajor,
        }
    }

    pub fn with_batches(mut self, lhs: Vec<usize>, rhs: Vec<usize>) -> Self {
        self.batches = (lhs, rhs);
        self
    }

    pub fn with_layouts(mut self, lhs: MatrixLayout, rhs: MatrixLayout) -> Self {
        self.lhs_layout = lhs;
        self.rhs_layout = rhs;
        self
    }

    /// Checks that the problem is not empty and that both batch shapes broadcast.
    pub fn validate(&self) -> Result<(), MatmulSetupError> {
        if self.m == 0 || self.n == 0 || self.k == 0 {
            let (m, n, k) = (self.m, self.n, self.k);
            return Err(FormattedConfigError::new(move || {
                format!("Empty matmul problem m={m} n={n} k={k}")
            })
            .into());
        }

        let (lhs, rhs) = (self.padded_batches(MatmulIdent::Lhs), self.padded_batches(MatmulIdent::Rhs));
        for (l, r) in lhs.iter().zip(rhs.iter()) {
            if l != r && *l != 1 && *r != 1 {
                let (lhs, rhs) = self.batches.clone();
                return Err(FormattedConfigError::new(move || {
                    format!("Batch shapes {lhs:?} and {rhs:?} can't be broadcast")
                })
                .into());
            }
        }

        Ok(())
    }

    /// Batch shape of the output.
    pub fn batch_dims(&self) -> Vec<usize> {
        self.padded_batches(MatmulIdent::Lhs)
            .iter()
            .zip(self.padded_batches(MatmulIdent::Rhs).iter())
            .map(|(&dim_lhs, &dim_rhs)| std::cmp::max(dim_lhs, dim_rhs))
            .collect()
    }

    /// Returns the total number of batches
    pub fn num_batches(&self) -> usize {
        self.batch_dims().iter().product()
    }

    /// Returns the shape of the identified tensor, inferred by the problem definition
    pub fn shape(&self, ident: MatmulIdent) -> Vec<usize> {
        match ident {
            MatmulIdent::Lhs => self
                .batches
                .0
                .iter()
                .cloned()
                .chain(vec![self.m, self.k])
                .collect(),
            MatmulIdent::Rhs => self
                .batches
                .1
                .iter()
                .cloned()
                .chain(vec![self.k, self.n])
                .collect(),
            MatmulIdent::Source | MatmulIdent::Out => self
                .batch_dims()
                .iter()
                .cloned()
                .chain(vec![self.m, self.n])
                .collect(),
        }
    }

    /// Strides of the identified tensor when stored contiguously in its layout.
    pub fn strides(&self, ident: MatmulIdent) -> Vec<usize> {
        let mut shape = self.shape(ident);
        let rank = shape.len();

        if self.layout(ident) == MatrixLayout::ColMajor {
            shape.swap(rank - 1, rank - 2);
            let mut strides = contiguous_strides(&shape);
            strides.swap(rank - 1, rank - 2);
            strides
        } else {
            contiguous_strides(&shape)
        }
    }

    /// Number of elements of the identified tensor.
    pub fn num_elems(&self, ident: MatmulIdent) -> usize {
        self.shape(ident).iter().product()
    }

    /// Layout of the identified tensor. The output is always row-major.
    pub fn layout(&self, ident: MatmulIdent) -> MatrixLayout {
        match ident {
            MatmulIdent::Lhs => self.lhs_layout,
            MatmulIdent::Rhs => self.rhs_layout,
            MatmulIdent::Source | MatmulIdent::Out => MatrixLayout::RowMajor,
        }
    }

    /// Leading dimension of the identified matrix.
    pub fn leading_dim(&self, ident: MatmulIdent) -> usize {
        let rank = self.shape(ident).len();
        let strides = self.strides(ident);

        match self.layout(ident) {
            MatrixLayout::RowMajor => strides[rank - 2],
            MatrixLayout::ColMajor => strides[rank - 1],
        }
    }

    /// Per-dimension batch strides of the identified tensor, aligned on the output batch
    /// shape. Broadcast dimensions get a stride of `0`.
    pub fn batch_strides(&self, ident: MatmulIdent) -> Vec<usize> {
        let out_rank = self.batch_dims().len();
        let shape = self.shape(ident);
        let strides = self.strides(ident);
        let rank = shape.len() - 2;

        (0..out_rank)
            .map(|dim| {
                let offset = out_rank - dim;
                if offset > rank {
                    return 0;
                }
                let own = rank - offset;
                if shape[own] == 1 { 0 } else { strides[own] }
            })
            .collect()
    }

    fn padded_batches(&self, ident: MatmulIdent) -> Vec<usize> {
        let rank = usize::max(self.batches.0.len(), self.batches.1.len());
        let own = match ident {
            MatmulIdent::Lhs => &self.batches.0,
            MatmulIdent::Rhs => &self.batches.1,
            MatmulIdent::Source | MatmulIdent::Out => return self.batch_dims(),
        };

        std::iter::repeat_n(1, rank - own.len())
            .chain(own.iter().cloned())
            .collect()
    }
}

/// Interpretation of matrix multiplication based on input shapes.
#[derive(Hash, Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum MatmulKind {
    /// (M, K) @ (K, N) → (M, N), with M, N > 1
    General,

    /// (M, K) @ (K, 1) → (M, 1)
    MatVec,

    /// (1, K) @ (K, N) → (1, N)
    VecMat,

    /// (1, K) @ (K, 1) → (1, 1)
    InnerProduct,
}

impl From<&MatmulProblem> for MatmulKind {
    fn from(problem: &MatmulProblem) -> Self {
        match (problem.m, problem.n) {
            (1, 1) => MatmulKind::InnerProduct,
            (_, 1) => MatmulKind::MatVec,
            (1, _) => MatmulKind::VecMat,
            _ => MatmulKind::General,
        }
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
/// Layout of a 2D structure such as a tensor, shared memory or slice,
/// used within any matmul kernel level
pub enum MatrixLayout {
    RowMajor,
    ColMajor,
}

impl MatrixLayout {
    /// Whether the matrix is stored transposed relative to its logical row-major shape.
    pub fn is_transposed(&self) -> bool {
        matches!(self, MatrixLayout::ColMajor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn batches_broadcast_from_the_right() {
        let problem = MatmulProblem::new(4, 5, 6).with_batches(vec![3, 1], vec![2]);

        assert_eq!(problem.batch_dims(), vec![3, 2]);
        assert_eq!(problem.num_batches(), 6);
        assert_eq!(problem.batch_strides(MatmulIdent::Lhs), vec![24, 0]);
        assert_eq!(problem.batch_strides(MatmulIdent::Rhs), vec![0, 30]);
        assert_eq!(problem.batch_strides(MatmulIdent::Out), vec![40, 20]);
    }

    #[test]
    fn col_major_leading_dim_is_rows() {
        let problem = MatmulProblem::new(4, 5, 6)
            .with_layouts(MatrixLayout::ColMajor, MatrixLayout::ColMajor);

        assert_eq!(problem.strides(MatmulIdent::Lhs), vec![1, 4]);
        assert_eq!(problem.leading_dim(MatmulIdent::Lhs), 4);
        assert_eq!(problem.leading_dim(MatmulIdent::Rhs), 6);
        assert_eq!(problem.leading_dim(MatmulIdent::Out), 5);
    }

    #[test]
    fn incompatible_batches_are_rejected() {
        let problem = MatmulProblem::new(4, 5, 6).with_batches(vec![3], vec![2]);

        assert!(problem.validate().is_err());
    }

    #[test]
    fn kind_from_shape() {
        assert_eq!(MatmulKind::from(&MatmulProblem::new(8, 1, 8)), MatmulKind::MatVec);
        assert_eq!(MatmulKind::from(&MatmulProblem::new(1, 8, 8)), MatmulKind::VecMat);
        assert_eq!(MatmulKind::from(&MatmulProblem::new(8, 8, 8)), MatmulKind::General);
    }
}
