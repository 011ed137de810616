use gemmkit_common::index::elem_to_loc_broadcast;

use super::{GemmConfig, MatmulIdent, MatmulProblem};

/// Per-dispatch description of a tiled GEMM, read-only for the whole launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GemmParams {
    pub m: usize,
    pub n: usize,
    pub k: usize,

    pub lda: usize,
    pub ldb: usize,
    pub ldd: usize,

    pub tiles_n: usize,
    pub tiles_m: usize,

    pub batch_stride_a: usize,
    pub batch_stride_b: usize,
    pub batch_stride_d: usize,

    pub swizzle_log: u32,
    /// Number of whole K steps.
    pub gemm_k_iterations_aligned: usize,

    pub batch_ndim: usize,
}

impl GemmParams {
    pub fn new(
        problem: &MatmulProblem,
        config: &GemmConfig,
        batch: &BatchLayout,
        swizzle_log: u32,
    ) -> Self {
        let tiling = config.tiling();

        Self {
            m: problem.m,
            n: problem.n,
            k: problem.k,
            lda: problem.leading_dim(MatmulIdent::Lhs),
            ldb: problem.leading_dim(MatmulIdent::Rhs),
            ldd: problem.leading_dim(MatmulIdent::Out),
            tiles_n: problem.n.div_ceil(tiling.bn),
            tiles_m: problem.m.div_ceil(tiling.bm),
            batch_stride_a: batch.strides_a.last().copied().unwrap_or(0),
            batch_stride_b: batch.strides_b.last().copied().unwrap_or(0),
            batch_stride_d: problem.m * problem.n,
            swizzle_log,
            gemm_k_iterations_aligned: problem.k / tiling.bk,
            batch_ndim: batch.shape.len(),
        }
    }
}

/// Fused `alpha·(A·B) + beta·C` operand description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GemmAddMmParams {
    pub ldc: usize,
    /// Stride of C along its fast (column) dimension.
    pub fdc: usize,
    pub batch_stride_c: usize,
    pub alpha: f64,
    pub beta: f64,
}

impl GemmAddMmParams {
    /// Whether the epilogue needs the scalars, or is a plain addition.
    pub fn do_axpby(&self) -> bool {
        self.alpha != 1.0 || self.beta != 1.0
    }
}

/// Per-dispatch description of a Split-K GEMM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GemmSplitKParams {
    pub m: usize,
    pub n: usize,
    pub k: usize,

    pub lda: usize,
    pub ldb: usize,
    /// Leading dimension of a partial result.
    pub ldc: usize,

    pub tiles_n: usize,
    pub tiles_m: usize,

    pub split_k_partitions: usize,
    /// Elements between two partial results.
    pub split_k_partition_stride: usize,
    /// K extent of every partition but the last, a whole number of K steps.
    pub split_k_partition_size: usize,

    /// Whole K steps per partition.
    pub gemm_k_iterations_aligned: usize,
}

impl GemmSplitKParams {
    pub fn new(problem: &MatmulProblem, config: &GemmConfig, partitions: usize) -> Self {
        let tiling = config.tiling();
        let gemm_k_iterations = (problem.k / tiling.bk) / partitions;

        Self {
            m: problem.m,
            n: problem.n,
            k: problem.k,
            lda: problem.leading_dim(MatmulIdent::Lhs),
            ldb: problem.leading_dim(MatmulIdent::Rhs),
            ldc: problem.n,
            tiles_n: problem.n.div_ceil(tiling.bn),
            tiles_m: problem.m.div_ceil(tiling.bm),
            split_k_partitions: partitions,
            split_k_partition_stride: problem.m * problem.n,
            split_k_partition_size: gemm_k_iterations * tiling.bk,
            gemm_k_iterations_aligned: gemm_k_iterations,
        }
    }
}

/// N-dimensional batch shape with the per-dimension strides of every operand.
///
/// Broadcast dimensions have a stride of `0`. When the layout has at most one dimension,
/// kernels use the flat batch strides of their params instead.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchLayout {
    pub shape: Vec<usize>,
    pub strides_a: Vec<usize>,
    pub strides_b: Vec<usize>,
    pub strides_c: Vec<usize>,
}

impl BatchLayout {
    /// Collapsed batch layout of `problem`. `strides_c` are the batch strides of the fused
    /// source operand, aligned on the output batch shape.
    pub fn from_problem(problem: &MatmulProblem, strides_c: Option<&[usize]>) -> Self {
        let shape = problem.batch_dims();
        let strides_c = match strides_c {
            Some(strides) => strides.to_vec(),
            None => vec![0; shape.len()],
        };

        Self {
            shape,
            strides_a: problem.batch_strides(MatmulIdent::Lhs),
            strides_b: problem.batch_strides(MatmulIdent::Rhs),
            strides_c,
        }
        .collapse()
    }

    /// Merges adjacent dimensions that are contiguous in every operand, and drops dimensions
    /// of size one.
    pub fn collapse(self) -> Self {
        let mut collapsed = Self::default();

        for dim in 0..self.shape.len() {
            let size = self.shape[dim];
            if size == 1 {
                continue;
            }
            let strides = [self.strides_a[dim], self.strides_b[dim], self.strides_c[dim]];

            let mergeable = match collapsed.shape.last() {
                Some(_) => {
                    let last = collapsed.shape.len() - 1;
                    let previous = [
                        collapsed.strides_a[last],
                        collapsed.strides_b[last],
                        collapsed.strides_c[last],
                    ];
                    previous
                        .iter()
                        .zip(strides.iter())
                        .all(|(prev, cur)| *prev == cur * size)
                }
                None => false,
            };

            if mergeable {
                let last = collapsed.shape.len() - 1;
                collapsed.shape[last] *= size;
                collapsed.strides_a[last] = strides[0];
                collapsed.strides_b[last] = strides[1];
                collapsed.strides_c[last] = strides[2];
            } else {
                collapsed.shape.push(size);
                collapsed.strides_a.push(strides[0]);
                collapsed.strides_b.push(strides[1]);
                collapsed.strides_c.push(strides[2]);
            }
        }

        collapsed
    }

    /// Offsets of batch `z` in A, B and C.
    ///
    /// Flat strides are used when the layout has at most one dimension, N-dimensional index
    /// resolution otherwise.
    pub fn offsets(&self, z: usize, flat: [usize; 3]) -> [usize; 3] {
        if self.shape.len() > 1 {
            elem_to_loc_broadcast(
                z,
                &self.shape,
                [&self.strides_a, &self.strides_b, &self.strides_c],
            )
        } else {
            flat.map(|stride| stride * z)
        }
    }
}
