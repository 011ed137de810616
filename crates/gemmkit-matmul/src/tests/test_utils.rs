use std::sync::Arc;

use gemmkit_common::{
    Numeric,
    index::elem_to_loc,
    rand::{Rng, seeded_rng},
};
use gemmkit_runtime::{ComputeClient, config::GlobalConfig};

use crate::{
    components::{MatmulIdent, MatmulPrecision, MatmulProblem, MatmulSetupError, MatmulSource},
    kernels::gemv::GemvProblem,
};

/// Random test data.
pub trait Sample: Numeric {
    /// `len` values uniformly drawn in `[-1, 1)`, reproducible for a given seed.
    fn sample(len: usize, seed: u64) -> Vec<Self>;

    /// `len` small integers in `[-4, 4]`, exact in every element type and in every sum the
    /// tests compute.
    fn sample_integers(len: usize, seed: u64) -> Vec<Self>;
}

impl<E: Numeric> Sample for E {
    fn sample(len: usize, seed: u64) -> Vec<Self> {
        let mut rng = seeded_rng(seed);
        (0..len)
            .map(|_| E::from_f64(rng.random_range(-1.0..1.0)))
            .collect()
    }

    fn sample_integers(len: usize, seed: u64) -> Vec<Self> {
        let mut rng = seeded_rng(seed);
        (0..len)
            .map(|_| E::from_f64(rng.random_range(-4i32..=4) as f64))
            .collect()
    }
}

/// A client that ignores any `gemmkit.toml` lying around, so tests run with defaults.
pub fn test_client() -> ComputeClient {
    ComputeClient::from_config(Arc::new(GlobalConfig::default()))
}

/// Whether a setup error should fail the test, from `MATMUL_TEST_MODE`.
///
/// `panic` fails, anything else (`skip` or unset) prints the error and skips the case.
pub fn panic_on_launch_err() -> bool {
    matches!(std::env::var("MATMUL_TEST_MODE").as_deref(), Ok("panic"))
}

/// Handles the result of a launch the way `MATMUL_TEST_MODE` asks. Returns whether the
/// launch succeeded and the output should be checked.
pub fn launched(result: Result<(), MatmulSetupError>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            let msg = format!("Can't launch the test: {err}");
            if panic_on_launch_err() {
                panic!("{msg}");
            }
            println!("{msg}");
            false
        }
    }
}

/// Tolerance of a matmul reducing `k` products in the accumulation type, then stored once.
pub fn matmul_epsilon<MP: MatmulPrecision>(k: usize) -> f64 {
    16.0 * k as f64 * MP::EA::epsilon() + 2.0 * MP::EO::epsilon() + 2.0 * MP::EI::epsilon()
}

/// Compares `actual` with `expected`, scaling `epsilon` by the magnitude of large values.
pub fn assert_equals_approx<E: Numeric>(
    actual: &[E],
    expected: &[f64],
    epsilon: f64,
) -> Result<(), String> {
    if actual.len() != expected.len() {
        return Err(format!(
            "Lengths differ: actual={}, expected={}",
            actual.len(),
            expected.len()
        ));
    }

    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        let a = a.to_f64();
        let tolerance = epsilon * f64::max(1.0, e.abs());

        if (a - e).abs() > tolerance || a.is_nan() != e.is_nan() {
            return Err(format!(
                "Values differ more than epsilon: index={} actual={}, expected={}, difference={}, epsilon={}",
                i,
                a,
                e,
                (a - e).abs(),
                tolerance
            ));
        }
    }

    Ok(())
}

/// Converts to `f64` for exact comparisons.
pub fn to_f64<E: Numeric>(values: &[E]) -> Vec<f64> {
    values.iter().map(|v| v.to_f64()).collect()
}

/// Solves a matmul problem on the host, in `f64`, honoring layouts and batch broadcasting.
///
/// This is a naive CPU implementation, very slow on large payloads,
/// not designed to be used for other purposes than testing.
pub fn matmul_cpu_reference<E: Numeric>(
    problem: &MatmulProblem,
    lhs: &[E],
    rhs: &[E],
) -> Vec<f64> {
    let (m, n, k) = (problem.m, problem.n, problem.k);
    let batch_shape = problem.batch_dims();
    let batch_lhs = problem.batch_strides(MatmulIdent::Lhs);
    let batch_rhs = problem.batch_strides(MatmulIdent::Rhs);
    let (lhs_row, lhs_col) = matrix_strides(problem, MatmulIdent::Lhs);
    let (rhs_row, rhs_col) = matrix_strides(problem, MatmulIdent::Rhs);

    let mut out = vec![0.0; problem.num_batches() * m * n];

    for b in 0..problem.num_batches() {
        let lhs_offset = elem_to_loc(b, &batch_shape, &batch_lhs);
        let rhs_offset = elem_to_loc(b, &batch_shape, &batch_rhs);

        for i in 0..m {
            for j in 0..n {
                let mut sum = 0.0;
                for k_ in 0..k {
                    let lhs_value = lhs[lhs_offset + i * lhs_row + k_ * lhs_col].to_f64();
                    let rhs_value = rhs[rhs_offset + k_ * rhs_row + j * rhs_col].to_f64();
                    sum += lhs_value * rhs_value;
                }
                out[b * m * n + i * n + j] = sum;
            }
        }
    }

    out
}

/// `alpha·(lhs·rhs) + beta·source` on the host.
pub fn addmm_cpu_reference<E: Numeric>(
    problem: &MatmulProblem,
    lhs: &[E],
    rhs: &[E],
    source: &MatmulSource<'_, E>,
) -> Vec<f64> {
    let mut out = matmul_cpu_reference(problem, lhs, rhs);
    let (m, n) = (problem.m, problem.n);
    let batch_shape = problem.batch_dims();
    let rank = source.strides.len();
    let (ldc, fdc) = (source.strides[rank - 2], source.strides[rank - 1]);

    for b in 0..problem.num_batches() {
        let offset = elem_to_loc(b, &batch_shape, source.batch_strides());
        for i in 0..m {
            for j in 0..n {
                let c = source.data[offset + i * ldc + j * fdc].to_f64();
                let value = &mut out[b * m * n + i * n + j];
                *value = source.alpha * *value + source.beta * c;
            }
        }
    }

    out
}

/// Solves a GEMV problem on the host, in `f64`.
pub fn gemv_cpu_reference<E: Numeric>(problem: &GemvProblem, mat: &[E], vec: &[E]) -> Vec<f64> {
    let mut out = vec![0.0; problem.out_len()];

    for b in 0..problem.num_batches() {
        let (mat_offset, vec_offset) = problem.batch_offsets(b);

        for o in 0..problem.out_size {
            let mut sum = 0.0;
            for i in 0..problem.in_size {
                let index = match problem.transposed {
                    false => o * problem.matrix_ld + i,
                    true => i * problem.matrix_ld + o,
                };
                sum += mat[mat_offset + index].to_f64() * vec[vec_offset + i].to_f64();
            }
            out[b * problem.out_size + o] = sum;
        }
    }

    out
}

/// Copies a contiguous operand of `problem` into the top-left corner of the same operand of
/// `padded`, leaving zeros around it.
pub fn pad_operand<E: Numeric>(
    problem: &MatmulProblem,
    padded: &MatmulProblem,
    ident: MatmulIdent,
    data: &[E],
) -> Vec<E> {
    let (rows, cols) = logical_dims(problem, ident);
    let (row, col) = matrix_strides(problem, ident);
    let (padded_row, padded_col) = matrix_strides(padded, ident);
    let (padded_rows, padded_cols) = logical_dims(padded, ident);
    let batches = problem.num_batches();

    let mut out = vec![E::zero(); batches * padded_rows * padded_cols];
    for b in 0..batches {
        for i in 0..rows {
            for j in 0..cols {
                out[b * padded_rows * padded_cols + i * padded_row + j * padded_col] =
                    data[b * rows * cols + i * row + j * col];
            }
        }
    }

    out
}

/// Top-left `m×n` corner of every batch of an output of `padded`.
pub fn unpad_output<E: Numeric>(
    problem: &MatmulProblem,
    padded: &MatmulProblem,
    data: &[E],
) -> Vec<E> {
    let (m, n) = (problem.m, problem.n);
    let mut out = Vec::with_capacity(problem.num_batches() * m * n);

    for b in 0..problem.num_batches() {
        for i in 0..m {
            for j in 0..n {
                out.push(data[b * padded.m * padded.n + i * padded.n + j]);
            }
        }
    }

    out
}

fn logical_dims(problem: &MatmulProblem, ident: MatmulIdent) -> (usize, usize) {
    let shape = problem.shape(ident);
    let rank = shape.len();
    (shape[rank - 2], shape[rank - 1])
}

fn matrix_strides(problem: &MatmulProblem, ident: MatmulIdent) -> (usize, usize) {
    let strides = problem.strides(ident);
    let rank = strides.len();
    (strides[rank - 2], strides[rank - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::MatrixLayout;
    use pretty_assertions::assert_eq;

    #[test]
    fn samples_are_reproducible() {
        assert_eq!(f32::sample(16, 3), f32::sample(16, 3));
        assert!(f32::sample(16, 3) != f32::sample(16, 4));
        assert!(
            i32::sample_integers(64, 1)
                .iter()
                .all(|v| (-4..=4).contains(v))
        );
    }

    #[test]
    fn reference_honors_layouts() {
        let problem = MatmulProblem::new(2, 2, 2);
        let lhs = [1.0f32, 2.0, 3.0, 4.0];
        let rhs = [5.0f32, 6.0, 7.0, 8.0];
        let expected = matmul_cpu_reference(&problem, &lhs, &rhs);
        assert_eq!(expected, vec![19.0, 22.0, 43.0, 50.0]);

        let transposed = problem.with_layouts(MatrixLayout::ColMajor, MatrixLayout::RowMajor);
        let lhs_t = [1.0f32, 3.0, 2.0, 4.0];
        assert_eq!(matmul_cpu_reference(&transposed, &lhs_t, &rhs), expected);
    }

    #[test]
    fn padding_keeps_the_logical_matrix() {
        let layouts = (MatrixLayout::ColMajor, MatrixLayout::RowMajor);
        let problem = MatmulProblem::new(2, 3, 2).with_layouts(layouts.0, layouts.1);
        let padded = MatmulProblem::new(4, 4, 4).with_layouts(layouts.0, layouts.1);
        // Column-major [[1, 2], [3, 4]].
        let lhs = [1.0f32, 3.0, 2.0, 4.0];
        let lhs_padded = pad_operand(&problem, &padded, MatmulIdent::Lhs, &lhs);

        assert_eq!(lhs_padded[0..4].to_vec(), vec![1.0, 3.0, 0.0, 0.0]);
        assert_eq!(lhs_padded[4..8].to_vec(), vec![2.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn approx_comparison_reports_the_index() {
        let err = assert_equals_approx(&[1.0f32, 2.5], &[1.0, 2.0], 1e-3).unwrap_err();

        assert!(err.contains("index=1"));
        assert!(assert_equals_approx(&[100.01f32], &[100.0], 1e-3).is_ok());
    }
}
