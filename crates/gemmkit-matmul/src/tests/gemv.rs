use gemmkit_common::{
    Numeric,
    rand::{Rng, seeded_rng},
};
use num_traits::Zero;

use super::test_utils::{
    Sample, assert_equals_approx, gemv_cpu_reference, launched, matmul_epsilon, test_client,
};
use crate::{
    components::MatmulPrecision,
    kernels::gemv::{BlockMask, GemvMasks, GemvProblem, launch_gemv, launch_gemv_masked},
};

/// Test the unmasked GEMV on random data against the host reference.
pub fn test_gemv<MP: MatmulPrecision>(problem: GemvProblem) {
    let client = test_client();
    let mat = MP::EI::sample(problem.matrix_len(), 51);
    let vec = MP::EI::sample(problem.vector_len(), 52);
    let mut out = vec![MP::EO::zero(); problem.out_len()];

    if !launched(launch_gemv::<MP>(&client, &problem, &mat, &vec, &mut out)) {
        return;
    }

    let expected = gemv_cpu_reference(&problem, &mat, &vec);
    if let Err(err) = assert_equals_approx(&out, &expected, matmul_epsilon::<MP>(problem.in_size))
    {
        panic!("{problem:?}: {err}");
    }
}

/// Random boolean masks over `problem`, one value per block.
pub struct RandomMasks {
    pub out: Vec<bool>,
    pub mat: Vec<bool>,
    pub vec: Vec<bool>,
}

impl RandomMasks {
    /// Masks shared by every batch, each block set with probability `density`.
    pub fn new(problem: &GemvProblem, block: usize, density: f64, seed: u64) -> Self {
        let mut rng = seeded_rng(seed);
        let (rows, cols) = problem.matrix_blocks(block);
        let mut draw = |len: usize| -> Vec<bool> {
            (0..len).map(|_| rng.random_bool(density)).collect()
        };

        Self {
            out: draw(problem.out_size.div_ceil(block)),
            mat: draw(rows * cols),
            vec: draw(problem.in_size.div_ceil(block)),
        }
    }

    /// Every block set.
    pub fn full(problem: &GemvProblem, block: usize) -> Self {
        Self::new(problem, block, 1.0, 0)
    }
}

/// Checks a masked GEMV writes exactly what the unmasked GEMV writes once the masked blocks
/// of the operands are zeroed and the masked blocks of the output are cleared.
pub fn test_masked_gemv_matches_zeroed<MP: MatmulPrecision>(
    problem: GemvProblem,
    block: usize,
    masks: RandomMasks,
) {
    let client = test_client();
    let mat = MP::EI::sample_integers(problem.matrix_len(), 61);
    let vec = MP::EI::sample_integers(problem.vector_len(), 62);
    let (_, block_cols) = problem.matrix_blocks(block);

    let gemv_masks = GemvMasks {
        out: BlockMask::vector(&masks.out, block),
        mat: BlockMask::matrix(&masks.mat, block, block_cols),
        vec: BlockMask::vector(&masks.vec, block),
    };
    let mut out = vec![MP::EO::zero(); problem.out_len()];
    if !launched(launch_gemv_masked::<MP, _, _>(
        &client,
        &problem,
        &mat,
        &vec,
        &gemv_masks,
        &mut out,
    )) {
        return;
    }

    let mat_zeroed = zero_matrix_blocks(&problem, &mat, &masks.mat, block);
    let vec_zeroed = zero_vector_blocks(&problem, &vec, &masks.vec, block);
    let mut expected = vec![MP::EO::zero(); problem.out_len()];
    if !launched(launch_gemv::<MP>(
        &client,
        &problem,
        &mat_zeroed,
        &vec_zeroed,
        &mut expected,
    )) {
        return;
    }
    for (index, value) in expected.iter_mut().enumerate() {
        let o = index % problem.out_size;
        if !masks.out[o / block] {
            *value = MP::EO::zero();
        }
    }

    assert_eq!(out, expected, "block={block} {problem:?}");
}

/// Copy of a matrix with the elements of every masked out block set to zero.
///
/// Blocks are in the storage orientation of the matrix.
pub fn zero_matrix_blocks<E: Numeric>(
    problem: &GemvProblem,
    mat: &[E],
    mask: &[bool],
    block: usize,
) -> Vec<E> {
    let (rows, cols) = match problem.transposed {
        false => (problem.out_size, problem.in_size),
        true => (problem.in_size, problem.out_size),
    };
    let (_, block_cols) = problem.matrix_blocks(block);
    let mut out = mat.to_vec();

    for b in 0..problem.num_batches() {
        let (offset, _) = problem.batch_offsets(b);
        for row in 0..rows {
            for col in 0..cols {
                if !mask[(row / block) * block_cols + col / block] {
                    out[offset + row * problem.matrix_ld + col] = E::zero();
                }
            }
        }
    }

    out
}

/// Copy of a vector with the elements of every masked out block set to zero.
pub fn zero_vector_blocks<E: Numeric>(
    problem: &GemvProblem,
    vec: &[E],
    mask: &[bool],
    block: usize,
) -> Vec<E> {
    let mut out = vec.to_vec();

    for b in 0..problem.num_batches() {
        let (_, offset) = problem.batch_offsets(b);
        for i in 0..problem.in_size {
            if !mask[i / block] {
                out[offset + i] = E::zero();
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{components::MatmulSetupError, tests::test_utils::to_f64};
    use half::f16;
    use pretty_assertions::assert_eq;

    #[test]
    fn gemv_matches_reference() {
        for transposed in [false, true] {
            for (out, input) in [(1, 1), (7, 3), (50, 70), (33, 64), (4, 2000), (300, 65)] {
                test_gemv::<f32>(GemvProblem::new(out, input, transposed));
            }
        }
    }

    #[test]
    fn gemv_batches_and_half_precision() {
        for transposed in [false, true] {
            test_gemv::<f32>(GemvProblem::new(40, 90, transposed).with_batches(vec![3]));
            test_gemv::<f32>(GemvProblem::new(20, 33, transposed).with_batches(vec![2, 2]));
            test_gemv::<f16>(GemvProblem::new(64, 128, transposed));
        }
    }

    #[test]
    fn gemv_broadcasts_the_vector() {
        for transposed in [false, true] {
            let problem = GemvProblem::new(24, 40, transposed).with_batch_strides(
                vec![3],
                vec![24 * 40],
                vec![0],
            );
            test_gemv::<f32>(problem);
        }
    }

    #[test]
    fn full_masks_change_nothing() {
        for transposed in [false, true] {
            for block in [8, 16, 32, 64] {
                let problem = GemvProblem::new(50, 150, transposed).with_batches(vec![2]);
                let masks = RandomMasks::full(&problem, block);
                test_masked_gemv_matches_zeroed::<f32>(problem, block, masks);
            }
        }
    }

    #[test]
    fn masked_blocks_are_skipped() {
        for transposed in [false, true] {
            for (block, seed) in [(8, 1), (16, 2), (32, 3), (64, 4), (128, 5)] {
                let problem = GemvProblem::new(70, 200, transposed);
                let masks = RandomMasks::new(&problem, block, 0.6, seed);
                test_masked_gemv_matches_zeroed::<f32>(problem, block, masks);
            }
        }
    }

    #[test]
    fn empty_output_mask_writes_zeros() {
        let client = test_client();

        for transposed in [false, true] {
            let problem = GemvProblem::new(40, 64, transposed);
            let mat = f32::sample(problem.matrix_len(), 1);
            let vec = f32::sample(problem.vector_len(), 2);
            let out_mask = [false; 3];
            let op_mask = [true; 12];
            let masks = GemvMasks {
                out: BlockMask::vector(&out_mask, 16),
                mat: BlockMask::matrix(&op_mask, 16, problem.matrix_blocks(16).1),
                vec: BlockMask::vector(&op_mask[..4], 16),
            };
            let mut out = vec![1.0f32; 40];

            launch_gemv_masked::<f32, _, _>(&client, &problem, &mat, &vec, &masks, &mut out)
                .unwrap();

            assert_eq!(out, vec![0.0; 40]);
        }
    }

    #[test]
    fn numeric_masks_scale_their_blocks() {
        let client = test_client();
        let block = 16;

        for transposed in [false, true] {
            let problem = GemvProblem::new(32, 48, transposed);
            let (rows, cols) = problem.matrix_blocks(block);
            let mat = f32::sample(problem.matrix_len(), 3);
            let vec = f32::sample(problem.vector_len(), 4);
            let out_mask = [2.0f32, 0.5];
            let mat_mask: Vec<f32> = (0..rows * cols).map(|i| 1.0 + i as f32 * 0.25).collect();
            let vec_mask = [1.0f32, 0.0, -1.0];
            let masks = GemvMasks {
                out: BlockMask::vector(&out_mask[..], block),
                mat: BlockMask::matrix(&mat_mask, block, cols),
                vec: BlockMask::vector(&vec_mask[..], block),
            };
            let mut out = vec![0.0f32; 32];

            launch_gemv_masked::<f32, _, _>(&client, &problem, &mat, &vec, &masks, &mut out)
                .unwrap();

            let (mat_rows, mat_cols) = match transposed {
                false => (32, 48),
                true => (48, 32),
            };
            let mut mat_scaled = vec![0.0f64; mat.len()];
            for row in 0..mat_rows {
                for col in 0..mat_cols {
                    let index = row * problem.matrix_ld + col;
                    let scale = mat_mask[(row / block) * cols + col / block] as f64;
                    mat_scaled[index] = mat[index] as f64 * scale;
                }
            }
            let vec_scaled: Vec<f64> = vec
                .iter()
                .enumerate()
                .map(|(i, v)| *v as f64 * vec_mask[i / block] as f64)
                .collect();
            let expected: Vec<f64> = gemv_cpu_reference(&problem, &mat_scaled, &vec_scaled)
                .iter()
                .enumerate()
                .map(|(o, v)| v * out_mask[o / block] as f64)
                .collect();

            if let Err(err) = assert_equals_approx(&out, &expected, 1e-4) {
                panic!("transposed={transposed}: {err}");
            }
        }
    }

    #[test]
    fn per_batch_masks() {
        let client = test_client();
        let block = 32;
        let problem = GemvProblem::new(64, 64, false).with_batches(vec![2]);
        let mat = f32::sample_integers(problem.matrix_len(), 7);
        let vec = f32::sample_integers(problem.vector_len(), 8);
        // The first batch keeps the first vector block, the second the last one.
        let vec_mask = [true, false, false, true];
        let all = [true; 4];
        let masks = GemvMasks {
            out: BlockMask::vector(&all[..2], block),
            mat: BlockMask::matrix(&all, block, 2),
            vec: BlockMask::vector(&vec_mask[..], block).with_batch_strides(vec![2]),
        };
        let mut out = vec![0.0f32; 128];

        launch_gemv_masked::<f32, _, _>(&client, &problem, &mat, &vec, &masks, &mut out).unwrap();

        let mut vec_zeroed = vec.clone();
        vec_zeroed[32..96].fill(0.0);
        let expected = gemv_cpu_reference(&problem, &mat, &vec_zeroed);
        assert_eq!(to_f64(&out), expected);
    }

    #[test]
    fn mask_errors() {
        let client = test_client();
        let problem = GemvProblem::new(32, 32, false);
        let mat = vec![0.0f32; 32 * 32];
        let vec = vec![0.0f32; 32];
        let mut out = vec![0.0f32; 32];
        let mask = [true; 16];

        let mismatched = GemvMasks {
            out: BlockMask::vector(&mask[..2], 16),
            mat: BlockMask::matrix(&mask[..1], 32, 1),
            vec: BlockMask::vector(&mask[..1], 32),
        };
        let result =
            launch_gemv_masked::<f32, _, _>(&client, &problem, &mat, &vec, &mismatched, &mut out);
        assert!(matches!(result, Err(MatmulSetupError::InvalidConfig(_))));

        let short = GemvMasks {
            out: BlockMask::vector(&mask[..2], 16),
            mat: BlockMask::matrix(&mask[..3], 16, 2),
            vec: BlockMask::vector(&mask[..2], 16),
        };
        let result =
            launch_gemv_masked::<f32, _, _>(&client, &problem, &mat, &vec, &short, &mut out);
        assert!(matches!(result, Err(MatmulSetupError::InvalidConfig(_))));
    }
}
