use gemmkit_runtime::config::matmul::SplitKConfig;

use crate::components::MatmulProblem;

/// Number of K partitions worth using for `problem`, if any.
///
/// Split-K pays off when the output is too small to occupy the device on its own but the
/// reduction is long: a single batch, at most `max_output_tiles` 16×16 output tiles and at
/// least `min_k_tiles` 16-deep K tiles.
pub fn split_k_partitions(problem: &MatmulProblem, config: &SplitKConfig) -> Option<usize> {
    if !config.enabled || problem.num_batches() != 1 {
        return None;
    }

    let output_tiles = (problem.m / 16) * (problem.n / 16);
    let k_tiles = problem.k / 16;

    if output_tiles > config.max_output_tiles || k_tiles < config.min_k_tiles {
        return None;
    }

    Some(match k_tiles {
        0..16 => 2,
        16..32 => 4,
        32..64 => 8,
        _ => 16,
    })
}
