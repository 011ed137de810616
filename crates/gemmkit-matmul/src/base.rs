use gemmkit_runtime::ComputeClient;

use crate::{
    components::{
        MatmulKind, MatmulPrecision, MatmulProblem, MatmulSetupError, MatmulSource, TilingScheme,
        log_launch,
    },
    kernels::{
        gemm::{launch_addmm as launch_gemm_addmm, launch_gemm},
        gemv::{GemvProblem, launch_gemv},
        launch_naive,
        split_k::{launch_split_k, launch_split_k_addmm, split_k_partitions},
    },
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// The matmul algorithm to launch
pub enum Strategy {
    /// Tiled GEMM with the given tiling.
    Tiled(TilingScheme),
    /// Tiled GEMM with the reduction split into `partitions` slices.
    SplitK {
        tiling: TilingScheme,
        partitions: usize,
    },
    /// One unit per output element.
    Naive,
    #[default]
    /// Picks GEMV for matrix-vector shapes, then Split-K when the output is small and the
    /// reduction long, then the tiled GEMM.
    Auto,
}

/// Default tiling for `problem`.
///
/// Large outputs use 64×64 tiles. Anything with a side shorter than 64 uses 32×32 tiles to
/// limit the work wasted on padding. Both reduce 16 elements per step over 2×2 planes.
pub fn select_tiling(problem: &MatmulProblem) -> TilingScheme {
    match problem.m >= 64 && problem.n >= 64 {
        true => TilingScheme::new(64, 64, 16, 2, 2),
        false => TilingScheme::new(32, 32, 16, 2, 2),
    }
}

/// Launches `out = lhs·rhs` with the given strategy.
pub fn launch<MP: MatmulPrecision>(
    client: &ComputeClient,
    strategy: &Strategy,
    problem: &MatmulProblem,
    lhs: &[MP::EI],
    rhs: &[MP::EI],
    out: &mut [MP::EO],
) -> Result<(), MatmulSetupError> {
    match resolve(client, strategy, problem, false) {
        Resolved::Gemv(gemv) => {
            let (mat, vec) = gemv_operands(problem, lhs, rhs);
            launch_gemv::<MP>(client, &gemv, mat, vec, out)
        }
        Resolved::Tiled(tiling) => launch_gemm::<MP>(client, problem, tiling, lhs, rhs, out),
        Resolved::SplitK(tiling, partitions) => {
            launch_split_k::<MP>(client, problem, tiling, partitions, lhs, rhs, out)
        }
        Resolved::Naive => launch_naive::<MP>(client, problem, lhs, rhs, None, out),
    }
}

/// Launches `out = alpha·(lhs·rhs) + beta·source` with the given strategy.
///
/// The GEMV kernels have no source operand, so matrix-vector shapes go through the tiled
/// GEMM here.
pub fn launch_addmm<MP: MatmulPrecision>(
    client: &ComputeClient,
    strategy: &Strategy,
    problem: &MatmulProblem,
    lhs: &[MP::EI],
    rhs: &[MP::EI],
    source: &MatmulSource<'_, MP::EO>,
    out: &mut [MP::EO],
) -> Result<(), MatmulSetupError> {
    match resolve(client, strategy, problem, true) {
        Resolved::Tiled(tiling) => {
            launch_gemm_addmm::<MP>(client, problem, tiling, lhs, rhs, source, out)
        }
        Resolved::Gemv(_) => {
            let tiling = select_tiling(problem);
            launch_gemm_addmm::<MP>(client, problem, tiling, lhs, rhs, source, out)
        }
        Resolved::SplitK(tiling, partitions) => launch_split_k_addmm::<MP>(
            client, problem, tiling, partitions, lhs, rhs, source, out,
        ),
        Resolved::Naive => launch_naive::<MP>(client, problem, lhs, rhs, Some(source), out),
    }
}

#[derive(Debug)]
enum Resolved {
    Gemv(GemvProblem),
    Tiled(TilingScheme),
    SplitK(TilingScheme, usize),
    Naive,
}

fn resolve(
    client: &ComputeClient,
    strategy: &Strategy,
    problem: &MatmulProblem,
    addmm: bool,
) -> Resolved {
    let resolved = match strategy {
        Strategy::Tiled(tiling) => return Resolved::Tiled(*tiling),
        Strategy::SplitK { tiling, partitions } => return Resolved::SplitK(*tiling, *partitions),
        Strategy::Naive => return Resolved::Naive,
        Strategy::Auto => auto(client, problem, addmm),
    };

    log_launch(
        client,
        || {
            format!(
                "[Matmul] auto selection m={} n={} k={} batches={} kind={:?} => {}",
                problem.m,
                problem.n,
                problem.k,
                problem.num_batches(),
                MatmulKind::from(problem),
                match &resolved {
                    Resolved::Gemv(_) => "gemv".to_string(),
                    Resolved::Tiled(tiling) => format!("tiled {tiling}"),
                    Resolved::SplitK(tiling, partitions) => {
                        format!("split_k {tiling} partitions={partitions}")
                    }
                    Resolved::Naive => "naive".to_string(),
                }
            )
        },
        || format!("[Matmul] {resolved:?}"),
    );

    resolved
}

fn auto(client: &ComputeClient, problem: &MatmulProblem, addmm: bool) -> Resolved {
    if !addmm {
        if let Some(gemv) = GemvProblem::from_matmul(problem) {
            return Resolved::Gemv(gemv);
        }
    }

    let tiling = select_tiling(problem);
    let partitions = split_k_partitions(problem, &client.config().matmul.split_k);
    log::debug!(
        "Matmul {}x{}x{}: tiling {tiling}, split-k partitions {partitions:?}",
        problem.m,
        problem.n,
        problem.k
    );

    match partitions {
        Some(partitions) => Resolved::SplitK(tiling, partitions),
        None => Resolved::Tiled(tiling),
    }
}

// The matrix and the vector of a matrix-vector problem.
fn gemv_operands<'a, E>(
    problem: &MatmulProblem,
    lhs: &'a [E],
    rhs: &'a [E],
) -> (&'a [E], &'a [E]) {
    match MatmulKind::from(problem) {
        MatmulKind::VecMat => (rhs, lhs),
        _ => (lhs, rhs),
    }
}
