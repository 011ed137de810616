use gemmkit_common::{CubeDim, Numeric, PLANE_DIM};
use gemmkit_runtime::ComputeClient;
use num_traits::Zero;

use super::{SplitKAccumKernel, SplitKAccumSourceKernel, SplitKPartialKernel};
use crate::components::{
    FormattedConfigError, GemmConfig, GemmSplitKParams, MatmulIdent, MatmulPrecision,
    MatmulProblem, MatmulSetupError, MatmulSource, TilingScheme, TransformAdd, TransformAxpby, TransformNone,
    check_buffer_len, check_launch, cube_count, log_launch,
};

/// Launches `out = lhs·rhs` with the reduction split into `partitions` slices.
///
/// Only single-batch problems can be split.
pub fn launch_split_k<MP: MatmulPrecision>(
    client: &ComputeClient,
    problem: &MatmulProblem,
    tiling: TilingScheme,
    partitions: usize,
    lhs: &[MP::EI],
    rhs: &[MP::EI],
    out: &mut [MP::EO],
) -> Result<(), MatmulSetupError> {
    launch_split_k_with_source::<MP>(client, problem, tiling, partitions, lhs, rhs, None, out)
}

/// Launches `out = alpha·(lhs·rhs) + beta·source` with the reduction split into
/// `partitions` slices.
#[allow(clippy::too_many_arguments)]
pub fn launch_split_k_addmm<MP: MatmulPrecision>(
    client: &ComputeClient,
    problem: &MatmulProblem,
    tiling: TilingScheme,
    partitions: usize,
    lhs: &[MP::EI],
    rhs: &[MP::EI],
    source: &MatmulSource<'_, MP::EO>,
    out: &mut [MP::EO],
) -> Result<(), MatmulSetupError> {
    launch_split_k_with_source::<MP>(
        client,
        problem,
        tiling,
        partitions,
        lhs,
        rhs,
        Some(source),
        out,
    )
}

#[allow(clippy::too_many_arguments)]
fn launch_split_k_with_source<MP: MatmulPrecision>(
    client: &ComputeClient,
    problem: &MatmulProblem,
    tiling: TilingScheme,
    partitions: usize,
    lhs: &[MP::EI],
    rhs: &[MP::EI],
    source: Option<&MatmulSource<'_, MP::EO>>,
    out: &mut [MP::EO],
) -> Result<(), MatmulSetupError> {
    problem.validate()?;

    if problem.num_batches() != 1 {
        let batches = problem.num_batches();
        return Err(FormattedConfigError::new(move || {
            format!("Split-K only supports a single batch, got {batches}")
        })
        .into());
    }
    if partitions == 0 {
        return Err(FormattedConfigError::new(|| "Split-K needs at least one partition".into()).into());
    }

    check_buffer_len(MatmulIdent::Lhs, lhs.len(), problem.num_elems(MatmulIdent::Lhs))?;
    check_buffer_len(MatmulIdent::Rhs, rhs.len(), problem.num_elems(MatmulIdent::Rhs))?;
    check_buffer_len(MatmulIdent::Out, out.len(), problem.num_elems(MatmulIdent::Out))?;
    if let Some(source) = source {
        source.validate(problem)?;
    }

    let config = GemmConfig::from_problem::<MP::EI>(tiling, problem)?;
    let params = GemmSplitKParams::new(problem, &config, partitions);

    let partial_count = cube_count(params.tiles_n, params.tiles_m, partitions)?;
    let accum_count = cube_count(problem.n.div_ceil(PLANE_DIM as usize), problem.m, 1)?;
    let accum_dim = CubeDim::new_planes(1);
    check_launch(client.properties(), partial_count, config.cube_dim())?;
    check_launch(client.properties(), accum_count, accum_dim)?;

    log_launch(
        client,
        || {
            format!(
                "[Matmul] split_k<{}, {}, {}> m={} n={} k={} tiling={tiling} partitions={partitions} addmm={}",
                MP::EI::NAME,
                MP::EA::NAME,
                MP::EO::NAME,
                problem.m,
                problem.n,
                problem.k,
                source.is_some(),
            )
        },
        || format!("[Matmul] {config:?} {params:?}"),
    );

    let mut partials = vec![MP::EA::zero(); partitions * params.split_k_partition_stride];

    let mut partial = SplitKPartialKernel::<MP> {
        config,
        params: &params,
        a: lhs,
        b: rhs,
        partials: &mut partials,
    };
    client.execute(&mut partial, partial_count, config.cube_dim());

    let ldd = problem.n;
    let stride = params.split_k_partition_stride;
    match source {
        Some(source) => {
            let c_params = source.params(0);
            if c_params.do_axpby() {
                let op = TransformAxpby::new(
                    MP::EA::from_f64(c_params.alpha),
                    MP::EA::from_f64(c_params.beta),
                );
                let mut accum = SplitKAccumSourceKernel::<MP, _> {
                    partials: &partials,
                    d: out,
                    c: source.data,
                    c_params,
                    k_partitions: partitions,
                    partition_stride: stride,
                    ldd,
                    n: problem.n,
                    op,
                };
                client.execute(&mut accum, accum_count, accum_dim);
            } else {
                let mut accum = SplitKAccumSourceKernel::<MP, _> {
                    partials: &partials,
                    d: out,
                    c: source.data,
                    c_params,
                    k_partitions: partitions,
                    partition_stride: stride,
                    ldd,
                    n: problem.n,
                    op: TransformAdd,
                };
                client.execute(&mut accum, accum_count, accum_dim);
            }
        }
        None => {
            let mut accum = SplitKAccumKernel::<MP, _> {
                partials: &partials,
                d: out,
                k_partitions: partitions,
                partition_stride: stride,
                ldd,
                n: problem.n,
                epilogue: TransformNone,
            };
            client.execute(&mut accum, accum_count, accum_dim);
        }
    }

    Ok(())
}
