use gemmkit_common::Numeric;
use gemmkit_runtime::ComputeClient;

use super::{GemmKernel, GemmSource};
use crate::components::{
    BatchLayout, GemmConfig, GemmParams, MatmulIdent, MatmulPrecision, MatmulProblem,
    MatmulSetupError, MatmulSource, TilingScheme,
    batch::{clamp_swizzle_log, default_swizzle_log, swizzled_cube_count},
    check_buffer_len, check_launch, log_launch,
};

/// Launches a tiled `out = lhs·rhs`.
pub fn launch_gemm<MP: MatmulPrecision>(
    client: &ComputeClient,
    problem: &MatmulProblem,
    tiling: TilingScheme,
    lhs: &[MP::EI],
    rhs: &[MP::EI],
    out: &mut [MP::EO],
) -> Result<(), MatmulSetupError> {
    launch_gemm_with_source::<MP>(client, problem, tiling, lhs, rhs, None, out)
}

/// Launches a tiled `out = alpha·(lhs·rhs) + beta·source`.
pub fn launch_addmm<MP: MatmulPrecision>(
    client: &ComputeClient,
    problem: &MatmulProblem,
    tiling: TilingScheme,
    lhs: &[MP::EI],
    rhs: &[MP::EI],
    source: &MatmulSource<'_, MP::EO>,
    out: &mut [MP::EO],
) -> Result<(), MatmulSetupError> {
    launch_gemm_with_source::<MP>(client, problem, tiling, lhs, rhs, Some(source), out)
}

fn launch_gemm_with_source<MP: MatmulPrecision>(
    client: &ComputeClient,
    problem: &MatmulProblem,
    tiling: TilingScheme,
    lhs: &[MP::EI],
    rhs: &[MP::EI],
    source: Option<&MatmulSource<'_, MP::EO>>,
    out: &mut [MP::EO],
) -> Result<(), MatmulSetupError> {
    problem.validate()?;
    check_buffer_len(MatmulIdent::Lhs, lhs.len(), problem.num_elems(MatmulIdent::Lhs))?;
    check_buffer_len(MatmulIdent::Rhs, rhs.len(), problem.num_elems(MatmulIdent::Rhs))?;
    check_buffer_len(MatmulIdent::Out, out.len(), problem.num_elems(MatmulIdent::Out))?;

    let config = GemmConfig::from_problem::<MP::EI>(tiling, problem)?;
    let tiles_m = problem.m.div_ceil(tiling.bm);
    let tiles_n = problem.n.div_ceil(tiling.bn);
    let swizzle_log = client
        .config()
        .matmul
        .swizzle_log
        .map(|log| clamp_swizzle_log(log, tiles_m))
        .unwrap_or_else(|| default_swizzle_log(tiles_m, tiles_n));

    let (batch, source) = match source {
        Some(source) => {
            source.validate(problem)?;
            let batch = BatchLayout::from_problem(problem, Some(source.batch_strides()));
            let batch_stride_c = batch.strides_c.last().copied().unwrap_or(0);
            let source = GemmSource {
                data: source.data,
                params: source.params(batch_stride_c),
            };
            (batch, Some(source))
        }
        None => (BatchLayout::from_problem(problem, None), None),
    };
    let params = GemmParams::new(problem, &config, &batch, swizzle_log);
    log::trace!("Gemm params {params:?}, batch layout {batch:?}");

    let count = swizzled_cube_count(tiles_m, tiles_n, swizzle_log, problem.num_batches())?;
    let dim = config.cube_dim();
    check_launch(client.properties(), count, dim)?;

    log_launch(
        client,
        || {
            format!(
                "[Matmul] gemm<{}, {}, {}> m={} n={} k={} batches={} tiling={tiling} swizzle_log={swizzle_log} addmm={}",
                MP::EI::NAME,
                MP::EA::NAME,
                MP::EO::NAME,
                problem.m,
                problem.n,
                problem.k,
                problem.num_batches(),
                source.is_some(),
            )
        },
        || format!("[Matmul] {config:?} {params:?} {batch:?}"),
    );

    let mut kernel = GemmKernel::<MP> {
        config,
        params: &params,
        batch: &batch,
        a: lhs,
        b: rhs,
        d: out,
        source,
    };
    client.execute(&mut kernel, count, dim);

    Ok(())
}
