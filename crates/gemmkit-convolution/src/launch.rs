use gemmkit_common::Numeric;
use gemmkit_matmul::components::{
    GemmConfig, MatmulIdent, MatmulPrecision, TilingScheme,
    batch::{clamp_swizzle_log, default_swizzle_log, swizzled_cube_count},
    check_buffer_len, check_launch, log_launch,
};
use gemmkit_runtime::ComputeClient;

use crate::{
    components::{
        Conv2DGeneralBaseInfo, Conv2DGeneralJumpParams, ConvAlgorithm, ConvParams,
        ConvSetupError, ImplicitGemmConv2DParams, is_channel_aligned, loader::ConvGeometry,
        resolve_conv_algorithm, select_conv_tiling,
    },
    kernels::{GeneralConvKernel, ImplicitConvKernel},
};

/// Launches a 2D convolution of `input` by `weight` into `out`, picking the tiling and the
/// algorithm.
pub fn launch_conv2d<MP: MatmulPrecision>(
    client: &ComputeClient,
    params: &ConvParams<2>,
    input: &[MP::EI],
    weight: &[MP::EI],
    out: &mut [MP::EO],
) -> Result<(), ConvSetupError> {
    launch_conv2d_with::<MP>(client, ConvAlgorithm::Auto, None, params, input, weight, out)
}

/// Launches a 1D convolution as a 2D one over a single row.
pub fn launch_conv1d<MP: MatmulPrecision>(
    client: &ComputeClient,
    params: &ConvParams<1>,
    input: &[MP::EI],
    weight: &[MP::EI],
    out: &mut [MP::EO],
) -> Result<(), ConvSetupError> {
    launch_conv2d::<MP>(client, &params.as_conv2d(), input, weight, out)
}

/// Launches a 2D convolution with the given algorithm, and the given tiling or the default
/// one.
pub fn launch_conv2d_with<MP: MatmulPrecision>(
    client: &ComputeClient,
    algorithm: ConvAlgorithm,
    tiling: Option<TilingScheme>,
    params: &ConvParams<2>,
    input: &[MP::EI],
    weight: &[MP::EI],
    out: &mut [MP::EO],
) -> Result<(), ConvSetupError> {
    check_buffer_len(MatmulIdent::Lhs, input.len(), params.input_len())?;
    check_buffer_len(MatmulIdent::Rhs, weight.len(), params.weight_len())?;
    check_buffer_len(MatmulIdent::Out, out.len(), params.out_len())?;

    let tiling = tiling.unwrap_or_else(|| select_conv_tiling(params));
    let config = GemmConfig::new::<MP::EI>(
        tiling,
        false,
        true,
        (
            params.out_pixels(),
            params.out_channels_per_group(),
            params.reduction_len(),
        ),
    )?;

    match resolve_conv_algorithm(algorithm, params, &tiling) {
        ConvAlgorithm::Implicit => {
            if !is_channel_aligned(params, &tiling) {
                return Err(ConvSetupError::Geometry(format!(
                    "The implicit algorithm needs an undilated input and channels per group \
                     divisible by {}, got input dilation {:?} and {} channels",
                    tiling.bk,
                    params.input_dilation,
                    params.channels_per_group()
                )));
            }
            launch_implicit::<MP>(client, config, params, input, weight, out)
        }
        _ => launch_general::<MP>(client, config, params, input, weight, out),
    }
}

fn swizzle_log(client: &ComputeClient, tiles_m: usize, tiles_n: usize) -> u32 {
    client
        .config()
        .matmul
        .swizzle_log
        .map(|log| clamp_swizzle_log(log, tiles_m))
        .unwrap_or_else(|| default_swizzle_log(tiles_m, tiles_n))
}

fn launch_implicit<MP: MatmulPrecision>(
    client: &ComputeClient,
    config: GemmConfig,
    params: &ConvParams<2>,
    input: &[MP::EI],
    weight: &[MP::EI],
    out: &mut [MP::EO],
) -> Result<(), ConvSetupError> {
    let tiling = config.tiling();
    let tiles_m = params.out_pixels().div_ceil(tiling.bm);
    let tiles_n = params.out_channels_per_group().div_ceil(tiling.bn);
    let gemm =
        ImplicitGemmConv2DParams::new(params, tiling, swizzle_log(client, tiles_m, tiles_n));

    let count = swizzled_cube_count(gemm.tiles_m, gemm.tiles_n, gemm.swizzle_log, params.groups)?;
    let dim = config.cube_dim();
    check_launch(client.properties(), count, dim)?;

    log_launch(
        client,
        || {
            format!(
                "[Conv] implicit<{}, {}, {}> {} tiling={tiling} swizzle_log={}",
                MP::EI::NAME,
                MP::EA::NAME,
                MP::EO::NAME,
                describe(params),
                gemm.swizzle_log,
            )
        },
        || format!("[Conv] {config:?} {gemm:?}"),
    );

    let mut kernel = ImplicitConvKernel::<MP> {
        config,
        geometry: ConvGeometry::new(params),
        gemm: &gemm,
        channels: params.channels_per_group(),
        out_ld: params.out_channels,
        input,
        weight,
        out,
    };
    client.execute(&mut kernel, count, dim);

    Ok(())
}

fn launch_general<MP: MatmulPrecision>(
    client: &ComputeClient,
    config: GemmConfig,
    params: &ConvParams<2>,
    input: &[MP::EI],
    weight: &[MP::EI],
    out: &mut [MP::EO],
) -> Result<(), ConvSetupError> {
    let tiling = config.tiling();
    let jump = Conv2DGeneralJumpParams::new(params);
    let base_h = Conv2DGeneralBaseInfo::plan(params, &jump, 0);
    let base_w = Conv2DGeneralBaseInfo::plan(params, &jump, 1);
    log::debug!("Conv2d phases {jump:?}, taps along h {base_h:?}, along w {base_w:?}");

    let tiles_m = jump.adj_implicit_m.div_ceil(tiling.bm);
    let tiles_n = params.out_channels_per_group().div_ceil(tiling.bn);
    let gemm = ImplicitGemmConv2DParams::general(
        params,
        &jump,
        tiling,
        swizzle_log(client, tiles_m, tiles_n),
    );

    let count = swizzled_cube_count(
        gemm.tiles_m,
        gemm.tiles_n,
        gemm.swizzle_log,
        params.groups * jump.num_phases(),
    )?;
    let dim = config.cube_dim();
    check_launch(client.properties(), count, dim)?;

    log_launch(
        client,
        || {
            format!(
                "[Conv] general<{}, {}, {}> {} phases={} tiling={tiling} swizzle_log={}",
                MP::EI::NAME,
                MP::EA::NAME,
                MP::EO::NAME,
                describe(params),
                jump.num_phases(),
                gemm.swizzle_log,
            )
        },
        || format!("[Conv] {config:?} {gemm:?} {jump:?}"),
    );

    let mut kernel = GeneralConvKernel::<MP> {
        config,
        geometry: ConvGeometry::new(params),
        gemm: &gemm,
        jump: &jump,
        base_h: &base_h,
        base_w: &base_w,
        channels: params.channels_per_group(),
        out_strides: [
            params.out_strides[0],
            params.out_strides[1],
            params.out_strides[2],
        ],
        input,
        weight,
        out,
    };
    client.execute(&mut kernel, count, dim);

    Ok(())
}

fn describe(params: &ConvParams<2>) -> String {
    format!(
        "batches={} in={:?}x{} out={:?}x{} kernel={:?} stride={:?} padding={:?} \
         kdil={:?} idil={:?} groups={} flip={}",
        params.batches,
        params.in_shape,
        params.in_channels,
        params.out_shape,
        params.out_channels,
        params.kernel_shape,
        params.stride,
        params.padding,
        params.kernel_dilation,
        params.input_dilation,
        params.groups,
        params.flip,
    )
}
