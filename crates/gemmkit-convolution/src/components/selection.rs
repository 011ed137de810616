use gemmkit_matmul::components::TilingScheme;
use serde::{Deserialize, Serialize};

use super::ConvParams;

/// The convolution algorithm to launch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConvAlgorithm {
    /// The implicit GEMM over whole channel blocks. Only valid without input dilation and
    /// with channels per group a multiple of `bk`.
    Implicit,
    /// The phase-decomposed implicit GEMM, valid for any geometry.
    General,
    #[default]
    /// The implicit path when the geometry allows it, the general one otherwise.
    Auto,
}

/// Default tiling of a 2D convolution.
///
/// Only many output pixels over wide inputs justify 64 rows, and 64 filters per tile only
/// then. The reduction goes 16 channels at a time over 2×2 planes.
pub fn select_conv_tiling(params: &ConvParams<2>) -> TilingScheme {
    let m = params.out_pixels();
    let n = params.out_channels_per_group();

    let bm = match m >= 8192 && params.channels_per_group() >= 64 {
        true => 64,
        false => 32,
    };
    let bn = match bm == 64 && n >= 64 {
        true => 64,
        false => 32,
    };

    TilingScheme::new(bm, bn, 16, 2, 2)
}

/// Resolves [ConvAlgorithm::Auto] for `params` under `tiling`.
pub fn resolve_conv_algorithm(
    algorithm: ConvAlgorithm,
    params: &ConvParams<2>,
    tiling: &TilingScheme,
) -> ConvAlgorithm {
    match algorithm {
        ConvAlgorithm::Auto => match is_channel_aligned(params, tiling) {
            true => ConvAlgorithm::Implicit,
            false => ConvAlgorithm::General,
        },
        algorithm => algorithm,
    }
}

/// Whether the implicit path can run `params`: every K step then reads whole channel blocks
/// of a single tap, from an input without holes.
pub fn is_channel_aligned(params: &ConvParams<2>, tiling: &TilingScheme) -> bool {
    !params.is_input_dilated() && params.channels_per_group() % tiling.bk == 0
}
