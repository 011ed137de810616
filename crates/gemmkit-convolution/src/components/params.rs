use derive_new::new;
use gemmkit_matmul::components::TilingScheme;

use super::ConvParams;

/// Grid and reduction parameters of a convolution run as an implicit GEMM.
///
/// The GEMM is `M×K · K×N` per group, with `M` the output pixels, `N` the filters of a group
/// and `K` the taps times the channels of a group. The input jumps move a staged row of the
/// channel-aligned loader from one tap to the next: along the kernel width, to the next
/// kernel row, then back to the first tap of the next channel block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImplicitGemmConv2DParams {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    /// K steps of one channel block sweep, or of the whole reduction when channels are
    /// aligned.
    pub gemm_k_iterations: usize,
    pub inp_jump_w: isize,
    pub inp_jump_h: isize,
    pub inp_jump_c: isize,
    pub tiles_n: usize,
    pub tiles_m: usize,
    pub swizzle_log: u32,
}

impl ImplicitGemmConv2DParams {
    /// Parameters of the channel-aligned path, where every K step stays within one tap.
    pub fn new(params: &ConvParams<2>, tiling: TilingScheme, swizzle_log: u32) -> Self {
        let m = params.out_pixels();
        let n = params.out_channels_per_group();
        let k = params.reduction_len();

        let sign: isize = match params.flip {
            true => -1,
            false => 1,
        };
        let [kh, kw] = params.kernel_shape.map(|s| s as isize);
        let ijh = (params.in_strides[1] * params.kernel_dilation[0]) as isize;
        let ijw = (params.in_strides[2] * params.kernel_dilation[1]) as isize;

        Self {
            m,
            n,
            k,
            gemm_k_iterations: k / tiling.bk,
            inp_jump_w: sign * ijw,
            inp_jump_h: sign * (ijh - (kw - 1) * ijw),
            inp_jump_c: tiling.bk as isize - sign * (kh - 1) * ijh - sign * (kw - 1) * ijw,
            tiles_n: n.div_ceil(tiling.bn),
            tiles_m: m.div_ceil(tiling.bm),
            swizzle_log,
        }
    }

    /// Parameters of the general path. Rows cover the pixels of one output phase, and K
    /// steps sweep the channel blocks of every contributing tap.
    pub fn general(
        params: &ConvParams<2>,
        jump: &Conv2DGeneralJumpParams,
        tiling: TilingScheme,
        swizzle_log: u32,
    ) -> Self {
        let m = jump.adj_implicit_m;
        let n = params.out_channels_per_group();

        Self {
            m,
            n,
            k: params.reduction_len(),
            gemm_k_iterations: params.channels_per_group().div_ceil(tiling.bk),
            inp_jump_w: 0,
            inp_jump_h: 0,
            inp_jump_c: 0,
            tiles_n: n.div_ceil(tiling.bn),
            tiles_m: m.div_ceil(tiling.bm),
            swizzle_log,
        }
    }
}

/// Decomposition of a strided convolution over a dilated input into output phases.
///
/// With input dilation, only the taps landing on a real input pixel contribute. Which taps
/// those are repeats every `f_out_jump` output pixels, and within a phase the contributing
/// taps are every `f_wgt_jump`-th one. Each phase is then a dense convolution over
/// `adj_out` pixels per dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2DGeneralJumpParams {
    pub f_wgt_jump_h: usize,
    pub f_wgt_jump_w: usize,
    pub f_out_jump_h: usize,
    pub f_out_jump_w: usize,
    pub adj_out_h: usize,
    pub adj_out_w: usize,
    pub adj_out_hw: usize,
    pub adj_implicit_m: usize,
}

impl Conv2DGeneralJumpParams {
    pub fn new(params: &ConvParams<2>) -> Self {
        let [idil_h, idil_w] = params.input_dilation;
        let [kdil_h, kdil_w] = params.kernel_dilation;
        let [str_h, str_w] = params.stride;

        let f_wgt_jump_h = lcm(idil_h, kdil_h) / kdil_h;
        let f_wgt_jump_w = lcm(idil_w, kdil_w) / kdil_w;
        let f_out_jump_h = lcm(idil_h, str_h) / str_h;
        let f_out_jump_w = lcm(idil_w, str_w) / str_w;

        let adj_out_h = params.out_shape[0].div_ceil(f_out_jump_h);
        let adj_out_w = params.out_shape[1].div_ceil(f_out_jump_w);
        let adj_out_hw = adj_out_h * adj_out_w;

        Self {
            f_wgt_jump_h,
            f_wgt_jump_w,
            f_out_jump_h,
            f_out_jump_w,
            adj_out_h,
            adj_out_w,
            adj_out_hw,
            adj_implicit_m: params.batches * adj_out_hw,
        }
    }

    /// Output phases, one grid slice each.
    pub fn num_phases(&self) -> usize {
        self.f_out_jump_h * self.f_out_jump_w
    }

    /// Output coordinate of a row of a phase, along one dimension.
    pub fn out_coord(&self, adj: usize, jump: usize, base: usize) -> usize {
        adj * jump + base
    }
}

/// The taps of one kernel dimension contributing to one output phase: `weight_size` taps,
/// starting at `weight_base` and `f_wgt_jump` apart.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Conv2DGeneralBaseInfo {
    pub weight_base: usize,
    pub weight_size: usize,
}

impl Conv2DGeneralBaseInfo {
    /// Contributing taps of every phase along dimension `dim`.
    ///
    /// Tap `t` of output `o` reads the dilated input at `o·stride - padding + t·kdil`, which
    /// is a real pixel only when divisible by the input dilation.
    pub fn plan(
        params: &ConvParams<2>,
        jump: &Conv2DGeneralJumpParams,
        dim: usize,
    ) -> Vec<Conv2DGeneralBaseInfo> {
        let (f_out_jump, f_wgt_jump) = match dim {
            0 => (jump.f_out_jump_h, jump.f_wgt_jump_h),
            _ => (jump.f_out_jump_w, jump.f_wgt_jump_w),
        };
        let stride = params.stride[dim] as isize;
        let padding = params.padding[dim] as isize;
        let kdil = params.kernel_dilation[dim] as isize;
        let idil = params.input_dilation[dim] as isize;
        let kernel = params.kernel_shape[dim];

        (0..f_out_jump)
            .map(|phase| {
                let in_loop = phase as isize * stride - padding;
                let base = (0..f_wgt_jump.min(kernel))
                    .find(|&t| (in_loop + t as isize * kdil).rem_euclid(idil) == 0);

                match base {
                    Some(base) => Self::new(base, (kernel - base).div_ceil(f_wgt_jump)),
                    None => Self::new(kernel, 0),
                }
            })
            .collect()
    }
}

fn gcd(a: usize, b: usize) -> usize {
    match b {
        0 => a,
        _ => gcd(b, a % b),
    }
}

fn lcm(a: usize, b: usize) -> usize {
    a / gcd(a, b) * b
}
