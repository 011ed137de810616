use gemmkit_common::Cube;
use gemmkit_matmul::components::{
    GemmConfig, MatmulPrecision,
    batch::swizzle,
    tile::TileDims,
};
use gemmkit_runtime::CubeKernel;

use super::ConvTiles;
use crate::components::{
    Conv2DGeneralBaseInfo, Conv2DGeneralJumpParams, ImplicitGemmConv2DParams,
    loader::{ConvGeometry, CubeConvLoader, GeneralInputLoader, TapWalk, WeightLoader},
};

/// General implicit GEMM convolution: flipped or dilated kernels, dilated inputs and any
/// number of channels.
///
/// The z position of a cube selects a group and an output phase. Rows of the tile are the
/// pixels of that phase, and the reduction only visits the taps contributing to it, one
/// channel block at a time. The last block of each tap is read with a channel mask when the
/// channels of a group are not a whole number of blocks.
pub struct GeneralConvKernel<'a, MP: MatmulPrecision> {
    pub config: GemmConfig,
    pub geometry: ConvGeometry,
    pub gemm: &'a ImplicitGemmConv2DParams,
    pub jump: &'a Conv2DGeneralJumpParams,
    pub base_h: &'a [Conv2DGeneralBaseInfo],
    pub base_w: &'a [Conv2DGeneralBaseInfo],
    /// Input channels of a group.
    pub channels: usize,
    /// Strides of the output batch, row and column dimensions.
    pub out_strides: [usize; 3],
    pub input: &'a [MP::EI],
    pub weight: &'a [MP::EI],
    pub out: &'a mut [MP::EO],
}

impl<MP: MatmulPrecision> CubeKernel for GeneralConvKernel<'_, MP> {
    fn execute(&mut self, cube: &Cube) {
        let gemm = self.gemm;
        let jump = self.jump;
        let config = self.config;
        let tiling = config.tiling();
        let geometry = self.geometry;

        let (tid_x, tid_y) = swizzle(cube.pos, gemm.swizzle_log);
        if gemm.tiles_n <= tid_x || gemm.tiles_m <= tid_y {
            return;
        }

        let c_row = tid_y * tiling.bm;
        let c_col = tid_x * tiling.bn;
        let z = cube.pos.z as usize;
        let (group, phase) = (z / jump.num_phases(), z % jump.num_phases());
        let base_oh = phase / jump.f_out_jump_w;
        let base_ow = phase % jump.f_out_jump_w;
        let (base_h, base_w) = (self.base_h[base_oh], self.base_w[base_ow]);

        let taps = TapWalk::new(
            [base_h.weight_base, base_w.weight_base],
            [jump.f_wgt_jump_h, jump.f_wgt_jump_w],
            geometry.kernel_shape,
            tiling.bk,
        );
        let loader_a = CubeConvLoader::new(cube, |unit| {
            GeneralInputLoader::new(
                &config.a_loader(),
                geometry,
                jump,
                [base_oh, base_ow],
                taps,
                c_row,
                group * self.channels,
                unit,
            )
        });
        let loader_b = CubeConvLoader::new(cube, |unit| {
            WeightLoader::new(
                &config.b_loader(),
                &geometry,
                taps,
                geometry.flip,
                gemm.n,
                c_col,
                group * gemm.n,
                unit,
            )
        });
        let mut tiles = ConvTiles::<MP, _>::new(cube, &config, loader_a, loader_b);

        let num_taps = base_h.weight_size * base_w.weight_size;
        let remaining_k = self.channels % tiling.bk;
        let full_blocks = match remaining_k {
            0 => gemm.gemm_k_iterations,
            _ => gemm.gemm_k_iterations - 1,
        };

        for _ in 0..full_blocks * num_taps {
            tiles.step(cube, (self.input, self.weight), None);
        }
        if remaining_k != 0 {
            for _ in 0..num_taps {
                tiles.step(cube, (self.input, self.weight), Some(remaining_k));
            }
        }

        // Rows are scattered back to their pixel; those past the output are padding.
        let [s_n, s_h, s_w] = self.out_strides;
        let [out_h, out_w] = geometry.out_shape;
        let col_offset = group * gemm.n + c_col;
        let dims = TileDims::new(tiling.bm, usize::min(tiling.bn, gemm.n - c_col));

        for plane in tiles.planes.iter() {
            plane.store_result_indexed(self.out, Some(dims), |row, col| {
                let m = c_row + row;
                let n = m / jump.adj_out_hw;
                let hw = m % jump.adj_out_hw;
                let oh = jump.out_coord(hw / jump.adj_out_w, jump.f_out_jump_h, base_oh);
                let ow = jump.out_coord(hw % jump.adj_out_w, jump.f_out_jump_w, base_ow);

                (n < geometry.batches && oh < out_h && ow < out_w)
                    .then(|| n * s_n + oh * s_h + ow * s_w + col_offset + col)
            });
        }
    }
}
