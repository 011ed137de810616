use gemmkit_common::Cube;
use gemmkit_matmul::components::{
    GemmConfig, MatmulPrecision,
    batch::swizzle,
    tile::{Strided, TileDims},
};
use gemmkit_runtime::CubeKernel;

use super::ConvTiles;
use crate::components::{
    ImplicitGemmConv2DParams,
    loader::{ConvGeometry, CubeConvLoader, ImplicitInputLoader, TapWalk, WeightLoader},
};

/// Channel-aligned implicit GEMM convolution.
///
/// Every cube computes a `bm×bn` tile of output pixels by filters of one group, the group
/// being the z position of the cube. K steps read `bk` channels of one tap at a time.
pub struct ImplicitConvKernel<'a, MP: MatmulPrecision> {
    pub config: GemmConfig,
    pub geometry: ConvGeometry,
    pub gemm: &'a ImplicitGemmConv2DParams,
    /// Input channels of a group.
    pub channels: usize,
    /// Row stride of the output, its total number of filters.
    pub out_ld: usize,
    pub input: &'a [MP::EI],
    pub weight: &'a [MP::EI],
    pub out: &'a mut [MP::EO],
}

impl<MP: MatmulPrecision> CubeKernel for ImplicitConvKernel<'_, MP> {
    fn execute(&mut self, cube: &Cube) {
        let gemm = self.gemm;
        let config = self.config;
        let tiling = config.tiling();

        let (tid_x, tid_y) = swizzle(cube.pos, gemm.swizzle_log);
        if gemm.tiles_n <= tid_x || gemm.tiles_m <= tid_y {
            return;
        }

        let c_row = tid_y * tiling.bm;
        let c_col = tid_x * tiling.bn;
        let group = cube.pos.z as usize;
        let geometry = self.geometry;

        let loader_a = CubeConvLoader::new(cube, |unit| {
            ImplicitInputLoader::new(
                &config.a_loader(),
                geometry,
                gemm,
                c_row,
                group * self.channels,
                unit,
            )
        });
        let loader_b = CubeConvLoader::new(cube, |unit| {
            WeightLoader::new(
                &config.b_loader(),
                &geometry,
                TapWalk::dense(geometry.kernel_shape, tiling.bk),
                false,
                gemm.n,
                c_col,
                group * gemm.n,
                unit,
            )
        });
        let mut tiles = ConvTiles::<MP, _>::new(cube, &config, loader_a, loader_b);

        for _ in 0..gemm.gemm_k_iterations {
            tiles.step(cube, (self.input, self.weight), None);
        }

        let layout = Strided::row_major(c_row * self.out_ld + group * gemm.n + c_col, self.out_ld);
        let dims = TileDims::new(
            usize::min(tiling.bm, gemm.m - c_row),
            usize::min(tiling.bn, gemm.n - c_col),
        );

        for plane in tiles.planes.iter() {
            match dims.rows == tiling.bm && dims.cols == tiling.bn {
                true => plane.store_result(self.out, layout),
                false => plane.store_result_safe(self.out, layout, dims),
            }
        }
    }
}
