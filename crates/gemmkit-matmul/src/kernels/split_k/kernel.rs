use gemmkit_common::Cube;
use gemmkit_runtime::CubeKernel;

use crate::components::{
    GemmConfig, GemmSplitKParams, MatmulPrecision,
    tile::{Strided, TileDims},
};
use crate::kernels::gemm::{CubeTiles, LoopExtent, dispatch_gemm_loop, gemm_loop};

/// First pass of a Split-K GEMM.
///
/// Cube `(x, y, z)` reduces partition `z` of K for output tile `(x, y)` and writes the
/// partial sum, in the accumulation type, to slab `z` of the workspace. The last partition
/// also covers what is left of K after the whole partitions.
pub struct SplitKPartialKernel<'a, MP: MatmulPrecision> {
    pub config: GemmConfig,
    pub params: &'a GemmSplitKParams,
    pub a: &'a [MP::EI],
    pub b: &'a [MP::EI],
    pub partials: &'a mut [MP::EA],
}

impl<MP: MatmulPrecision> CubeKernel for SplitKPartialKernel<'_, MP> {
    fn execute(&mut self, cube: &Cube) {
        let params = self.params;
        let config = self.config;
        let tiling = config.tiling();

        let (tid_x, tid_y, tid_z) = (
            cube.pos.x as usize,
            cube.pos.y as usize,
            cube.pos.z as usize,
        );
        if params.tiles_n <= tid_x || params.tiles_m <= tid_y {
            return;
        }

        let c_row = tid_y * tiling.bm;
        let c_col = tid_x * tiling.bn;
        let k_start = params.split_k_partition_size * tid_z;

        let a_offset = match config.transpose_a() {
            true => c_row + k_start * params.lda,
            false => k_start + c_row * params.lda,
        };
        let b_offset = match config.transpose_b() {
            true => k_start + c_col * params.ldb,
            false => c_col + k_start * params.ldb,
        };
        let c_layout = Strided::row_major(
            params.split_k_partition_stride * tid_z + c_row * params.ldc + c_col,
            params.ldc,
        );

        let mut tiles =
            CubeTiles::<MP>::new(cube, &config, (a_offset, params.lda), (b_offset, params.ldb));
        let extent = LoopExtent {
            tgp_bm: usize::min(tiling.bm, params.m - c_row),
            tgp_bn: usize::min(tiling.bn, params.n - c_col),
            lbk: params.k % tiling.bk,
        };

        dispatch_gemm_loop(
            cube,
            &mut tiles,
            (self.a, self.b),
            &config,
            params.gemm_k_iterations_aligned,
            extent,
            true,
        );

        cube.sync_cube();

        if tid_z + 1 == params.split_k_partitions {
            let remaining = params.k - (k_start + params.split_k_partition_size);
            let gemm_k_iter_remaining = remaining / tiling.bk;

            if !config.k_aligned() || gemm_k_iter_remaining > 0 {
                let operands = (self.a, self.b);
                match config.k_aligned() {
                    true => gemm_loop::<MP, false, false, true>(
                        cube,
                        &mut tiles,
                        operands,
                        &config,
                        gemm_k_iter_remaining,
                        extent,
                    ),
                    false => gemm_loop::<MP, false, false, false>(
                        cube,
                        &mut tiles,
                        operands,
                        &config,
                        gemm_k_iter_remaining,
                        extent,
                    ),
                }
            }
        }

        let bounds = match extent.tgp_bm == tiling.bm && extent.tgp_bn == tiling.bn {
            true => None,
            false => Some(TileDims::new(extent.tgp_bm, extent.tgp_bn)),
        };
        tiles.store(self.partials, c_layout, bounds);
    }
}
