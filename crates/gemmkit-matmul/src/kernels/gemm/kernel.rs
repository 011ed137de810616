use gemmkit_common::{Cube, Numeric, SharedMemory};
use gemmkit_runtime::CubeKernel;

use crate::components::{
    BatchLayout, Epilogue, GemmAddMmParams, GemmConfig, GemmParams, MatmulPrecision,
    TransformAdd, TransformAxpby,
    batch::swizzle,
    global::CubeTileLoader,
    tile::{Strided, TileDims, WarpMma},
};

/// The fused source operand of an addmm.
#[derive(Debug, Clone, Copy)]
pub struct GemmSource<'a, E> {
    pub data: &'a [E],
    pub params: GemmAddMmParams,
}

/// Tiled GEMM: every cube computes one `bm×bn` tile of one batch of `D = A·B`, optionally
/// combined with a source `C`.
pub struct GemmKernel<'a, MP: MatmulPrecision> {
    pub config: GemmConfig,
    pub params: &'a GemmParams,
    pub batch: &'a BatchLayout,
    pub a: &'a [MP::EI],
    pub b: &'a [MP::EI],
    pub d: &'a mut [MP::EO],
    pub source: Option<GemmSource<'a, MP::EO>>,
}

/// Everything a cube keeps across K steps.
pub(crate) struct CubeTiles<MP: MatmulPrecision> {
    pub a_s: SharedMemory<MP::EI>,
    pub b_s: SharedMemory<MP::EI>,
    pub loader_a: CubeTileLoader<MP::EI>,
    pub loader_b: CubeTileLoader<MP::EI>,
    pub planes: Vec<WarpMma<MP>>,
}

impl<MP: MatmulPrecision> CubeTiles<MP> {
    pub fn new(
        cube: &Cube,
        config: &GemmConfig,
        (a_offset, lda): (usize, usize),
        (b_offset, ldb): (usize, usize),
    ) -> Self {
        Self {
            a_s: cube.shared_memory(config.a_shared_len()),
            b_s: cube.shared_memory(config.b_shared_len()),
            loader_a: CubeTileLoader::new(config.a_loader(), a_offset, lda, cube),
            loader_b: CubeTileLoader::new(config.b_loader(), b_offset, ldb, cube),
            planes: cube.planes().map(|plane| WarpMma::new(config, plane)).collect(),
        }
    }

    pub fn mma(&mut self) {
        for plane in self.planes.iter_mut() {
            plane.mma(&self.a_s, &self.b_s);
        }
    }

    pub fn next(&mut self) {
        self.loader_a.next();
        self.loader_b.next();
    }

    /// Loads both tiles within the given extents and multiplies them.
    pub fn safe_step(&mut self, cube: &Cube, a: &[MP::EI], b: &[MP::EI], dims: [TileDims; 2]) {
        cube.sync_cube();
        self.loader_a.load_safe(a, &mut self.a_s, dims[0]);
        self.loader_b.load_safe(b, &mut self.b_s, dims[1]);
        cube.sync_cube();
        self.mma();
    }

    pub fn store<O: Numeric>(&self, d: &mut [O], layout: Strided, bounds: Option<TileDims>) {
        for plane in self.planes.iter() {
            match bounds {
                Some(dims) => plane.store_result_safe(d, layout, dims),
                None => plane.store_result(d, layout),
            }
        }
    }

    pub fn apply_source<Op: Epilogue<MP::EA>>(
        &mut self,
        c: &[MP::EO],
        layout: Strided,
        bounds: Option<TileDims>,
        op: Op,
    ) {
        for plane in self.planes.iter_mut() {
            match bounds {
                Some(dims) => plane.apply_epilogue_with_safe(c, layout, dims, op),
                None => plane.apply_epilogue_with(c, layout, op),
            }
        }
    }
}

/// Valid extent of the tile owned by a cube.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopExtent {
    pub tgp_bm: usize,
    pub tgp_bn: usize,
    /// K elements left after the whole steps.
    pub lbk: usize,
}

/// The K loop of an edge tile.
///
/// Operands whose side of the tile is aligned load without checks. When `K_ALIGNED` is false,
/// one extra step loads the `lbk` leftover elements of the reduction.
pub(crate) fn gemm_loop<
    MP: MatmulPrecision,
    const M_ALIGNED: bool,
    const N_ALIGNED: bool,
    const K_ALIGNED: bool,
>(
    cube: &Cube,
    tiles: &mut CubeTiles<MP>,
    (a, b): (&[MP::EI], &[MP::EI]),
    config: &GemmConfig,
    gemm_k_iterations: usize,
    extent: LoopExtent,
) {
    let bk = config.tiling().bk;
    let dims_a = config.a_tile_dims(extent.tgp_bm, bk);
    let dims_b = config.b_tile_dims(extent.tgp_bn, bk);

    for _ in 0..gemm_k_iterations {
        cube.sync_cube();
        if M_ALIGNED {
            tiles.loader_a.load_unsafe(a, &mut tiles.a_s);
        } else {
            tiles.loader_a.load_safe(a, &mut tiles.a_s, dims_a);
        }
        if N_ALIGNED {
            tiles.loader_b.load_unsafe(b, &mut tiles.b_s);
        } else {
            tiles.loader_b.load_safe(b, &mut tiles.b_s, dims_b);
        }
        cube.sync_cube();

        tiles.mma();
        tiles.next();
    }

    if !K_ALIGNED {
        let dims_a_last = config.a_tile_dims(extent.tgp_bm, extent.lbk);
        let dims_b_last = config.b_tile_dims(extent.tgp_bn, extent.lbk);
        tiles.safe_step(cube, a, b, [dims_a_last, dims_b_last]);
    }
}

/// Runs the loop variant matching the tile alignment.
pub(crate) fn dispatch_gemm_loop<MP: MatmulPrecision>(
    cube: &Cube,
    tiles: &mut CubeTiles<MP>,
    operands: (&[MP::EI], &[MP::EI]),
    config: &GemmConfig,
    gemm_k_iterations: usize,
    extent: LoopExtent,
    k_aligned: bool,
) {
    let tiling = config.tiling();
    let m_aligned = extent.tgp_bm == tiling.bm;
    let n_aligned = extent.tgp_bn == tiling.bn;

    macro_rules! run {
        ($m:literal, $n:literal) => {
            match k_aligned {
                true => gemm_loop::<MP, $m, $n, true>(
                    cube,
                    tiles,
                    operands,
                    config,
                    gemm_k_iterations,
                    extent,
                ),
                false => gemm_loop::<MP, $m, $n, false>(
                    cube,
                    tiles,
                    operands,
                    config,
                    gemm_k_iterations,
                    extent,
                ),
            }
        };
    }

    match (m_aligned, n_aligned) {
        (true, true) => run!(true, true),
        (false, true) => run!(false, true),
        (true, false) => run!(true, false),
        (false, false) => run!(false, false),
    }
}

impl<MP: MatmulPrecision> CubeKernel for GemmKernel<'_, MP> {
    fn execute(&mut self, cube: &Cube) {
        let params = self.params;
        let config = self.config;
        let tiling = config.tiling();

        let (tid_x, tid_y) = swizzle(cube.pos, params.swizzle_log);
        if params.tiles_n <= tid_x || params.tiles_m <= tid_y {
            return;
        }

        let c_row = tid_y * tiling.bm;
        let c_col = tid_x * tiling.bn;
        let z = cube.pos.z as usize;

        let batch_stride_c = self.source.map_or(0, |source| source.params.batch_stride_c);
        let [batch_a, batch_b, batch_c] = self.batch.offsets(
            z,
            [params.batch_stride_a, params.batch_stride_b, batch_stride_c],
        );

        let a_offset = batch_a
            + match config.transpose_a() {
                true => c_row,
                false => c_row * params.lda,
            };
        let b_offset = batch_b
            + match config.transpose_b() {
                true => c_col * params.ldb,
                false => c_col,
            };
        let d_layout = Strided::row_major(
            z * params.batch_stride_d + c_row * params.ldd + c_col,
            params.ldd,
        );

        let mut tiles =
            CubeTiles::<MP>::new(cube, &config, (a_offset, params.lda), (b_offset, params.ldb));
        let gemm_k_iterations = params.gemm_k_iterations_aligned;
        let lbk = params.k - gemm_k_iterations * tiling.bk;

        let bounds = if config.mn_aligned() {
            for _ in 0..gemm_k_iterations {
                cube.sync_cube();
                tiles.loader_a.load_unsafe(self.a, &mut tiles.a_s);
                tiles.loader_b.load_unsafe(self.b, &mut tiles.b_s);
                cube.sync_cube();

                tiles.mma();
                tiles.next();
            }

            cube.sync_cube();

            if !config.k_aligned() {
                let dims_a = config.a_tile_dims(tiling.bm, lbk);
                let dims_b = config.b_tile_dims(tiling.bn, lbk);
                tiles.loader_a.load_safe(self.a, &mut tiles.a_s, dims_a);
                tiles.loader_b.load_safe(self.b, &mut tiles.b_s, dims_b);
                cube.sync_cube();

                tiles.mma();
            }

            None
        } else {
            let extent = LoopExtent {
                tgp_bm: usize::min(tiling.bm, params.m - c_row),
                tgp_bn: usize::min(tiling.bn, params.n - c_col),
                lbk,
            };

            dispatch_gemm_loop(
                cube,
                &mut tiles,
                (self.a, self.b),
                &config,
                gemm_k_iterations,
                extent,
                config.k_aligned(),
            );

            match extent.tgp_bm == tiling.bm && extent.tgp_bn == tiling.bn {
                true => None,
                false => Some(TileDims::new(extent.tgp_bm, extent.tgp_bn)),
            }
        };

        if let Some(source) = self.source {
            let c_params = source.params;
            let c_layout = Strided::new(
                batch_c + c_row * c_params.ldc + c_col * c_params.fdc,
                c_params.ldc,
                c_params.fdc,
            );

            if c_params.do_axpby() {
                let op = TransformAxpby::new(
                    MP::EA::from_f64(c_params.alpha),
                    MP::EA::from_f64(c_params.beta),
                );
                tiles.apply_source(source.data, c_layout, bounds, op);
            } else {
                tiles.apply_source(source.data, c_layout, bounds, TransformAdd);
            }
        }

        tiles.store(self.d, d_layout, bounds);
    }
}
