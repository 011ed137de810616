//! Convolution drivers over the GEMM building blocks.
mod general;
mod implicit;

pub use general::*;
pub use implicit::*;

use gemmkit_common::{Cube, SharedMemory};
use gemmkit_matmul::components::{GemmConfig, MatmulPrecision, tile::WarpMma};

use crate::components::loader::{ConvTileLoader, CubeConvLoader, WeightLoader};

/// Everything a cube keeps across K steps of a convolution.
pub(crate) struct ConvTiles<MP: MatmulPrecision, L> {
    pub a_s: SharedMemory<MP::EI>,
    pub b_s: SharedMemory<MP::EI>,
    pub loader_a: CubeConvLoader<L>,
    pub loader_b: CubeConvLoader<WeightLoader>,
    pub planes: Vec<WarpMma<MP>>,
}

impl<MP: MatmulPrecision, L: ConvTileLoader> ConvTiles<MP, L> {
    pub fn new(
        cube: &Cube,
        config: &GemmConfig,
        loader_a: CubeConvLoader<L>,
        loader_b: CubeConvLoader<WeightLoader>,
    ) -> Self {
        Self {
            a_s: cube.shared_memory(config.a_shared_len()),
            b_s: cube.shared_memory(config.b_shared_len()),
            loader_a,
            loader_b,
            planes: cube.planes().map(|plane| WarpMma::new(config, plane)).collect(),
        }
    }

    /// Stages one K step of both operands and multiplies them. With `remaining_k`, only the
    /// first channels of the block are read.
    pub fn step(
        &mut self,
        cube: &Cube,
        (a, b): (&[MP::EI], &[MP::EI]),
        remaining_k: Option<usize>,
    ) {
        cube.sync_cube();
        match remaining_k {
            Some(k) => {
                self.loader_a.load_safe(a, &mut self.a_s, k);
                self.loader_b.load_safe(b, &mut self.b_s, k);
            }
            None => {
                self.loader_a.load_unsafe(a, &mut self.a_s);
                self.loader_b.load_unsafe(b, &mut self.b_s);
            }
        }
        cube.sync_cube();

        for plane in self.planes.iter_mut() {
            plane.mma(&self.a_s, &self.b_s);
        }

        self.loader_a.next();
        self.loader_b.next();
    }
}
