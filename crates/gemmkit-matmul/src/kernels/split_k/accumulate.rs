use gemmkit_common::{Cube, Numeric, PLANE_DIM};
use gemmkit_runtime::CubeKernel;

use crate::components::{Epilogue, GemmAddMmParams, MatmulPrecision};

/// Second pass of a Split-K GEMM: sums the partials of every output element.
///
/// One unit per element: cube `(x, y)` covers 32 columns of row `y`.
pub struct SplitKAccumKernel<'a, MP: MatmulPrecision, Ep: Epilogue<MP::EA>> {
    pub partials: &'a [MP::EA],
    pub d: &'a mut [MP::EO],
    pub k_partitions: usize,
    pub partition_stride: usize,
    pub ldd: usize,
    pub n: usize,
    pub epilogue: Ep,
}

impl<MP: MatmulPrecision, Ep: Epilogue<MP::EA>> CubeKernel for SplitKAccumKernel<'_, MP, Ep> {
    fn execute(&mut self, cube: &Cube) {
        let row = cube.pos.y as usize;

        for unit in cube.units() {
            let col = cube.pos.x as usize * PLANE_DIM as usize + unit.lane as usize;
            if col >= self.n {
                continue;
            }

            let offset = row * self.ldd + col;
            let out = sum_partitions(self.partials, offset, self.k_partitions, self.partition_stride);
            self.d[offset] = self.epilogue.apply(out).cast();
        }
    }
}

/// Second pass of a Split-K addmm: combines the summed partials with the source `C`.
pub struct SplitKAccumSourceKernel<'a, MP: MatmulPrecision, Op: Epilogue<MP::EA>> {
    pub partials: &'a [MP::EA],
    pub d: &'a mut [MP::EO],
    pub c: &'a [MP::EO],
    pub c_params: GemmAddMmParams,
    pub k_partitions: usize,
    pub partition_stride: usize,
    pub ldd: usize,
    pub n: usize,
    pub op: Op,
}

impl<MP: MatmulPrecision, Op: Epilogue<MP::EA>> CubeKernel for SplitKAccumSourceKernel<'_, MP, Op> {
    fn execute(&mut self, cube: &Cube) {
        let row = cube.pos.y as usize;

        for unit in cube.units() {
            let col = cube.pos.x as usize * PLANE_DIM as usize + unit.lane as usize;
            if col >= self.n {
                continue;
            }

            let offset = row * self.ldd + col;
            let out = sum_partitions(self.partials, offset, self.k_partitions, self.partition_stride);
            let c = self.c[col * self.c_params.fdc + row * self.c_params.ldc];
            self.d[offset] = self.op.apply_with(out, c.cast()).cast();
        }
    }
}

fn sum_partitions<A: Numeric>(partials: &[A], offset: usize, partitions: usize, stride: usize) -> A {
    (0..partitions).fold(A::zero(), |acc, i| acc + partials[offset + i * stride])
}
