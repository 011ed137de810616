use gemmkit_common::{Cube, Numeric, PLANE_DIM, UnitPos, plane::plane_sum_groups};
use gemmkit_runtime::CubeKernel;
use num_traits::{One, Zero};

use super::{BlockMasking, GemvConfig, GemvProblem, GemvTiling};
use crate::components::{Epilogue, MatmulPrecision, TransformScale};

/// The masks of a GEMV: one on the output, one pair on the operands.
///
/// The matrix and the vector masks share a type: both are masked or neither is.
#[derive(Debug, Clone)]
pub struct GemvMasks<OutMask: BlockMasking, OpMask: BlockMasking> {
    pub out: OutMask,
    pub mat: OpMask,
    pub vec: OpMask,
}

/// Mask offsets of one batch.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MaskBatch {
    pub out: usize,
    pub mat: usize,
    pub vec: usize,
}

impl<OutMask: BlockMasking, OpMask: BlockMasking> GemvMasks<OutMask, OpMask> {
    pub(crate) fn batch(&self, z: usize, batch_shape: &[usize]) -> MaskBatch {
        MaskBatch {
            out: self.out.batch_offset(z, batch_shape),
            mat: self.mat.batch_offset(z, batch_shape),
            vec: self.vec.batch_offset(z, batch_shape),
        }
    }

    /// Scale of a reduction block, `None` when either operand masks it out.
    ///
    /// `mat_block` is in the matrix storage orientation, the vector block is `in_block`.
    pub(crate) fn operand_scale<A: Numeric>(
        &self,
        batch: MaskBatch,
        mat_block: (usize, usize),
        in_block: usize,
    ) -> Option<A> {
        if !OpMask::ENABLED {
            return Some(A::one());
        }

        let mat = self.mat.block::<A>(batch.mat, mat_block.0, mat_block.1)?;
        let vec = self.vec.block::<A>(batch.vec, 0, in_block)?;

        match OpMask::MULTIPLICATIVE {
            true => Some(mat * vec),
            false => Some(A::one()),
        }
    }
}

/// Where a unit sits in the cube and which part of the problem it owns.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GemvUnit {
    pub thr_m: usize,
    pub thr_n: usize,
    pub sg_m: usize,
    pub sg_n: usize,
    /// First row (or reduction element for the transposed kernel) owned in the cube.
    pub bm: usize,
    /// First reduction element (or column for the transposed kernel) owned in the cube.
    pub bn: usize,
}

impl GemvUnit {
    pub fn new(tiling: &GemvTiling, unit: UnitPos) -> Self {
        let (plane, lane) = (unit.plane as usize, unit.lane as usize);
        let thr_m = lane / tiling.sn;
        let thr_n = lane % tiling.sn;
        let sg_m = plane / tiling.bn;
        let sg_n = plane % tiling.bn;

        Self {
            thr_m,
            thr_n,
            sg_m,
            sg_n,
            bm: (tiling.sm * sg_m + thr_m) * tiling.tm,
            bn: (tiling.sn * sg_n + thr_n) * tiling.tn,
        }
    }
}

/// Masked `out = mat·vec`, with the matrix stored `[out, in]`.
///
/// Every cube computes `block_m` consecutive outputs of one batch. Lanes sharing output rows
/// split the reduction in `tn`-wide slices, sum them with plane shuffles, then planes sharing
/// the rows combine through shared memory.
pub struct GemvKernel<'a, MP: MatmulPrecision, OutMask: BlockMasking, OpMask: BlockMasking> {
    pub config: GemvConfig,
    pub problem: &'a GemvProblem,
    pub mat: &'a [MP::EI],
    pub vec: &'a [MP::EI],
    pub out: &'a mut [MP::EO],
    pub masks: &'a GemvMasks<OutMask, OpMask>,
}

impl<MP: MatmulPrecision, OutMask: BlockMasking, OpMask: BlockMasking> CubeKernel
    for GemvKernel<'_, MP, OutMask, OpMask>
{
    fn execute(&mut self, cube: &Cube) {
        let t = self.config.tiling();
        let problem = self.problem;
        let (block_m, block_n) = (t.block_m(), t.block_n());
        let mask_block = self.config.mask_block().unwrap_or(block_n);

        let z = cube.pos.z as usize;
        let (mat_batch, vec_batch) = problem.batch_offsets(z);
        let out_batch = z * problem.out_size;
        let mask_batch = self.masks.batch(z, &problem.batch_shape);

        let n_iter = problem.in_size / block_n;
        let leftover = problem.in_size - n_iter * block_n;

        let units: Vec<UnitPos> = cube.units().collect();
        let mut results = vec![vec![MP::EA::zero(); t.tm]; units.len()];
        let mut active = vec![false; units.len()];

        for unit in units.iter() {
            let index = unit.absolute() as usize;
            let geo = GemvUnit::new(&t, *unit);
            let out_row = cube.pos.x as usize * block_m + geo.bm;
            if out_row >= problem.out_size {
                continue;
            }
            let rows = usize::min(t.tm, problem.out_size - out_row);
            let out_block = out_row / mask_block;

            let mut out_scale = MP::EA::one();
            if OutMask::ENABLED {
                match self.masks.out.block::<MP::EA>(mask_batch.out, 0, out_block) {
                    Some(scale) => out_scale = scale,
                    None => {
                        if geo.sg_n == 0 && geo.thr_n == 0 {
                            for row in out_row..out_row + rows {
                                self.out[out_batch + row] = MP::EO::zero();
                            }
                        }
                        continue;
                    }
                }
            }

            let result = &mut results[index];
            let mut v_coeff = vec![MP::EA::zero(); t.tn];
            let mut bn = geo.bn;
            let steps = n_iter + usize::from(leftover > 0);

            for step in 0..steps {
                let Some(block_scale) =
                    self.masks
                        .operand_scale::<MP::EA>(mask_batch, (out_block, step), step)
                else {
                    bn += block_n;
                    continue;
                };
                let scale = TransformScale::new(block_scale);
                let cols = match step < n_iter {
                    true => t.tn,
                    false => usize::min(t.tn, problem.in_size.saturating_sub(bn)),
                };

                for (tn, coeff) in v_coeff.iter_mut().enumerate() {
                    *coeff = match tn < cols {
                        true => self.vec[vec_batch + bn + tn].cast(),
                        false => MP::EA::zero(),
                    };
                    if OpMask::MULTIPLICATIVE {
                        *coeff = scale.apply(*coeff);
                    }
                }

                for (tm, acc) in result.iter_mut().enumerate().take(rows) {
                    let row = mat_batch + (out_row + tm) * problem.matrix_ld;
                    for (tn, coeff) in v_coeff.iter().enumerate().take(cols) {
                        *acc += self.mat[row + bn + tn].cast::<MP::EA>() * *coeff;
                    }
                }

                bn += block_n;
            }

            if OutMask::MULTIPLICATIVE {
                let scale = TransformScale::new(out_scale);
                for acc in result.iter_mut() {
                    *acc = scale.apply(*acc);
                }
            }

            active[index] = true;
        }

        for plane in cube.planes() {
            let lanes = plane as usize * PLANE_DIM as usize..(plane as usize + 1) * PLANE_DIM as usize;
            for tm in 0..t.tm {
                let mut values: Vec<MP::EA> = results[lanes.clone()].iter().map(|r| r[tm]).collect();
                plane_sum_groups(&mut values, t.sn as u32);
                for (result, value) in results[lanes.clone()].iter_mut().zip(values) {
                    result[tm] = value;
                }
            }
        }

        if t.bn > 1 {
            let stride = block_m + t.tm;
            let mut tgp = cube.shared_memory::<MP::EA>(t.bn * stride);

            for unit in units.iter() {
                let index = unit.absolute() as usize;
                let geo = GemvUnit::new(&t, *unit);
                if active[index] && geo.thr_n == 0 {
                    for tm in 0..t.tm {
                        tgp.write(geo.sg_n * stride + geo.bm + tm, results[index][tm]);
                    }
                }
            }

            cube.sync_cube();

            for unit in units.iter() {
                let index = unit.absolute() as usize;
                let geo = GemvUnit::new(&t, *unit);
                if active[index] && geo.thr_n == 0 && geo.sg_n == 0 {
                    for sgn in 1..t.bn {
                        for tm in 0..t.tm {
                            results[index][tm] += tgp.read(sgn * stride + geo.bm + tm);
                        }
                    }
                }
            }
        }

        for unit in units.iter() {
            let index = unit.absolute() as usize;
            let geo = GemvUnit::new(&t, *unit);
            if !active[index] || geo.sg_n != 0 || geo.thr_n != 0 {
                continue;
            }

            let out_row = cube.pos.x as usize * block_m + geo.bm;
            let rows = usize::min(t.tm, problem.out_size - out_row);
            for tm in 0..rows {
                self.out[out_batch + out_row + tm] = results[index][tm].cast();
            }
        }
    }
}
