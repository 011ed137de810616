use gemmkit_common::{Cube, Numeric, PLANE_DIM, UnitPos, plane::plane_sum_strided};
use gemmkit_runtime::CubeKernel;
use num_traits::{One, Zero};

use super::{BlockMasking, GemvConfig, GemvMasks, GemvProblem, GemvUnit};
use crate::components::{Epilogue, MatmulPrecision, TransformScale};

/// Masked `out = vecᵀ·mat`, with the matrix stored `[in, out]`.
///
/// Every cube computes `block_n` consecutive outputs. Lanes sharing output columns split the
/// reduction in `tm`-deep slices; the plane reduces along its slow axis, then planes sharing the
/// columns combine through shared memory.
pub struct GemvTKernel<'a, MP: MatmulPrecision, OutMask: BlockMasking, OpMask: BlockMasking> {
    pub config: GemvConfig,
    pub problem: &'a GemvProblem,
    pub mat: &'a [MP::EI],
    pub vec: &'a [MP::EI],
    pub out: &'a mut [MP::EO],
    pub masks: &'a GemvMasks<OutMask, OpMask>,
}

impl<MP: MatmulPrecision, OutMask: BlockMasking, OpMask: BlockMasking> CubeKernel
    for GemvTKernel<'_, MP, OutMask, OpMask>
{
    fn execute(&mut self, cube: &Cube) {
        let t = self.config.tiling();
        let problem = self.problem;
        let (block_m, block_n) = (t.block_m(), t.block_n());
        let mask_block = self.config.mask_block().unwrap_or(block_m);

        let z = cube.pos.z as usize;
        let (mat_batch, vec_batch) = problem.batch_offsets(z);
        let out_batch = z * problem.out_size;
        let mask_batch = self.masks.batch(z, &problem.batch_shape);

        let n_iter = problem.in_size / block_m;
        let leftover = problem.in_size - n_iter * block_m;

        let units: Vec<UnitPos> = cube.units().collect();
        let mut results = vec![vec![MP::EA::zero(); t.tn]; units.len()];
        let mut active = vec![false; units.len()];

        for unit in units.iter() {
            let index = unit.absolute() as usize;
            let geo = GemvUnit::new(&t, *unit);
            let out_col = cube.pos.x as usize * block_n + geo.bn;
            if out_col >= problem.out_size {
                continue;
            }
            let cols = usize::min(t.tn, problem.out_size - out_col);
            let out_block = out_col / mask_block;

            let mut out_scale = MP::EA::one();
            if OutMask::ENABLED {
                match self.masks.out.block::<MP::EA>(mask_batch.out, 0, out_block) {
                    Some(scale) => out_scale = scale,
                    None => {
                        if geo.sg_m == 0 && geo.thr_m == 0 {
                            for col in out_col..out_col + cols {
                                self.out[out_batch + col] = MP::EO::zero();
                            }
                        }
                        continue;
                    }
                }
            }

            let result = &mut results[index];
            let mut bm = geo.bm;
            let steps = n_iter + usize::from(leftover > 0);

            for step in 0..steps {
                let Some(block_scale) =
                    self.masks
                        .operand_scale::<MP::EA>(mask_batch, (step, out_block), step)
                else {
                    bm += block_m;
                    continue;
                };
                let scale = TransformScale::new(block_scale);
                let rows = match step < n_iter {
                    true => t.tm,
                    false => usize::min(t.tm, problem.in_size.saturating_sub(bm)),
                };

                for tm in 0..rows {
                    let mut coeff: MP::EA = self.vec[vec_batch + bm + tm].cast();
                    if OpMask::MULTIPLICATIVE {
                        coeff = scale.apply(coeff);
                    }

                    let row = mat_batch + (bm + tm) * problem.matrix_ld + out_col;
                    for (tn, acc) in result.iter_mut().enumerate().take(cols) {
                        *acc += coeff * self.mat[row + tn].cast::<MP::EA>();
                    }
                }

                bm += block_m;
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
            for tn in 0..t.tn {
                let mut values: Vec<MP::EA> = results[lanes.clone()].iter().map(|r| r[tn]).collect();
                plane_sum_strided(&mut values, t.sm as u32, t.sn as u32);
                for (result, value) in results[lanes.clone()].iter_mut().zip(values) {
                    result[tn] = value;
                }
            }
        }

        if t.bm > 1 {
            let stride = block_n + t.tn;
            let mut tgp = cube.shared_memory::<MP::EA>(t.bm * stride);

            for unit in units.iter() {
                let index = unit.absolute() as usize;
                let geo = GemvUnit::new(&t, *unit);
                if active[index] && geo.thr_m == 0 {
                    for tn in 0..t.tn {
                        tgp.write(geo.sg_m * stride + geo.bn + tn, results[index][tn]);
                    }
                }
            }

            cube.sync_cube();

            for unit in units.iter() {
                let index = unit.absolute() as usize;
                let geo = GemvUnit::new(&t, *unit);
                if active[index] && geo.thr_m == 0 && geo.sg_m == 0 {
                    for sgm in 1..t.bm {
                        for tn in 0..t.tn {
                            results[index][tn] += tgp.read(sgm * stride + geo.bn + tn);
                        }
                    }
                }
            }
        }

        for unit in units.iter() {
            let index = unit.absolute() as usize;
            let geo = GemvUnit::new(&t, *unit);
            if !active[index] || geo.sg_m != 0 || geo.thr_m != 0 {
                continue;
            }

            let out_col = cube.pos.x as usize * block_n + geo.bn;
            let cols = usize::min(t.tn, problem.out_size - out_col);
            for tn in 0..cols {
                self.out[out_batch + out_col + tn] = results[index][tn].cast();
            }
        }
    }
}
