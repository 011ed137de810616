use core::fmt::Display;
use gemmkit_common::{CubeDim, MAX_UNITS_PER_CUBE, PLANE_DIM};
use serde::{Deserialize, Serialize};

use crate::components::{FormattedConfigError, MatmulAvailabilityError, MatmulSetupError};

/// Thread layout of a GEMV cube.
///
/// A plane is an `sm×sn` grid of lanes and a cube a `bm×bn` grid of planes. Every lane owns
/// `tm` output rows and `tn` consecutive reduction elements (the roles of m and n swap for the
/// transposed kernel, which owns `tn` output columns and reduces `tm` rows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GemvTiling {
    pub bm: usize,
    pub bn: usize,
    pub sm: usize,
    pub sn: usize,
    pub tm: usize,
    pub tn: usize,
}

impl GemvTiling {
    pub fn threads_m(&self) -> usize {
        self.bm * self.sm
    }

    pub fn threads_n(&self) -> usize {
        self.bn * self.sn
    }

    pub fn block_m(&self) -> usize {
        self.threads_m() * self.tm
    }

    pub fn block_n(&self) -> usize {
        self.threads_n() * self.tn
    }

    pub fn num_planes(&self) -> usize {
        self.bm * self.bn
    }

    pub fn cube_dim(&self) -> CubeDim {
        CubeDim::new_planes(self.num_planes() as u32)
    }
}

impl Display for GemvTiling {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "planes {}x{} lanes {}x{} per-lane {}x{}",
            self.bm, self.bn, self.sm, self.sn, self.tm, self.tn
        )
    }
}

/// Validated GEMV configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemvConfig {
    tiling: GemvTiling,
    transposed: bool,
    mask_block: Option<usize>,
}

impl GemvConfig {
    /// Checks the tiling for the kernel it drives.
    ///
    /// `mask_block` is the common block size of the masks, if any. Masked kernels step the
    /// reduction one mask block at a time, and a cube must never straddle two output blocks.
    pub fn new(
        tiling: GemvTiling,
        transposed: bool,
        mask_block: Option<usize>,
    ) -> Result<Self, MatmulSetupError> {
        let t = tiling;

        if [t.bm, t.bn, t.sm, t.sn, t.tm, t.tn].contains(&0) {
            return Err(
                FormattedConfigError::new(move || format!("GEMV tiling {t} has an empty dimension"))
                    .into(),
            );
        }

        if t.sm * t.sn != PLANE_DIM as usize {
            return Err(FormattedConfigError::new(move || {
                format!("GEMV tiling {t}: a plane must have {PLANE_DIM} lanes")
            })
            .into());
        }

        if !transposed && ![8, 16, 32].contains(&t.sn) {
            return Err(FormattedConfigError::new(move || {
                format!("GEMV tiling {t}: sn must be 8, 16 or 32")
            })
            .into());
        }

        if t.num_planes() * PLANE_DIM as usize > MAX_UNITS_PER_CUBE as usize {
            return Err(MatmulAvailabilityError::CubeDimTooBig(t.cube_dim()).into());
        }

        if let Some(block) = mask_block {
            // Reduction block, then output block.
            let (reduction, output) = match transposed {
                false => (t.block_n(), t.block_m()),
                true => (t.block_m(), t.block_n()),
            };

            if reduction != block || block % output != 0 {
                return Err(FormattedConfigError::new(move || {
                    format!(
                        "GEMV tiling {t} can't apply masks of block size {block}: the reduction step must equal it and the output block divide it"
                    )
                })
                .into());
            }
        }

        Ok(Self {
            tiling,
            transposed,
            mask_block,
        })
    }

    /// Picks a tiling from the problem size.
    ///
    /// Wide reductions get more planes along the reduction, long outputs more planes along
    /// the output. Masked problems size the reduction step to the mask block.
    pub fn select(
        transposed: bool,
        in_size: usize,
        out_size: usize,
        mask_block: Option<usize>,
    ) -> Result<Self, MatmulSetupError> {
        let tiling = match (transposed, mask_block) {
            (false, None) => {
                let mut t = GemvTiling {
                    bm: if out_size >= 4096 { 8 } else { 4 },
                    bn: 1,
                    sm: 1,
                    sn: 32,
                    tm: 4,
                    tn: 4,
                };
                if in_size <= 64 {
                    t.bm = 1;
                    t.sm = 4;
                    t.sn = 8;
                } else if in_size >= 16 * out_size {
                    t.bm = 1;
                    t.bn = 8;
                }
                if out_size < t.tm {
                    t.tm = 1;
                }
                t
            }
            (false, Some(block)) => {
                let sn = usize::min(block, PLANE_DIM as usize);
                let sm = PLANE_DIM as usize / sn.max(1);
                let tn = usize::max(block / PLANE_DIM as usize, 1);
                let tm = usize::clamp(block / sm.max(1), 1, 4);
                let bm = match block >= PLANE_DIM as usize {
                    true if out_size >= 4096 => 8,
                    true => 4,
                    false => 1,
                };
                GemvTiling {
                    bm: usize::min(bm, usize::max(block / (sm * tm).max(1), 1)),
                    bn: 1,
                    sm,
                    sn,
                    tm: if out_size < tm { 1 } else { tm },
                    tn,
                }
            }
            (true, None) => GemvTiling {
                bm: 1,
                bn: if out_size >= 2048 { 16 } else { 8 },
                sm: 8,
                sn: 4,
                tm: 4,
                tn: if out_size < 4 { 1 } else { 4 },
            },
            (true, Some(block)) => {
                let mut t = GemvTiling {
                    bm: 1,
                    bn: if block >= 64 && out_size >= 2048 { 4 } else { 2 },
                    sm: 8,
                    sn: 4,
                    tm: block / 8,
                    tn: if out_size < 4 { 1 } else { 4 },
                };
                while t.block_n() > block && (t.bn > 1 || t.tn > 1) {
                    if t.bn > 1 {
                        t.bn /= 2;
                    } else {
                        t.tn /= 2;
                    }
                }
                t
            }
        };

        Self::new(tiling, transposed, mask_block)
    }

    pub fn tiling(&self) -> GemvTiling {
        self.tiling
    }

    /// Whether the matrix is stored `[in, out]`.
    pub fn transposed(&self) -> bool {
        self.transposed
    }

    pub fn mask_block(&self) -> Option<usize> {
        self.mask_block
    }

    pub fn cube_dim(&self) -> CubeDim {
        self.tiling.cube_dim()
    }

    /// Outputs computed by one cube.
    pub fn outputs_per_cube(&self) -> usize {
        match self.transposed {
            false => self.tiling.block_m(),
            true => self.tiling.block_n(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn selection_follows_problem_size() {
        let config = GemvConfig::select(false, 1024, 8192, None).unwrap();
        assert_eq!(config.tiling().bm, 8);
        assert_eq!(config.outputs_per_cube(), 32);

        let config = GemvConfig::select(false, 32, 100, None).unwrap();
        assert_eq!((config.tiling().sm, config.tiling().sn), (4, 8));

        let config = GemvConfig::select(false, 4096, 64, None).unwrap();
        assert_eq!(config.tiling().bn, 8);

        let config = GemvConfig::select(true, 512, 4096, None).unwrap();
        assert_eq!(config.outputs_per_cube(), 256);
    }

    #[test]
    fn masked_selection_matches_block_size() {
        for block in [8, 16, 32, 64, 128] {
            for out in [3, 100, 5000] {
                let config = GemvConfig::select(false, 300, out, Some(block)).unwrap();
                assert_eq!(config.tiling().block_n(), block);

                let config = GemvConfig::select(true, 300, out, Some(block)).unwrap();
                assert_eq!(config.tiling().block_m(), block);
            }
        }
    }

    #[test]
    fn invalid_tilings_are_rejected() {
        let tiling = GemvTiling {
            bm: 1,
            bn: 1,
            sm: 8,
            sn: 4,
            tm: 4,
            tn: 4,
        };

        assert!(GemvConfig::new(tiling, false, None).is_err());
        assert!(GemvConfig::new(tiling, true, None).is_ok());
        assert!(GemvConfig::new(tiling, true, Some(64)).is_err());
        assert!(GemvConfig::select(false, 300, 100, Some(24)).is_err());
    }
}
