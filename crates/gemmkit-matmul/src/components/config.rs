use core::fmt::Display;
use derive_new::new;
use gemmkit_common::{CubeDim, MAX_UNITS_PER_CUBE, Numeric, PLANE_DIM, SHARED_MEMORY_BYTES};
use serde::{Deserialize, Serialize};

use super::{
    FormattedConfigError, MatmulAvailabilityError, MatmulProblem, MatmulSetupError,
    global::LoaderLayout,
    tile::{FRAGMENT_SIZE, TileDims},
};

/// Shape of the output tile owned by a cube, and how its planes are laid out.
///
/// A cube computes a `bm×bn` output tile, reducing `bk` elements per step. Its planes form a
/// `wm×wn` grid, each plane owning `bm/wm × bn/wn` of the tile as 8×8 fragments.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilingScheme {
    pub bm: usize,
    pub bn: usize,
    pub bk: usize,
    pub wm: usize,
    pub wn: usize,
}

impl TilingScheme {
    /// Fragments per plane along m.
    pub fn tm(&self) -> usize {
        self.bm / (FRAGMENT_SIZE * self.wm)
    }

    /// Fragments per plane along n.
    pub fn tn(&self) -> usize {
        self.bn / (FRAGMENT_SIZE * self.wn)
    }

    pub fn num_planes(&self) -> usize {
        self.wm * self.wn
    }

    pub fn num_units(&self) -> usize {
        self.num_planes() * PLANE_DIM as usize
    }

    pub fn cube_dim(&self) -> CubeDim {
        CubeDim::new_planes(self.num_planes() as u32)
    }

    /// Checks that planes tile the output in whole fragments and that K steps are whole
    /// fragments.
    pub fn validate(&self) -> Result<(), MatmulSetupError> {
        let tiling = *self;

        if [self.bm, self.bn, self.bk, self.wm, self.wn].contains(&0) {
            return Err(FormattedConfigError::new(move || {
                format!("Tiling {tiling} has an empty dimension")
            })
            .into());
        }

        if self.bm % (FRAGMENT_SIZE * self.wm) != 0 {
            return Err(FormattedConfigError::new(move || {
                format!(
                    "Tiling {tiling}: bm must be a multiple of {FRAGMENT_SIZE}·wm = {}",
                    FRAGMENT_SIZE * tiling.wm
                )
            })
            .into());
        }

        if self.bn % (FRAGMENT_SIZE * self.wn) != 0 {
            return Err(FormattedConfigError::new(move || {
                format!(
                    "Tiling {tiling}: bn must be a multiple of {FRAGMENT_SIZE}·wn = {}",
                    FRAGMENT_SIZE * tiling.wn
                )
            })
            .into());
        }

        if self.bk % FRAGMENT_SIZE != 0 {
            return Err(FormattedConfigError::new(move || {
                format!("Tiling {tiling}: bk must be a multiple of {FRAGMENT_SIZE}")
            })
            .into());
        }

        if self.num_units() > MAX_UNITS_PER_CUBE as usize {
            return Err(MatmulAvailabilityError::CubeDimTooBig(self.cube_dim()).into());
        }

        Ok(())
    }
}

impl Display for TilingScheme {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}x{}x{} ({}x{} planes)",
            self.bm, self.bn, self.bk, self.wm, self.wn
        )
    }
}

/// Validated configuration of a tiled GEMM, fixed for a whole launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemmConfig {
    tiling: TilingScheme,
    transpose_a: bool,
    transpose_b: bool,
    mn_aligned: bool,
    k_aligned: bool,
    pad: usize,
}

impl GemmConfig {
    /// Builds the config of a `m×k · k×n` product staged as `E`.
    pub fn new<E: Numeric>(
        tiling: TilingScheme,
        transpose_a: bool,
        transpose_b: bool,
        (m, n, k): (usize, usize, usize),
    ) -> Result<Self, MatmulSetupError> {
        tiling.validate()?;

        let config = Self {
            tiling,
            transpose_a,
            transpose_b,
            mn_aligned: m % tiling.bm == 0 && n % tiling.bn == 0,
            k_aligned: k % tiling.bk == 0,
            pad: usize::max(16 / size_of::<E>(), 1),
        };

        config.a_loader().validate()?;
        config.b_loader().validate()?;

        let required = (config.a_shared_len() + config.b_shared_len()) * size_of::<E>();
        if required > SHARED_MEMORY_BYTES {
            return Err(MatmulAvailabilityError::SharedMemoryTooBig {
                required,
                available: SHARED_MEMORY_BYTES,
            }
            .into());
        }

        Ok(config)
    }

    /// Builds the config of a problem, reading the transpositions from its layouts.
    pub fn from_problem<E: Numeric>(
        tiling: TilingScheme,
        problem: &MatmulProblem,
    ) -> Result<Self, MatmulSetupError> {
        Self::new::<E>(
            tiling,
            problem.lhs_layout.is_transposed(),
            problem.rhs_layout.is_transposed(),
            (problem.m, problem.n, problem.k),
        )
    }

    pub fn tiling(&self) -> TilingScheme {
        self.tiling
    }

    pub fn transpose_a(&self) -> bool {
        self.transpose_a
    }

    pub fn transpose_b(&self) -> bool {
        self.transpose_b
    }

    /// Whether every output tile is full.
    pub fn mn_aligned(&self) -> bool {
        self.mn_aligned
    }

    /// Whether K is a whole number of K steps.
    pub fn k_aligned(&self) -> bool {
        self.k_aligned
    }

    pub fn cube_dim(&self) -> CubeDim {
        self.tiling.cube_dim()
    }

    /// Leading dimension of the staged A tile.
    pub fn lda_tgp(&self) -> usize {
        match self.transpose_a {
            true => self.tiling.bm + self.pad,
            false => self.tiling.bk + self.pad,
        }
    }

    /// Leading dimension of the staged B tile.
    pub fn ldb_tgp(&self) -> usize {
        match self.transpose_b {
            true => self.tiling.bk + self.pad,
            false => self.tiling.bn + self.pad,
        }
    }

    pub fn a_shared_len(&self) -> usize {
        match self.transpose_a {
            true => self.tiling.bk * self.lda_tgp(),
            false => self.tiling.bm * self.lda_tgp(),
        }
    }

    pub fn b_shared_len(&self) -> usize {
        match self.transpose_b {
            true => self.tiling.bn * self.ldb_tgp(),
            false => self.tiling.bk * self.ldb_tgp(),
        }
    }

    /// Valid extent of an A tile covering `m` rows of the output and `k` steps of the
    /// reduction.
    pub fn a_tile_dims(&self, m: usize, k: usize) -> TileDims {
        match self.transpose_a {
            true => TileDims::new(k, m),
            false => TileDims::new(m, k),
        }
    }

    /// Valid extent of a B tile covering `n` columns of the output and `k` steps of the
    /// reduction.
    pub fn b_tile_dims(&self, n: usize, k: usize) -> TileDims {
        match self.transpose_b {
            true => TileDims::new(n, k),
            false => TileDims::new(k, n),
        }
    }

    /// How units split the A tile between them.
    pub fn a_loader(&self) -> LoaderLayout {
        let t = self.tiling;
        match self.transpose_a {
            true => LoaderLayout::new(t.bk, t.bm, self.lda_tgp(), false, t.num_units()),
            false => LoaderLayout::new(t.bm, t.bk, self.lda_tgp(), true, t.num_units()),
        }
    }

    /// How units split the B tile between them.
    pub fn b_loader(&self) -> LoaderLayout {
        let t = self.tiling;
        match self.transpose_b {
            true => LoaderLayout::new(t.bn, t.bk, self.ldb_tgp(), true, t.num_units()),
            false => LoaderLayout::new(t.bk, t.bn, self.ldb_tgp(), false, t.num_units()),
        }
    }
}
