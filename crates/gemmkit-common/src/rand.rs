pub use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};

/// Returns a random number generator seeded with `seed`, reproducible across runs.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

