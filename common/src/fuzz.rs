//! Seeded random source for fuzzing and synthetic traffic
//!
//! Every consumer owns its generator; there is no process-wide state, so two
//! generators built with the same seed produce the same sequence.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Seed used when none is given
pub const DEFAULT_FUZZ_SEED: u64 = 42;

/// Explicitly seeded random generator
#[derive(Debug, Clone)]
pub struct FuzzRandom {
    seed: u64,
    rng: StdRng,
}

impl Default for FuzzRandom {
    fn default() -> Self {
        Self::new(DEFAULT_FUZZ_SEED)
    }
}

impl FuzzRandom {
    /// Create a generator with the given seed
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Restart the sequence from a new seed
    pub fn set_seed(&mut self, seed: u64) {
        debug!("Reseeding fuzz generator with {}", seed);
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Current seed
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Non-negative random integer
    pub fn get(&mut self) -> i32 {
        self.rng.gen_range(0..=i32::MAX)
    }

    /// Random byte
    pub fn byte(&mut self) -> u8 {
        self.rng.gen()
    }

    /// Random integer in `[min, max]`
    pub fn get_between(&mut self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    /// Random discriminant in `[0, nof_types)`
    pub fn enum_type(&mut self, nof_types: usize) -> usize {
        if nof_types == 0 {
            return 0;
        }
        self.rng.gen_range(0..nof_types)
    }

    /// Fair coin flip
    pub fn boolean(&mut self) -> bool {
        self.get_between(0, 1) == 0
    }
}
