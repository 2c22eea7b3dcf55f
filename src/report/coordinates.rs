use crate::defaults;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Shared source of synthetic report coordinates.
///
/// One generator serves every report so draws are never correlated through
/// reseeding.
pub struct CoordinateGenerator {
    rng: Mutex<StdRng>,
}

impl CoordinateGenerator {
    /// Generator seeded from the operating system.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic generator for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Two independent draws from `[COORDINATE_MIN, COORDINATE_MAX)`.
    pub fn next_pair(&self) -> [f64; 2] {
        let mut rng = self.rng.lock();
        let range = defaults::COORDINATE_MIN..defaults::COORDINATE_MAX;
        [rng.random_range(range.clone()), rng.random_range(range)]
    }
}

impl Default for CoordinateGenerator {
    fn default() -> Self {
        Self::new()
    }
}
