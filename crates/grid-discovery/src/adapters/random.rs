//! Random Source Adapters

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ports::RandomSource;

/// Production random source backed by a `StdRng`.
///
/// Seed it with [`from_seed`](Self::from_seed) to replay a run.
#[derive(Debug)]
pub struct ThreadRandomSource {
    rng: Mutex<StdRng>,
}

impl ThreadRandomSource {
    /// Seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sequence for a given seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for ThreadRandomSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for ThreadRandomSource {
    fn random_usize(&self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        self.rng.lock().gen_range(0..max)
    }

    fn random_f64(&self) -> f64 {
        self.rng.lock().gen::<f64>()
    }
}

/// Fixed random source for deterministic testing.
///
/// Always returns the same values, so "random" picks are the element at
/// `value % len` and jitter is a fixed fraction of the interval.
///
/// # Example
///
/// ```rust
/// use grid_discovery::adapters::FixedRandomSource;
/// use grid_discovery::ports::RandomSource;
///
/// let rng = FixedRandomSource::new(42);
/// assert_eq!(rng.random_usize(100), 42);
/// assert_eq!(rng.random_usize(10), 2);
/// ```
#[derive(Debug, Clone)]
pub struct FixedRandomSource {
    value: usize,
    fraction: f64,
}

impl FixedRandomSource {
    /// Always `value % max`, and no jitter.
    pub fn new(value: usize) -> Self {
        Self {
            value,
            fraction: 0.0,
        }
    }

    /// Always picks the first element.
    pub fn first() -> Self {
        Self::new(0)
    }

    /// Override the value returned by `random_f64` (clamped to `[0, 1)`).
    pub fn with_fraction(mut self, fraction: f64) -> Self {
        self.fraction = fraction.clamp(0.0, 1.0 - f64::EPSILON);
        self
    }
}

impl RandomSource for FixedRandomSource {
    fn random_usize(&self, max: usize) -> usize {
        if max == 0 {
            0
        } else {
            self.value % max
        }
    }

    fn random_f64(&self) -> f64 {
        self.fraction
    }
}
