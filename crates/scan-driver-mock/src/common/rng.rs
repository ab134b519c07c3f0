//! Seeded RNG wrapper for reproducible behavior.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Thread-safe, optionally seeded random number generator
pub struct MockRng {
    inner: Mutex<ChaCha8Rng>,
}

impl MockRng {
    /// Create a new RNG. `None` seeds from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            inner: Mutex::new(rng),
        }
    }

    /// Decide whether an operation fails at probability `rate`.
    pub fn should_fail(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        self.inner.lock().r#gen::<f64>() < rate
    }

    /// Uniform value in [0.0, 1.0)
    pub fn next_f64(&self) -> f64 {
        self.inner.lock().r#gen()
    }
}

impl Default for MockRng {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for MockRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRng").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_rng_deterministic() {
        let a = MockRng::new(Some(42));
        let b = MockRng::new(Some(42));
        for _ in 0..10 {
            assert_eq!(a.next_f64(), b.next_f64());
        }
    }

    #[test]
    fn test_should_fail_bounds() {
        let rng = MockRng::new(Some(7));
        assert!((0..100).all(|_| !rng.should_fail(0.0)));
        assert!((0..100).all(|_| rng.should_fail(1.0)));
    }

    #[test]
    fn test_next_f64_range() {
        let rng = MockRng::new(Some(1));
        for _ in 0..100 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }
}
