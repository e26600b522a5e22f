//! Injectable randomness for speaker selection, chaining and delays.

use rand::{Rng, SeedableRng, rngs::StdRng};
use std::time::Duration;

/// The random decisions the scheduler needs.
///
/// Production sessions use [`StdRandom`]; tests inject a seeded or scripted
/// source so scheduling is deterministic.
pub trait RandomSource: Send {
    /// Bernoulli trial that succeeds with probability `p`.
    fn chance(&mut self, p: f64) -> bool;
    /// Uniform index in `0..len`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;
    /// Uniform duration in `[min, max)`. Returns `min` when the range is empty.
    fn delay(&mut self, min: Duration, max: Duration) -> Duration;
}

/// A [`RandomSource`] backed by `rand`'s standard generator.
pub struct StdRandom {
    rng: StdRng,
}

impl StdRandom {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for StdRandom {
    fn chance(&mut self, p: f64) -> bool {
        self.rng.random_bool(p.clamp(0.0, 1.0))
    }

    fn pick(&mut self, len: usize) -> usize {
        self.rng.random_range(0..len)
    }

    fn delay(&mut self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let millis = self
            .rng
            .random_range(min.as_millis() as u64..max.as_millis() as u64);
        Duration::from_millis(millis)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_stays_in_half_open_range() {
        let mut rng = StdRandom::seeded(7);
        let min = Duration::from_millis(1000);
        let max = Duration::from_millis(2500);
        for _ in 0..1000 {
            let d = rng.delay(min, max);
            assert!(d >= min && d < max, "{:?} out of range", d);
        }
        assert_eq!(rng.delay(max, min), max);
    }

    #[test]
    fn test_pick_is_in_bounds() {
        let mut rng = StdRandom::seeded(11);
        for _ in 0..1000 {
            assert!(rng.pick(3) < 3);
        }
    }

    #[test]
    fn test_seeded_sources_are_reproducible() {
        let mut a = StdRandom::seeded(42);
        let mut b = StdRandom::seeded(42);
        for _ in 0..50 {
            assert_eq!(a.chance(0.45), b.chance(0.45));
            assert_eq!(a.pick(5), b.pick(5));
        }
    }
}
