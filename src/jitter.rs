//! Jitter applied on top of backoff delays.
//!
//! - `None`: the exact backoff delay. Default, and the right choice when tests assert on delays.
//! - `Full`: uniform in `[0, delay]`.
//! - `Equal`: uniform in `[delay/2, delay]`, keeping a floor.
//!
//! Jitter is stateless so a [`RetryPolicy`](crate::RetryPolicy) can be shared by parallel
//! workers without one sequence influencing another.

use rand::{rng, Rng};
use std::time::Duration;

/// Jitter strategy for randomizing retry delays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Jitter {
    #[default]
    None,
    Full,
    Equal,
}

impl Jitter {
    /// Create a full jitter strategy.
    pub fn full() -> Self {
        Jitter::Full
    }

    /// Create an equal jitter strategy.
    pub fn equal() -> Self {
        Jitter::Equal
    }

    /// Apply jitter to a delay using the thread-local RNG.
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with_rng(delay, &mut rng())
    }

    /// Apply jitter with a caller-supplied RNG.
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        // saturate: RNG bounds are u64 nanos
        let nanos: u64 = delay.as_nanos().try_into().unwrap_or(u64::MAX);
        match self {
            Jitter::None => delay,
            _ if nanos == 0 => Duration::ZERO,
            Jitter::Full => Duration::from_nanos(rng.random_range(0..=nanos)),
            Jitter::Equal => Duration::from_nanos(rng.random_range(nanos / 2..=nanos)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn none_returns_exact_delay() {
        let delay = Duration::from_micros(1_234_567);
        assert_eq!(Jitter::None.apply(delay), delay);
    }

    #[test]
    fn full_stays_within_delay() {
        let delay = Duration::from_secs(1);
        for _ in 0..100 {
            assert!(Jitter::full().apply(delay) <= delay);
        }
    }

    #[test]
    fn equal_keeps_half_floor() {
        let delay = Duration::from_secs(1);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let jittered = Jitter::equal().apply_with_rng(delay, &mut rng);
            assert!(jittered >= Duration::from_millis(500));
            assert!(jittered <= delay);
        }
    }

    #[test]
    fn sub_millisecond_delays_keep_their_floor() {
        let delay = Duration::from_micros(500);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let jittered = Jitter::equal().apply_with_rng(delay, &mut rng);
            assert!(jittered >= Duration::from_micros(250));
            assert!(jittered <= delay);
        }
    }

    #[test]
    fn zero_delay_is_unchanged() {
        assert_eq!(Jitter::full().apply(Duration::ZERO), Duration::ZERO);
        assert_eq!(Jitter::equal().apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn huge_delay_saturates_without_panicking() {
        let mut rng = StdRng::seed_from_u64(999);
        let jittered = Jitter::full().apply_with_rng(Duration::MAX, &mut rng);
        assert!(jittered <= Duration::MAX);
    }
}
