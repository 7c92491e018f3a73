//! Wall-clock source used to timestamp failure records.
//!
//! Deadlines and elapsed times use the tokio monotonic clock; this trait only supplies the
//! human-facing `SystemTime` stored on each [`FailureRecord`](crate::FailureRecord).

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

/// Clock abstraction so timestamps can be faked in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> SystemTime;
}

/// Clock backed by `SystemTime::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Deterministic clock: starts at a fixed instant and moves forward by `step` on every read.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<SystemTime>>,
    step: Duration,
}

impl ManualClock {
    pub fn new(start: SystemTime, step: Duration) -> Self {
        Self { current: Arc::new(Mutex::new(start)), step }
    }

    /// Move the clock forward without reading it.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        let mut guard = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let read = *guard;
        *guard += self.step;
        read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_steps_on_each_read() {
        let clock = ManualClock::new(SystemTime::UNIX_EPOCH, Duration::from_secs(1));
        let first = clock.now();
        let second = clock.now();
        assert_eq!(second.duration_since(first).unwrap(), Duration::from_secs(1));

        clock.advance(Duration::from_secs(10));
        let third = clock.now();
        assert_eq!(third.duration_since(second).unwrap(), Duration::from_secs(11));
    }

    #[test]
    fn system_clock_is_after_epoch() {
        assert!(SystemClock.now() > SystemTime::UNIX_EPOCH);
    }
}
