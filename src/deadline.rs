//! Absolute expiry bounding a single poll loop.

use crate::error::BuildError;
use std::time::Duration;
use tokio::time::Instant;

/// A fixed point in (tokio) time plus the poll interval used while waiting for it.
///
/// The expiry is computed once at creation and never extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started: Instant,
    expires_at: Instant,
    poll_interval: Duration,
}

impl Deadline {
    /// Start a deadline `timeout` from now.
    pub fn after(timeout: Duration, poll_interval: Duration) -> Result<Self, BuildError> {
        if timeout.is_zero() {
            return Err(BuildError::ZeroTimeout);
        }
        if poll_interval.is_zero() {
            return Err(BuildError::ZeroPollInterval);
        }
        Ok(Self::start(timeout, poll_interval))
    }

    /// Start a deadline from inputs the caller has already validated.
    pub(crate) fn start(timeout: Duration, poll_interval: Duration) -> Self {
        let started = Instant::now();
        // saturate instead of panicking on absurd timeouts
        let expires_at = started.checked_add(timeout).unwrap_or_else(far_future);
        Self { started, expires_at, poll_interval }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before expiry; zero once expired.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// How long to suspend before the next poll: the interval, shortened so the deadline is
    /// never overshot.
    pub fn next_sleep(&self) -> Duration {
        self.poll_interval.min(self.remaining())
    }
}

fn far_future() -> Instant {
    // roughly 30 years, matching tokio's own far-future convention
    Instant::now() + Duration::from_secs(86_400 * 365 * 30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_inputs() {
        assert_eq!(
            Deadline::after(Duration::ZERO, Duration::from_millis(10)),
            Err(BuildError::ZeroTimeout)
        );
        assert_eq!(
            Deadline::after(Duration::from_millis(10), Duration::ZERO),
            Err(BuildError::ZeroPollInterval)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn next_sleep_never_passes_expiry() {
        let deadline =
            Deadline::after(Duration::from_millis(50), Duration::from_millis(200)).unwrap();
        assert_eq!(deadline.next_sleep(), Duration::from_millis(50));

        tokio::time::advance(Duration::from_millis(30)).await;
        assert_eq!(deadline.next_sleep(), Duration::from_millis(20));
        assert!(!deadline.is_expired());

        tokio::time::advance(Duration::from_millis(20)).await;
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert_eq!(deadline.next_sleep(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_used_when_time_remains() {
        let deadline = Deadline::after(Duration::from_secs(1), Duration::from_millis(100)).unwrap();
        assert_eq!(deadline.next_sleep(), Duration::from_millis(100));
        assert_eq!(deadline.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn absurd_timeout_saturates() {
        let deadline = Deadline::after(Duration::MAX, Duration::from_millis(1)).unwrap();
        assert!(!deadline.is_expired());
    }
}
