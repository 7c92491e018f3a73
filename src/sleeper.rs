//! Abstraction for the engine's suspension points.
//!
//! Both the poller's inter-poll wait and the classifier's backoff go through a [`Sleeper`], so
//! tests can record requested delays or skip them entirely.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Abstraction for sleeping/waiting.
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Production sleeper using the tokio timer; yields to other tasks while waiting.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Test sleeper that returns immediately.
///
/// Only suitable for retry backoff. The poller measures its deadline against the tokio clock,
/// so pair it with [`TokioSleeper`] (under paused time in tests) instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

impl Sleeper for InstantSleeper {
    fn sleep(&self, _duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async {})
    }
}

/// Test sleeper that records every requested delay.
///
/// `new()` returns immediately after recording; `sleeping()` also waits on the tokio timer,
/// which makes it usable under the poller with `#[tokio::test(start_paused = true)]`.
#[derive(Debug, Clone, Default)]
pub struct TrackingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
    real: bool,
}

impl TrackingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeping() -> Self {
        Self { real: true, ..Self::default() }
    }

    /// All recorded delays, oldest first.
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn total(&self) -> Duration {
        self.calls().iter().sum()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Sleeper for TrackingSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(duration);
        if self.real {
            Box::pin(tokio::time::sleep(duration))
        } else {
            Box::pin(async {})
        }
    }
}

/// Sleep through `sleeper`, racing `cancel` when present.
///
/// Returns `false` if the token fired before the sleep finished.
pub(crate) async fn sleep_or_cancel(
    sleeper: &dyn Sleeper,
    duration: Duration,
    cancel: Option<&CancellationToken>,
) -> bool {
    let sleep = sleeper.sleep(duration);
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => false,
                _ = sleep => true,
            }
        }
        None => {
            sleep.await;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn instant_sleeper_doesnt_sleep() {
        let start = std::time::Instant::now();
        InstantSleeper.sleep(Duration::from_secs(10)).await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn tracking_sleeper_records_and_clears() {
        let sleeper = TrackingSleeper::new();
        sleeper.sleep(Duration::from_millis(100)).await;
        sleeper.sleep(Duration::from_millis(200)).await;

        assert_eq!(sleeper.calls(), vec![Duration::from_millis(100), Duration::from_millis(200)]);
        assert_eq!(sleeper.total(), Duration::from_millis(300));

        sleeper.clear();
        assert!(sleeper.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sleeping_tracker_advances_the_clock() {
        let sleeper = TrackingSleeper::sleeping();
        let start = Instant::now();
        sleeper.sleep(Duration::from_millis(250)).await;
        assert!(start.elapsed() >= Duration::from_millis(250));
        assert_eq!(sleeper.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_or_cancel_stops_on_token() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let finished = sleep_or_cancel(&TokioSleeper, Duration::from_secs(60), Some(&token)).await;
        assert!(!finished);
        assert!(start.elapsed() < Duration::from_secs(1));

        assert!(sleep_or_cancel(&InstantSleeper, Duration::from_secs(60), None).await);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_sleeper_actually_sleeps() {
        let start = Instant::now();
        TokioSleeper.sleep(Duration::from_millis(50)).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
