//! Condition polling against a fixed deadline.
//!
//! Semantics:
//! - The predicate is evaluated immediately; a ready result returns without any delay.
//! - Between evaluations the poller suspends for the poll interval, shortened so it never sleeps
//!   past the deadline. The predicate gets one final evaluation at the deadline.
//! - Errors accepted by the `ignoring` filter are "not ready yet" signals (think element not
//!   found) and polling continues. Any other error ends the wait at once with `Errored`.
//! - A cancellation token, when configured, is checked before every evaluation and raced
//!   against every sleep.
//!
//! Invariants:
//! - Total wait never exceeds `timeout` by more than one predicate evaluation.
//! - The poller has no mutable state; `wait_for` can run concurrently from many tasks.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use flakeguard::{ConditionPoller, ConditionResult, Probe};
//!
//! #[derive(Debug)]
//! enum Lookup { NotFound, Broken }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let poller = ConditionPoller::<Lookup>::builder()
//!     .timeout(Duration::from_secs(2))
//!     .poll_interval(Duration::from_millis(10))
//!     .ignoring(|e| matches!(e, Lookup::NotFound))
//!     .build()
//!     .unwrap();
//!
//! let result = poller
//!     .wait_for(|| async { Ok::<_, Lookup>(Probe::<_, ()>::Ready("visible")) })
//!     .await;
//! assert!(matches!(result, ConditionResult::Satisfied("visible")));
//! # });
//! ```

use crate::deadline::Deadline;
use crate::error::{BuildError, Millis};
use crate::sleeper::{sleep_or_cancel, Sleeper, TokioSleeper};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default upper bound for a wait.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default pause between evaluations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Result of one successful predicate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe<T, S = ()> {
    /// The condition holds; carries the payload handed back to the caller.
    Ready(T),
    /// The condition does not hold yet; carries what was observed, for diagnostics.
    Pending(S),
}

impl Probe<(), ()> {
    /// `true` maps to `Ready(())`, `false` to `Pending(())`.
    pub fn from_bool(ready: bool) -> Self {
        if ready {
            Probe::Ready(())
        } else {
            Probe::Pending(())
        }
    }
}

impl<T> From<Option<T>> for Probe<T, ()> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Probe::Ready(v),
            None => Probe::Pending(()),
        }
    }
}

/// The last non-satisfying observation of a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<S, E> {
    /// The predicate reported a pending state.
    Pending(S),
    /// The predicate raised an error that the poller was told to ignore.
    Ignored(E),
}

impl<S, E> Observation<S, E> {
    pub fn into_ignored(self) -> Option<E> {
        match self {
            Observation::Ignored(e) => Some(e),
            Observation::Pending(_) => None,
        }
    }
}

/// Outcome of [`ConditionPoller::wait_for`]. Exactly one variant is produced per wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionResult<T, S, E> {
    Satisfied(T),
    TimedOut { last_observed: Observation<S, E>, elapsed: Duration, polls: usize },
    Errored(E),
    Cancelled { polls: usize },
}

impl<T, S, E> ConditionResult<T, S, E> {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The satisfied payload, if any.
    pub fn satisfied(self) -> Option<T> {
        match self {
            Self::Satisfied(v) => Some(v),
            _ => None,
        }
    }
}

/// Waits for a predicate to hold, bounded by a deadline. Cheap to clone and safe to share.
pub struct ConditionPoller<E> {
    timeout: Duration,
    poll_interval: Duration,
    ignoring: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
    cancel: Option<CancellationToken>,
}

impl<E> Clone for ConditionPoller<E> {
    fn clone(&self) -> Self {
        Self {
            timeout: self.timeout,
            poll_interval: self.poll_interval,
            ignoring: self.ignoring.clone(),
            sleeper: self.sleeper.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<E> fmt::Debug for ConditionPoller<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionPoller")
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("sleeper", &self.sleeper)
            .field("ignoring", &"<predicate>")
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl<E> ConditionPoller<E> {
    /// Construct a new builder with defaults.
    pub fn builder() -> ConditionPollerBuilder<E> {
        ConditionPollerBuilder::new()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Evaluate `predicate` until it is ready, it fails with an unrecognized error, the deadline
    /// passes, or the wait is cancelled.
    pub async fn wait_for<T, S, F, Fut>(&self, predicate: F) -> ConditionResult<T, S, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Probe<T, S>, E>>,
    {
        self.wait_with(predicate, None).await
    }

    /// Same as `wait_for`, additionally observing an outer cancellation token.
    pub(crate) async fn wait_with<T, S, F, Fut>(
        &self,
        mut predicate: F,
        outer: Option<&CancellationToken>,
    ) -> ConditionResult<T, S, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Probe<T, S>, E>>,
    {
        let deadline = Deadline::start(self.timeout, self.poll_interval);
        let cancel = self.cancel.as_ref().or(outer);
        let mut polls = 0usize;

        loop {
            if is_cancelled(self.cancel.as_ref(), outer) {
                tracing::debug!(polls, "condition wait cancelled");
                return ConditionResult::Cancelled { polls };
            }

            polls += 1;
            let observed = match predicate().await {
                Ok(Probe::Ready(value)) => {
                    let elapsed = deadline.elapsed();
                    tracing::trace!(polls, elapsed = %Millis(elapsed), "condition satisfied");
                    return ConditionResult::Satisfied(value);
                }
                Ok(Probe::Pending(state)) => Observation::Pending(state),
                Err(e) if (self.ignoring)(&e) => Observation::Ignored(e),
                Err(e) => {
                    tracing::debug!(polls, "condition predicate raised an unrecognized error");
                    return ConditionResult::Errored(e);
                }
            };

            if deadline.is_expired() {
                let elapsed = deadline.elapsed();
                tracing::debug!(
                    polls,
                    elapsed = %Millis(elapsed),
                    timeout = %Millis(self.timeout),
                    "condition wait timed out"
                );
                return ConditionResult::TimedOut { last_observed: observed, elapsed, polls };
            }

            let pause = deadline.next_sleep();
            tracing::trace!(polls, pause = %Millis(pause), "condition not ready");
            // the other token, if both exist, is picked up at the top of the loop
            let cancelled_early = match (self.cancel.as_ref(), outer) {
                (Some(a), Some(b)) => {
                    tokio::select! {
                        biased;
                        _ = b.cancelled() => true,
                        resumed = sleep_or_cancel(self.sleeper.as_ref(), pause, Some(a)) => {
                            !resumed
                        }
                    }
                }
                _ => !sleep_or_cancel(self.sleeper.as_ref(), pause, cancel).await,
            };
            if cancelled_early {
                tracing::debug!(polls, "condition wait cancelled");
                return ConditionResult::Cancelled { polls };
            }
        }
    }
}

fn is_cancelled(own: Option<&CancellationToken>, outer: Option<&CancellationToken>) -> bool {
    own.is_some_and(CancellationToken::is_cancelled)
        || outer.is_some_and(CancellationToken::is_cancelled)
}

/// Builder for [`ConditionPoller`].
pub struct ConditionPollerBuilder<E> {
    timeout: Duration,
    poll_interval: Duration,
    ignoring: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
    cancel: Option<CancellationToken>,
}

impl<E> ConditionPollerBuilder<E> {
    /// Defaults: 30s timeout, 500ms poll interval, no ignored errors, tokio sleeper.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            ignoring: Arc::new(|_| false),
            sleeper: Arc::new(TokioSleeper),
            cancel: None,
        }
    }

    /// Hard ceiling on the wait. Must be > 0.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pause between evaluations. Must be > 0; may exceed the timeout.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Errors for which `filter` returns true are treated as "not ready yet".
    pub fn ignoring<F>(mut self, filter: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.ignoring = Arc::new(filter);
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Stop waiting promptly once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the poller, validating inputs.
    pub fn build(self) -> Result<ConditionPoller<E>, BuildError> {
        if self.timeout.is_zero() {
            return Err(BuildError::ZeroTimeout);
        }
        if self.poll_interval.is_zero() {
            return Err(BuildError::ZeroPollInterval);
        }
        Ok(ConditionPoller {
            timeout: self.timeout,
            poll_interval: self.poll_interval,
            ignoring: self.ignoring,
            sleeper: self.sleeper,
            cancel: self.cancel,
        })
    }
}

impl<E> Default for ConditionPollerBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot wait with the default sleeper and no ignored errors.
pub async fn wait_for<T, S, E, F, Fut>(
    predicate: F,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<ConditionResult<T, S, E>, BuildError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T, S>, E>>,
{
    let poller = ConditionPoller::builder().timeout(timeout).poll_interval(poll_interval).build()?;
    Ok(poller.wait_for(predicate).await)
}
