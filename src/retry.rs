//! Classifying retry engine.
//!
//! Semantics:
//! - `max_attempts` counts total executions (initial try + retries).
//! - Every failure is classified exactly once by the caller's [`FailureTaxonomy`] and recorded
//!   in the history before the retry decision is made.
//! - A failure is retried only if its classification is in the policy's retryable set, it is not
//!   `Deterministic`, and attempts remain. `Deterministic` is never retried, whatever the set says.
//! - A precondition that never becomes ready is recorded as `Failure::PreconditionTimedOut`; the
//!   operation is not invoked for that execution. A readiness predicate that raises an
//!   unrecognized error ends the sequence with `Errored`.
//! - Success after one or more failures emits a [`FlakinessSignal`] to the sink, carrying the
//!   whole history.
//!
//! Invariants:
//! - The operation runs at most `max_attempts` times, strictly sequentially.
//! - History entries are in increasing attempt order and are never dropped.
//! - Neither the policy nor the classifier changes during `execute`; both can be shared across
//!   concurrent sequences.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use flakeguard::telemetry::MemorySink;
//! use flakeguard::{
//!     Attempt, AttemptOutcome, Backoff, Classification, InstantSleeper, OperationTaxonomy,
//!     RetryClassifier, RetryPolicy,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .backoff(Backoff::exponential(Duration::from_millis(50)))
//!     .with_sleeper(InstantSleeper)
//!     .build()
//!     .unwrap();
//! let sink = MemorySink::new();
//! let engine = RetryClassifier::new(sink.clone());
//! let taxonomy = OperationTaxonomy::new(|_: &String| Classification::Transient);
//!
//! let mut failures_left = 1;
//! let attempt = Attempt::with_id("login", move || {
//!     let fail = failures_left > 0;
//!     failures_left -= 1;
//!     async move { if fail { Err("socket closed".to_string()) } else { Ok("welcome") } }
//! });
//!
//! let outcome = engine.execute(attempt, &policy, &taxonomy).await;
//! assert!(matches!(outcome, AttemptOutcome::Success { attempts_used: 2, .. }));
//! assert_eq!(sink.flakiness_signals().len(), 1);
//! # });
//! ```

use crate::attempt::Attempt;
use crate::clock::{Clock, SystemClock};
use crate::error::{BuildError, Millis};
use crate::outcome::{AttemptOutcome, FailureHistory, FailureRecord, FlakinessSignal};
use crate::poller::{ConditionResult, Observation};
use crate::sleeper::{sleep_or_cancel, Sleeper, TokioSleeper};
use crate::taxonomy::{Classification, ClassificationSet, Failure, FailureTaxonomy};
use crate::telemetry::{emit, LogSink, RetryEvent, TelemetrySink};
use crate::{Backoff, Jitter};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Immutable retry rules: attempt budget, backoff, jitter, and retryable classifications.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    retryable: ClassificationSet,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryPolicy {
    /// Construct a new builder with defaults.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn jitter(&self) -> Jitter {
        self.jitter
    }

    pub fn retryable(&self) -> ClassificationSet {
        self.retryable
    }

    /// Whether a failure with `classification` may be retried, attempts permitting.
    pub fn permits(&self, classification: Classification) -> bool {
        classification != Classification::Deterministic && self.retryable.contains(classification)
    }

    /// Jittered delay before the execution following `attempt` (1-based).
    pub fn delay_after(&self, attempt: usize) -> Duration {
        self.jitter.apply(self.backoff.delay(attempt))
    }
}

/// Builder for [`RetryPolicy`].
pub struct RetryPolicyBuilder {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    retryable: ClassificationSet,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryPolicyBuilder {
    /// Defaults: 3 attempts, exponential backoff from 100ms, no jitter, retry `Transient` only.
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
            jitter: Jitter::None,
            retryable: ClassificationSet::transient_only(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Set total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set backoff strategy.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set jitter strategy.
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Add one classification to the retryable set.
    pub fn retry_on(mut self, classification: Classification) -> Self {
        self.retryable = self.retryable.with(classification);
        self
    }

    /// Replace the retryable set.
    pub fn retryable(mut self, retryable: ClassificationSet) -> Self {
        self.retryable = retryable;
        self
    }

    /// Provide a custom sleeper for backoff delays.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Build the retry policy, validating inputs.
    pub fn build(self) -> Result<RetryPolicy, BuildError> {
        if self.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        if self.retryable.contains(Classification::Deterministic) {
            tracing::warn!(
                "deterministic failures are never retried; ignoring it in the retryable set"
            );
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            jitter: self.jitter,
            retryable: self.retryable,
            sleeper: self.sleeper,
        })
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs attempts under a [`RetryPolicy`], classifying every failure and reporting flakiness.
///
/// Holds only the telemetry sink, the wall clock used for failure timestamps, and an optional
/// cancellation token. Nothing here changes while a sequence runs.
#[derive(Clone, Debug)]
pub struct RetryClassifier<K> {
    sink: K,
    clock: Arc<dyn Clock>,
    cancel: Option<CancellationToken>,
}

impl Default for RetryClassifier<LogSink> {
    fn default() -> Self {
        Self::new(LogSink)
    }
}

impl<K> RetryClassifier<K> {
    pub fn new(sink: K) -> Self {
        Self { sink, clock: Arc::new(SystemClock), cancel: None }
    }

    /// Timestamp failure records with `clock` instead of the system clock.
    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Stop at the next poll or retry boundary once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Run `attempt` until it succeeds, a failure is not retryable, attempts run out, a readiness
    /// predicate errors, or the sequence is cancelled.
    pub async fn execute<T, E, X>(
        &self,
        mut attempt: Attempt<T, E>,
        policy: &RetryPolicy,
        taxonomy: &X,
    ) -> AttemptOutcome<T, E>
    where
        T: Send + 'static,
        E: Send + 'static,
        X: FailureTaxonomy<E> + ?Sized,
        K: TelemetrySink<E>,
        K::Future: Send + 'static,
    {
        let started = Instant::now();
        let id = attempt.id().clone();
        let cancel = self.cancel.as_ref();
        let mut history: FailureHistory<E> = Vec::new();

        for number in 1..=policy.max_attempts {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                tracing::debug!(attempt_id = %id, attempt = number, "attempt sequence cancelled");
                return AttemptOutcome::Cancelled { history };
            }

            let failure = match run_once(&mut attempt, cancel).await {
                Step::Succeeded(value) => {
                    if number > 1 {
                        let signal = FlakinessSignal {
                            attempt_id: id.clone(),
                            attempts_used: number,
                            history,
                            elapsed: started.elapsed(),
                        };
                        emit(&self.sink, RetryEvent::Flaky(signal)).await;
                    }
                    return AttemptOutcome::Success { value, attempts_used: number };
                }
                Step::Failed(failure) => failure,
                Step::Errored(error) => {
                    tracing::debug!(
                        attempt_id = %id,
                        attempt = number,
                        "readiness predicate errored"
                    );
                    return AttemptOutcome::Errored { error, history };
                }
                Step::Cancelled => return AttemptOutcome::Cancelled { history },
            };

            let classification = taxonomy.classify(&failure);
            tracing::debug!(
                attempt_id = %id,
                attempt = number,
                kind = failure.kind(),
                %classification,
                "attempt failed"
            );
            history.push(FailureRecord::new(
                failure,
                classification,
                number,
                self.clock.now(),
                started.elapsed(),
            ));

            if !policy.permits(classification) || number >= policy.max_attempts {
                let elapsed = started.elapsed();
                emit(
                    &self.sink,
                    RetryEvent::Exhausted {
                        attempt_id: id.clone(),
                        attempts: number,
                        classification,
                        elapsed,
                    },
                )
                .await;
                return AttemptOutcome::Exhausted { history };
            }

            let delay = policy.delay_after(number);
            tracing::trace!(
                attempt_id = %id,
                attempt = number,
                delay = %Millis(delay),
                "retry scheduled"
            );
            let scheduled = RetryEvent::Scheduled {
                attempt_id: id.clone(),
                attempt: number,
                classification,
                delay,
            };
            emit(&self.sink, scheduled).await;
            if !sleep_or_cancel(policy.sleeper.as_ref(), delay, cancel).await {
                tracing::debug!(attempt_id = %id, attempt = number, "cancelled during backoff");
                return AttemptOutcome::Cancelled { history };
            }
        }

        // the final iteration always returns; max_attempts >= 1
        AttemptOutcome::Exhausted { history }
    }
}

/// Result of one execution: precondition, operation, stabilization.
enum Step<T, E> {
    Succeeded(T),
    Failed(Failure<E>),
    Errored(E),
    Cancelled,
}

#[derive(Clone, Copy)]
enum Stage {
    Precondition,
    Stabilization,
}

async fn run_once<T, E>(
    attempt: &mut Attempt<T, E>,
    cancel: Option<&CancellationToken>,
) -> Step<T, E>
where
    E: Send + 'static,
{
    if let Some(condition) = attempt.precondition.as_mut() {
        if let Some(stop) = gate(condition.wait(cancel).await, Stage::Precondition) {
            return stop;
        }
    }

    let value = match (attempt.operation)().await {
        Ok(value) => value,
        Err(e) => return Step::Failed(Failure::Operation(e)),
    };

    if let Some(condition) = attempt.stabilization.as_mut() {
        if let Some(stop) = gate(condition.wait(cancel).await, Stage::Stabilization) {
            return stop;
        }
    }
    Step::Succeeded(value)
}

/// `None` when the condition was satisfied; otherwise the step that ends this execution.
fn gate<T, E>(result: ConditionResult<(), (), E>, stage: Stage) -> Option<Step<T, E>> {
    match result {
        ConditionResult::Satisfied(()) => None,
        ConditionResult::TimedOut { last_observed, elapsed, polls } => {
            let last_error = match last_observed {
                Observation::Ignored(e) => Some(e),
                Observation::Pending(()) => None,
            };
            let failure = match stage {
                Stage::Precondition => {
                    Failure::PreconditionTimedOut { elapsed, polls, last_error }
                }
                Stage::Stabilization => {
                    Failure::StabilizationTimedOut { elapsed, polls, last_error }
                }
            };
            Some(Step::Failed(failure))
        }
        ConditionResult::Errored(e) => Some(Step::Errored(e)),
        ConditionResult::Cancelled { .. } => Some(Step::Cancelled),
    }
}
