//! Failure records, terminal outcomes, and flakiness signals.

use crate::attempt::AttemptId;
use crate::error::AttemptError;
use crate::taxonomy::{Classification, Failure};
use std::time::{Duration, SystemTime};

/// Ordered failures of one sequence; insertion order is chronological and nothing is dropped.
pub type FailureHistory<E> = Vec<FailureRecord<E>>;

/// One classified failure. Immutable once created: the classification assigned at capture time
/// is never revisited.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord<E> {
    pub failure: Failure<E>,
    pub classification: Classification,
    /// 1-based execution number the failure belongs to.
    pub attempt: usize,
    /// Wall-clock capture time.
    pub at: SystemTime,
    /// Monotonic time since the sequence started.
    pub elapsed: Duration,
}

impl<E> FailureRecord<E> {
    pub fn new(
        failure: Failure<E>,
        classification: Classification,
        attempt: usize,
        at: SystemTime,
        elapsed: Duration,
    ) -> Self {
        Self { failure, classification, attempt, at, elapsed }
    }
}

/// Emitted when a sequence succeeded only after at least one failed execution.
///
/// Purely observational: the engine hands it to the telemetry sink and keeps nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct FlakinessSignal<E> {
    pub attempt_id: AttemptId,
    pub attempts_used: usize,
    /// Every failure that preceded the success, oldest first.
    pub history: FailureHistory<E>,
    pub elapsed: Duration,
}

/// Terminal result of running an [`Attempt`](crate::Attempt) under a
/// [`RetryPolicy`](crate::RetryPolicy).
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome<T, E> {
    /// The operation succeeded on execution `attempts_used`.
    Success { value: T, attempts_used: usize },
    /// No further execution was permitted: attempts ran out or a failure was not retryable.
    Exhausted { history: FailureHistory<E> },
    /// A precondition or stabilization predicate raised an unrecognized error.
    Errored { error: E, history: FailureHistory<E> },
    /// The host cancelled the sequence at a poll or retry boundary.
    Cancelled { history: FailureHistory<E> },
}

impl<T, E> AttemptOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Executions that failed; 0 on first-try success.
    pub fn failures(&self) -> &[FailureRecord<E>] {
        match self {
            Self::Success { .. } => &[],
            Self::Exhausted { history }
            | Self::Errored { history, .. }
            | Self::Cancelled { history } => history,
        }
    }

    /// Convert into a `Result`, keeping the history on the error side.
    pub fn into_result(self) -> Result<T, AttemptError<E>> {
        match self {
            Self::Success { value, .. } => Ok(value),
            Self::Exhausted { history } => Err(AttemptError::Exhausted { history }),
            Self::Errored { error, history } => Err(AttemptError::Predicate { error, history }),
            Self::Cancelled { history } => Err(AttemptError::Cancelled { history }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(attempt: usize) -> FailureRecord<&'static str> {
        FailureRecord::new(
            Failure::Operation("timeout"),
            Classification::Transient,
            attempt,
            SystemTime::UNIX_EPOCH,
            Duration::ZERO,
        )
    }

    #[test]
    fn success_has_no_failures() {
        let outcome: AttemptOutcome<u8, &str> =
            AttemptOutcome::Success { value: 1, attempts_used: 1 };
        assert!(outcome.is_success());
        assert!(outcome.failures().is_empty());
        assert_eq!(outcome.into_result().ok(), Some(1));
    }

    #[test]
    fn into_result_keeps_history() {
        let outcome: AttemptOutcome<u8, &str> =
            AttemptOutcome::Exhausted { history: vec![record(1), record(2)] };
        assert!(outcome.is_exhausted());
        assert_eq!(outcome.failures().len(), 2);

        let err = outcome.into_result().unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.history()[1].attempt, 2);
    }

    #[test]
    fn errored_maps_to_predicate_error() {
        let outcome: AttemptOutcome<u8, &str> =
            AttemptOutcome::Errored { error: "bad locator", history: vec![record(1)] };
        match outcome.into_result() {
            Err(AttemptError::Predicate { error, history }) => {
                assert_eq!(error, "bad locator");
                assert_eq!(history.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
