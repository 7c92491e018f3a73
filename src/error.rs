//! Error types for engine configuration and terminal outcomes.
//!
//! Two families live here:
//! - [`BuildError`]: a poller, policy, or config value was rejected before any work ran.
//! - [`AttemptError`]: the `Result`-shaped view of a non-successful
//!   [`AttemptOutcome`](crate::AttemptOutcome), carrying the full failure history.
use crate::backoff::BackoffError;
use crate::outcome::FailureHistory;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while building pollers, policies, or configs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// `max_attempts` must be > 0.
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(usize),
    /// A wait timeout must be non-zero.
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    /// A poll interval must be non-zero.
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
    /// The backoff configuration was rejected.
    #[error("invalid backoff: {0}")]
    Backoff(#[from] BackoffError),
    /// A configuration document could not be decoded.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Terminal, non-successful result of an attempt sequence.
///
/// Produced by [`AttemptOutcome::into_result`](crate::AttemptOutcome::into_result); every
/// variant keeps the history recorded up to the point the sequence stopped.
#[derive(Debug, Error)]
pub enum AttemptError<E> {
    /// Every permitted attempt was consumed, or a failure was not retryable.
    #[error("{}", describe_exhausted(.history))]
    Exhausted { history: FailureHistory<E> },
    /// A readiness predicate raised an unrecognized error.
    #[error("readiness check failed after {} recorded failures", .history.len())]
    Predicate { error: E, history: FailureHistory<E> },
    /// The host cancelled the sequence.
    #[error("attempt sequence cancelled after {} recorded failures", .history.len())]
    Cancelled { history: FailureHistory<E> },
}

fn describe_exhausted<E>(history: &FailureHistory<E>) -> String {
    match history.last() {
        Some(last) => format!(
            "attempts exhausted after {} failures; last: attempt {} ({}) {}",
            history.len(),
            last.attempt,
            last.classification,
            last.failure.kind(),
        ),
        None => "attempts exhausted with no recorded failures".to_string(),
    }
}

impl<E> AttemptError<E> {
    /// Borrow the failure history regardless of variant.
    pub fn history(&self) -> &FailureHistory<E> {
        match self {
            Self::Exhausted { history }
            | Self::Predicate { history, .. }
            | Self::Cancelled { history } => history,
        }
    }

    /// Check if this error is due to attempt exhaustion.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Check if this error is due to cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Formats a duration in whole milliseconds for log fields.
pub(crate) struct Millis(pub Duration);

impl fmt::Display for Millis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::FailureRecord;
    use crate::taxonomy::{Classification, Failure};
    use std::time::{Duration, SystemTime};

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    #[error("{0}")]
    struct DummyError(&'static str);

    fn record(attempt: usize) -> FailureRecord<DummyError> {
        FailureRecord::new(
            Failure::Operation(DummyError("boom")),
            Classification::Transient,
            attempt,
            SystemTime::UNIX_EPOCH,
            Duration::from_millis(attempt as u64),
        )
    }

    #[test]
    fn build_error_display() {
        assert_eq!(
            BuildError::InvalidMaxAttempts(0).to_string(),
            "max_attempts must be > 0 (got 0)"
        );
        assert!(BuildError::ZeroPollInterval.to_string().contains("poll interval"));
    }

    #[test]
    fn backoff_error_converts() {
        let err: BuildError = BackoffError::FactorBelowOne.into();
        assert!(matches!(err, BuildError::Backoff(BackoffError::FactorBelowOne)));
    }

    #[test]
    fn exhausted_display_names_last_failure() {
        let err = AttemptError::Exhausted { history: vec![record(1), record(2)] };
        let msg = err.to_string();
        assert!(msg.contains("2 failures"));
        assert!(msg.contains("attempt 2"));
        assert!(msg.contains("transient"));
    }

    #[test]
    fn exhausted_display_handles_empty_history() {
        let err: AttemptError<DummyError> = AttemptError::Exhausted { history: vec![] };
        assert!(err.to_string().contains("no recorded failures"));
    }

    #[test]
    fn history_accessor_covers_all_variants() {
        let cancelled = AttemptError::Cancelled { history: vec![record(1)] };
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.history().len(), 1);

        let predicate =
            AttemptError::Predicate { error: DummyError("bad selector"), history: vec![] };
        assert!(!predicate.is_exhausted());
        assert!(predicate.history().is_empty());
    }

    #[test]
    fn millis_formats_whole_milliseconds() {
        assert_eq!(Millis(Duration::from_micros(2_500)).to_string(), "2ms");
    }
}
