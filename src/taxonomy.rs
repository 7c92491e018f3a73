//! Failure capture and classification.
//!
//! A [`FailureTaxonomy`] maps each captured [`Failure`] to a [`Classification`]. Only the
//! caller knows which of its errors are transient (a dropped connection, a stale element) and
//! which are deterministic (an assertion mismatch, a validation error), so the taxonomy is
//! always supplied from outside the engine.
//!
//! ```rust
//! use flakeguard::{Classification, Failure, FailureTaxonomy, OperationTaxonomy};
//!
//! #[derive(Debug)]
//! enum StepError { Connection, Assertion }
//!
//! let taxonomy = OperationTaxonomy::new(|e: &StepError| match e {
//!     StepError::Connection => Classification::Transient,
//!     StepError::Assertion => Classification::Deterministic,
//! });
//! assert_eq!(
//!     taxonomy.classify(&Failure::Operation(StepError::Assertion)),
//!     Classification::Deterministic,
//! );
//! ```

use std::fmt;
use std::time::Duration;

/// Retry eligibility assigned to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Classification {
    /// Timing or environment related; another attempt may succeed.
    Transient,
    /// The same input will fail the same way. Never retried.
    Deterministic,
    /// Not recognized by the taxonomy. Not retried unless explicitly whitelisted.
    Unknown,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Transient => "transient",
            Classification::Deterministic => "deterministic",
            Classification::Unknown => "unknown",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Classification::Transient => 0b001,
            Classification::Deterministic => 0b010,
            Classification::Unknown => 0b100,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Small set of classifications, used for a policy's retryable tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ClassificationSet(u8);

impl ClassificationSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// The default retryable set: `{Transient}`.
    pub fn transient_only() -> Self {
        Self::empty().with(Classification::Transient)
    }

    #[must_use]
    pub fn with(self, classification: Classification) -> Self {
        Self(self.0 | classification.bit())
    }

    pub fn contains(&self, classification: Classification) -> bool {
        self.0 & classification.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Classification> + '_ {
        [Classification::Transient, Classification::Deterministic, Classification::Unknown]
            .into_iter()
            .filter(move |c| self.contains(*c))
    }
}

impl FromIterator<Classification> for ClassificationSet {
    fn from_iter<I: IntoIterator<Item = Classification>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

/// One captured failure of a single execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure<E> {
    /// The operation itself returned an error.
    Operation(E),
    /// The precondition did not become ready before its deadline; the operation was not run.
    PreconditionTimedOut {
        elapsed: Duration,
        polls: usize,
        /// The last absorbed not-ready error, if the final observation was one.
        last_error: Option<E>,
    },
    /// The operation succeeded but the post-action state never settled.
    StabilizationTimedOut { elapsed: Duration, polls: usize, last_error: Option<E> },
}

impl<E> Failure<E> {
    /// Short, stable label used in logs and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            Failure::Operation(_) => "operation_failed",
            Failure::PreconditionTimedOut { .. } => "precondition_timeout",
            Failure::StabilizationTimedOut { .. } => "stabilization_timeout",
        }
    }

    pub fn is_timeout(&self) -> bool {
        !matches!(self, Failure::Operation(_))
    }

    /// The operation error, if this failure carries one.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Failure::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for Failure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Operation(e) => write!(f, "{}", e),
            Failure::PreconditionTimedOut { elapsed, polls, .. } => {
                write!(f, "precondition not ready after {:?} ({} polls)", elapsed, polls)
            }
            Failure::StabilizationTimedOut { elapsed, polls, .. } => {
                write!(f, "state did not stabilize after {:?} ({} polls)", elapsed, polls)
            }
        }
    }
}

/// Caller-supplied mapping from captured failure to classification.
pub trait FailureTaxonomy<E>: Send + Sync {
    fn classify(&self, failure: &Failure<E>) -> Classification;
}

impl<E, F> FailureTaxonomy<E> for F
where
    F: Fn(&Failure<E>) -> Classification + Send + Sync,
{
    fn classify(&self, failure: &Failure<E>) -> Classification {
        self(failure)
    }
}

/// Taxonomy that classifies operation errors with a function and treats readiness timeouts as
/// transient.
pub struct OperationTaxonomy<F> {
    classify_error: F,
}

impl<F> OperationTaxonomy<F> {
    pub fn new(classify_error: F) -> Self {
        Self { classify_error }
    }
}

impl<E, F> FailureTaxonomy<E> for OperationTaxonomy<F>
where
    F: Fn(&E) -> Classification + Send + Sync,
{
    fn classify(&self, failure: &Failure<E>) -> Classification {
        match failure {
            Failure::Operation(e) => (self.classify_error)(e),
            _ => Classification::Transient,
        }
    }
}

/// Error types that know whether they are transient.
pub trait IsTransient {
    /// `Some(true)` for transient, `Some(false)` for deterministic, `None` when unsure.
    fn is_transient(&self) -> Option<bool>;
}

impl IsTransient for std::io::Error {
    fn is_transient(&self) -> Option<bool> {
        use std::io::ErrorKind::*;
        match self.kind() {
            TimedOut | Interrupted | WouldBlock | ConnectionReset | ConnectionAborted
            | ConnectionRefused | NotConnected | BrokenPipe | UnexpectedEof => Some(true),
            InvalidInput | InvalidData | NotFound | PermissionDenied | Unsupported => Some(false),
            _ => None,
        }
    }
}

/// Taxonomy for error types implementing [`IsTransient`]. Readiness timeouts are transient.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransientErrors;

impl<E: IsTransient> FailureTaxonomy<E> for TransientErrors {
    fn classify(&self, failure: &Failure<E>) -> Classification {
        match failure {
            Failure::Operation(e) => match e.is_transient() {
                Some(true) => Classification::Transient,
                Some(false) => Classification::Deterministic,
                None => Classification::Unknown,
            },
            _ => Classification::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn set_membership() {
        let set = ClassificationSet::transient_only();
        assert!(set.contains(Classification::Transient));
        assert!(!set.contains(Classification::Unknown));

        let both: ClassificationSet =
            [Classification::Transient, Classification::Unknown].into_iter().collect();
        assert_eq!(
            both.iter().collect::<Vec<_>>(),
            vec![Classification::Transient, Classification::Unknown]
        );
        assert!(ClassificationSet::empty().is_empty());
    }

    #[test]
    fn closures_are_taxonomies() {
        let taxonomy = |f: &Failure<String>| {
            if f.is_timeout() {
                Classification::Transient
            } else {
                Classification::Unknown
            }
        };
        assert_eq!(
            taxonomy.classify(&Failure::Operation("x".to_string())),
            Classification::Unknown
        );
        let timeout = Failure::PreconditionTimedOut {
            elapsed: Duration::from_secs(1),
            polls: 3,
            last_error: None,
        };
        assert_eq!(taxonomy.classify(&timeout), Classification::Transient);
    }

    #[test]
    fn io_errors_split_by_kind() {
        let t = TransientErrors;
        let reset = Failure::Operation(io::Error::from(io::ErrorKind::ConnectionReset));
        let invalid = Failure::Operation(io::Error::from(io::ErrorKind::InvalidData));
        let other = Failure::Operation(io::Error::new(io::ErrorKind::Other, "??"));
        assert_eq!(t.classify(&reset), Classification::Transient);
        assert_eq!(t.classify(&invalid), Classification::Deterministic);
        assert_eq!(t.classify(&other), Classification::Unknown);
    }

    #[test]
    fn failure_labels_and_display() {
        let f: Failure<String> = Failure::StabilizationTimedOut {
            elapsed: Duration::from_millis(300),
            polls: 4,
            last_error: None,
        };
        assert_eq!(f.kind(), "stabilization_timeout");
        assert!(f.to_string().contains("4 polls"));
        assert!(f.operation_error().is_none());

        let op = Failure::Operation("stale element".to_string());
        assert_eq!(op.operation_error().map(String::as_str), Some("stale element"));
        assert_eq!(op.to_string(), "stale element");
    }
}
