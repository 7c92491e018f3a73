#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # flakeguard
//!
//! Condition polling and retry classification for async test runners and automation steps.
//!
//! Two independent pieces:
//!
//! - [`ConditionPoller`] waits for a predicate to hold, bounded by a deadline. It returns at once
//!   when the condition already holds and never sleeps past the deadline.
//! - [`RetryClassifier`] runs an [`Attempt`] under a [`RetryPolicy`]. Every failure is classified
//!   by a caller-supplied [`FailureTaxonomy`]; only retryable classifications are retried and
//!   deterministic failures never are. A success that needed retries emits a
//!   [`FlakinessSignal`] so the flakiness is reported instead of hidden.
//!
//! ## Features
//!
//! - **Explicit waits** with ignorable "not yet" errors and cancellation
//! - **Bounded retries** with fixed, linear, or exponential backoff and optional jitter
//! - **Failure taxonomy** (`Transient`, `Deterministic`, `Unknown`) supplied by the caller
//! - **Telemetry sinks** as `tower::Service`s: tracing logs, in-memory capture, fan-out
//! - **Serializable config** behind the `serde` feature
//!
//! ## Quick Start
//!
//! ```rust
//! use flakeguard::{
//!     Attempt, Backoff, Classification, Condition, ConditionPoller, MemorySink,
//!     OperationTaxonomy, RetryClassifier, RetryPolicy,
//! };
//! use std::time::Duration;
//!
//! #[derive(Debug, Clone)]
//! enum UiError { NotVisible, Stale, AssertionFailed }
//!
//! #[tokio::main]
//! async fn main() {
//!     let policy = RetryPolicy::builder()
//!         .max_attempts(3)
//!         .backoff(Backoff::exponential(Duration::from_millis(50)))
//!         .build()
//!         .unwrap();
//!     let taxonomy = OperationTaxonomy::new(|e: &UiError| match e {
//!         UiError::AssertionFailed => Classification::Deterministic,
//!         _ => Classification::Transient,
//!     });
//!
//!     let visible = ConditionPoller::<UiError>::builder()
//!         .timeout(Duration::from_secs(2))
//!         .poll_interval(Duration::from_millis(20))
//!         .ignoring(|e| matches!(e, UiError::NotVisible))
//!         .build()
//!         .unwrap();
//!
//!     let attempt = Attempt::with_id("click-submit", || async { Ok::<_, UiError>("clicked") })
//!         .precondition(Condition::new(visible, || async { Ok(true) }));
//!
//!     let sink = MemorySink::new();
//!     let outcome = RetryClassifier::new(sink.clone()).execute(attempt, &policy, &taxonomy).await;
//!     assert!(outcome.is_success());
//!     assert!(sink.flakiness_signals().is_empty());
//! }
//! ```

pub mod attempt;
pub mod backoff;
pub mod clock;
#[cfg(feature = "serde")]
pub mod config;
pub mod deadline;
pub mod error;
pub mod jitter;
pub mod outcome;
pub mod poller;
pub mod prelude;
pub mod retry;
pub mod sleeper;
pub mod taxonomy;
pub mod telemetry;

// Re-exports
pub use attempt::{Attempt, AttemptId, Condition};
pub use backoff::{Backoff, BackoffError, MAX_BACKOFF};
pub use clock::{Clock, ManualClock, SystemClock};
#[cfg(feature = "serde")]
pub use config::{BackoffConfig, EngineConfig, JitterConfig, RetryConfig, WaitConfig};
pub use deadline::Deadline;
pub use error::{AttemptError, BuildError};
pub use jitter::Jitter;
pub use outcome::{AttemptOutcome, FailureHistory, FailureRecord, FlakinessSignal};
pub use poller::{
    wait_for, ConditionPoller, ConditionPollerBuilder, ConditionResult, Observation, Probe,
};
pub use retry::{RetryClassifier, RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use taxonomy::{
    Classification, ClassificationSet, Failure, FailureTaxonomy, IsTransient, OperationTaxonomy,
    TransientErrors,
};
pub use telemetry::{LogSink, MemorySink, MulticastSink, RetryEvent, TelemetrySink};
