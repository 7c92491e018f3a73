//! Telemetry for the retry engine.
//!
//! The [`RetryClassifier`](crate::RetryClassifier) reports what it does as [`RetryEvent`]s:
//!
//! - `Scheduled`: a failed execution will be retried after a delay.
//! - `Exhausted`: the sequence stopped without success.
//! - `Flaky`: the sequence succeeded only after retrying. This is the flakiness report and it is
//!   always delivered.
//!
//! Events flow through [`TelemetrySink`] implementations, which are `tower::Service<RetryEvent<E>>`
//! values so they compose like any other tower service.

pub mod events;
pub mod sinks;

#[cfg(feature = "telemetry-json")]
pub use events::event_to_json;
pub use events::RetryEvent;
pub use sinks::{emit, ComposedSinkError, LogSink, MemorySink, MulticastSink, TelemetrySink};
