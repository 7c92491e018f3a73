//! Convenient re-exports for common flakeguard types.
pub use crate::{
    attempt::{Attempt, AttemptId, Condition},
    backoff::Backoff,
    error::{AttemptError, BuildError},
    jitter::Jitter,
    outcome::{AttemptOutcome, FlakinessSignal},
    poller::{ConditionPoller, ConditionResult, Probe},
    retry::{RetryClassifier, RetryPolicy},
    taxonomy::{Classification, Failure, FailureTaxonomy, OperationTaxonomy},
    telemetry::{LogSink, MemorySink, TelemetrySink},
};
