use crate::attempt::AttemptId;
use crate::outcome::FlakinessSignal;
use crate::taxonomy::Classification;
use std::fmt;
use std::time::Duration;

#[cfg(feature = "telemetry-json")]
use serde_json::json;

/// Events emitted by the retry classifier.
///
/// `Flaky` is the one event that must always reach a human: it is emitted whenever a sequence
/// succeeded only after retrying, and the engine never suppresses it.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryEvent<E> {
    /// A failed execution will be retried after `delay`.
    Scheduled {
        attempt_id: AttemptId,
        /// The execution that just failed (1-indexed).
        attempt: usize,
        classification: Classification,
        delay: Duration,
    },
    /// The sequence stopped without success.
    Exhausted {
        attempt_id: AttemptId,
        /// Executions performed.
        attempts: usize,
        /// Classification of the final failure.
        classification: Classification,
        elapsed: Duration,
    },
    /// Success after one or more failed executions.
    Flaky(FlakinessSignal<E>),
}

impl<E> RetryEvent<E> {
    pub fn attempt_id(&self) -> &AttemptId {
        match self {
            RetryEvent::Scheduled { attempt_id, .. } | RetryEvent::Exhausted { attempt_id, .. } => {
                attempt_id
            }
            RetryEvent::Flaky(signal) => &signal.attempt_id,
        }
    }

    pub fn as_flaky(&self) -> Option<&FlakinessSignal<E>> {
        match self {
            RetryEvent::Flaky(signal) => Some(signal),
            _ => None,
        }
    }
}

impl<E> fmt::Display for RetryEvent<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryEvent::Scheduled { attempt_id, attempt, classification, delay } => write!(
                f,
                "Scheduled({}, #{} {}, delay={:?})",
                attempt_id, attempt, classification, delay
            ),
            RetryEvent::Exhausted { attempt_id, attempts, classification, elapsed } => write!(
                f,
                "Exhausted({}, attempts={}, last={}, elapsed={:?})",
                attempt_id, attempts, classification, elapsed
            ),
            RetryEvent::Flaky(signal) => write!(
                f,
                "Flaky({}, attempts={}, failures={})",
                signal.attempt_id,
                signal.attempts_used,
                signal.history.len()
            ),
        }
    }
}

#[cfg_attr(not(feature = "telemetry-json"), allow(dead_code))]
#[inline]
fn clamp_u64(val: u128) -> u64 {
    val.min(u128::from(u64::MAX)) as u64
}

#[cfg(feature = "telemetry-json")]
fn unix_millis(at: std::time::SystemTime) -> u64 {
    at.duration_since(std::time::UNIX_EPOCH).map(|d| clamp_u64(d.as_millis())).unwrap_or(0)
}

/// Convert a RetryEvent into a JSON value for sinks.
#[cfg(feature = "telemetry-json")]
pub fn event_to_json<E: fmt::Display>(event: &RetryEvent<E>) -> serde_json::Value {
    match event {
        RetryEvent::Scheduled { attempt_id, attempt, classification, delay } => json!({
            "kind": "retry_scheduled",
            "attempt_id": attempt_id.as_str(),
            "attempt": *attempt,
            "classification": classification.as_str(),
            "delay_ms": clamp_u64(delay.as_millis()),
        }),
        RetryEvent::Exhausted { attempt_id, attempts, classification, elapsed } => json!({
            "kind": "retry_exhausted",
            "attempt_id": attempt_id.as_str(),
            "attempts": *attempts,
            "classification": classification.as_str(),
            "elapsed_ms": clamp_u64(elapsed.as_millis()),
        }),
        RetryEvent::Flaky(signal) => {
            let failures: Vec<serde_json::Value> = signal
                .history
                .iter()
                .map(|r| {
                    json!({
                        "attempt": r.attempt,
                        "kind": r.failure.kind(),
                        "classification": r.classification.as_str(),
                        "message": r.failure.to_string(),
                        "at_ms": unix_millis(r.at),
                        "elapsed_ms": clamp_u64(r.elapsed.as_millis()),
                    })
                })
                .collect();
            json!({
                "kind": "flaky",
                "attempt_id": signal.attempt_id.as_str(),
                "attempts_used": signal.attempts_used,
                "elapsed_ms": clamp_u64(signal.elapsed.as_millis()),
                "failures": failures,
            })
        }
    }
}
