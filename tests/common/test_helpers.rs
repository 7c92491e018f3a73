#![allow(dead_code)]

use flakeguard::{
    Attempt, Backoff, Classification, InstantSleeper, OperationTaxonomy, RetryPolicy,
    TrackingSleeper,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors a UI or network step can raise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error("io: {0}")]
    Io(String),
    #[error("assertion failed: {0}")]
    Assertion(String),
    #[error("element not found")]
    NotFound,
    #[error("unexpected: {0}")]
    Other(String),
}

pub fn taxonomy() -> OperationTaxonomy<fn(&StepError) -> Classification> {
    OperationTaxonomy::new(classify as fn(&StepError) -> Classification)
}

fn classify(e: &StepError) -> Classification {
    match e {
        StepError::Io(_) | StepError::NotFound => Classification::Transient,
        StepError::Assertion(_) => Classification::Deterministic,
        StepError::Other(_) => Classification::Unknown,
    }
}

pub fn policy(max_attempts: usize) -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(max_attempts)
        .backoff(Backoff::fixed(Duration::from_millis(10)))
        .with_sleeper(InstantSleeper)
        .build()
        .expect("builder")
}

pub fn tracked_policy(max_attempts: usize, sleeper: &TrackingSleeper) -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(max_attempts)
        .backoff(Backoff::exponential(Duration::from_millis(100)))
        .with_sleeper(sleeper.clone())
        .build()
        .expect("builder")
}

/// An attempt that replays `script` in order, repeating the last entry once it runs out.
pub fn scripted(
    id: &str,
    calls: Arc<AtomicUsize>,
    script: Vec<Result<u32, StepError>>,
) -> Attempt<u32, StepError> {
    Attempt::with_id(id, move || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        let step = script.get(n).or_else(|| script.last()).cloned();
        async move { step.unwrap_or(Ok(0)) }
    })
}

pub fn io(msg: &str) -> Result<u32, StepError> {
    Err(StepError::Io(msg.to_string()))
}

pub fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
