use super::events::RetryEvent;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tower::Service;

use crate::outcome::FlakinessSignal;

type SinkFuture<Err> = Pin<Box<dyn Future<Output = Result<(), Err>> + Send>>;

/// A telemetry sink that consumes retry events.
pub trait TelemetrySink<E>:
    tower::Service<RetryEvent<E>, Response = (), Error = Self::SinkError> + Clone + Send + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + 'static;
}

/// Deliver `event` to a clone of `sink`, honoring `poll_ready`.
///
/// A sink failure is logged rather than propagated. Flakiness signals are logged in full at
/// error level so a broken sink can never make one disappear.
pub async fn emit<S, E>(sink: &S, event: RetryEvent<E>)
where
    S: TelemetrySink<E>,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    let summary = event.to_string();
    let fallback = event.as_flaky().map(describe_signal);
    let delivered = match ServiceExt::<RetryEvent<E>>::ready_oneshot(sink.clone()).await {
        Ok(mut ready) => ready.call(event).await,
        Err(e) => Err(e),
    };
    if let Err(e) = delivered {
        match fallback {
            Some(signal) => {
                tracing::error!(
                    error = %e,
                    signal = %signal,
                    "telemetry sink rejected flakiness signal"
                )
            }
            None => tracing::warn!(error = %e, event = %summary, "telemetry sink rejected event"),
        }
    }
}

fn describe_signal<E>(signal: &FlakinessSignal<E>) -> String {
    let attempts: Vec<String> = signal
        .history
        .iter()
        .map(|r| format!("#{}:{}:{}", r.attempt, r.failure.kind(), r.classification))
        .collect();
    format!(
        "{} passed on attempt {} after [{}]",
        signal.attempt_id,
        signal.attempts_used,
        attempts.join(", ")
    )
}

/// A telemetry sink that logs events using the `tracing` crate.
///
/// Flakiness signals are logged at `warn` with one extra `warn` line per preceding failure.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl<E> Service<RetryEvent<E>> for LogSink
where
    E: fmt::Display + Send + 'static,
{
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: RetryEvent<E>) -> Self::Future {
        match &event {
            RetryEvent::Flaky(signal) => {
                tracing::warn!(
                    attempt_id = %signal.attempt_id,
                    attempts_used = signal.attempts_used,
                    failures = signal.history.len(),
                    "flaky: passed only after retry"
                );
                for record in &signal.history {
                    tracing::warn!(
                        attempt_id = %signal.attempt_id,
                        attempt = record.attempt,
                        classification = %record.classification,
                        failure = %record.failure,
                        "flaky: preceding failure"
                    );
                }
            }
            other => tracing::info!(event = %other, "retry_event"),
        }
        Box::pin(async { Ok(()) })
    }
}

impl<E> TelemetrySink<E> for LogSink
where
    E: fmt::Display + Send + 'static,
{
    type SinkError = Infallible;
}

/// A telemetry sink that stores events in memory, bounded by `capacity`.
///
/// When full, the oldest `Scheduled`/`Exhausted` event makes room. Flakiness signals are only
/// displaced by newer signals, and each displaced signal is logged at error level.
#[derive(Debug)]
pub struct MemorySink<E> {
    events: Arc<Mutex<Vec<RetryEvent<E>>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl<E> Clone for MemorySink<E> {
    fn clone(&self) -> Self {
        Self { events: self.events.clone(), capacity: self.capacity, evicted: self.evicted.clone() }
    }
}

impl<E> MemorySink<E> {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn unbounded() -> Self {
        Self::with_capacity(usize::MAX)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Remove and return every stored event.
    pub fn drain(&self) -> Vec<RetryEvent<E>> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RetryEvent<E>>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: Clone> MemorySink<E> {
    pub fn events(&self) -> Vec<RetryEvent<E>> {
        self.lock().clone()
    }

    pub fn flakiness_signals(&self) -> Vec<FlakinessSignal<E>> {
        self.lock().iter().filter_map(|e| e.as_flaky().cloned()).collect()
    }
}

impl<E> Default for MemorySink<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Send + 'static> Service<RetryEvent<E>> for MemorySink<E> {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: RetryEvent<E>) -> Self::Future {
        let mut guard = self.lock();
        if guard.len() >= self.capacity {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            match guard.iter().position(|e| e.as_flaky().is_none()) {
                Some(index) => {
                    guard.remove(index);
                }
                // full of signals: a routine event is the one to go
                None if event.as_flaky().is_none() => return Box::pin(async { Ok(()) }),
                None => {
                    if let Some(signal) = guard.remove(0).as_flaky() {
                        tracing::error!(
                            signal = %describe_signal(signal),
                            capacity = self.capacity,
                            "memory sink full, evicted flakiness signal"
                        );
                    }
                }
            }
        }
        guard.push(event);
        Box::pin(async { Ok(()) })
    }
}

impl<E: Send + 'static> TelemetrySink<E> for MemorySink<E> {
    type SinkError = Infallible;
}

#[derive(Debug)]
pub struct ComposedSinkError(Box<dyn std::error::Error + Send + Sync>);

impl fmt::Display for ComposedSinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "telemetry sink error: {}", self.0)
    }
}

impl std::error::Error for ComposedSinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.0)
    }
}

/// Delivers every event to both sinks; errors from either are reported after both ran.
#[derive(Clone, Debug)]
pub struct MulticastSink<A, B> {
    sink_a: A,
    sink_b: B,
}

impl<A, B> MulticastSink<A, B> {
    pub fn new(sink_a: A, sink_b: B) -> Self {
        Self { sink_a, sink_b }
    }
}

impl<E, A, B> Service<RetryEvent<E>> for MulticastSink<A, B>
where
    E: Clone + Send + 'static,
    A: Service<RetryEvent<E>, Response = ()> + Clone + Send + 'static,
    A::Error: std::error::Error + Send + Sync + 'static,
    A::Future: Send + 'static,
    B: Service<RetryEvent<E>, Response = ()> + Clone + Send + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
    B::Future: Send + 'static,
{
    type Response = ();
    type Error = ComposedSinkError;
    type Future = SinkFuture<Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: RetryEvent<E>) -> Self::Future {
        use tower::ServiceExt;

        let sink_a = self.sink_a.clone();
        let sink_b = self.sink_b.clone();
        let event_clone = event.clone();

        Box::pin(async move {
            let (res_a, res_b) =
                tokio::join!(sink_a.oneshot(event), sink_b.oneshot(event_clone));
            res_a.map_err(|e| ComposedSinkError(Box::new(e)))?;
            res_b.map_err(|e| ComposedSinkError(Box::new(e)))?;
            Ok(())
        })
    }
}

impl<E, A, B> TelemetrySink<E> for MulticastSink<A, B>
where
    E: Clone + Send + 'static,
    A: Service<RetryEvent<E>, Response = ()> + Clone + Send + 'static,
    A::Error: std::error::Error + Send + Sync + 'static,
    A::Future: Send + 'static,
    B: Service<RetryEvent<E>, Response = ()> + Clone + Send + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
    B::Future: Send + 'static,
{
    type SinkError = ComposedSinkError;
}
