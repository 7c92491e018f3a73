//! JSONL sink for `flakeguard`. Appends one JSON object per retry event.
//!
//! Point it at a file in CI and every flaky pass leaves a line behind:
//!
//! ```text
//! {"kind":"flaky","attempt_id":"checkout","attempts_used":2,"elapsed_ms":130,"failures":[...]}
//! ```

use flakeguard::telemetry::{event_to_json, RetryEvent, TelemetrySink};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

#[derive(Clone, Debug)]
pub struct JsonlSink {
    path: PathBuf,
    flaky_only: bool,
}

impl JsonlSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into(), flaky_only: false }
    }

    /// Skip `Scheduled`/`Exhausted` events and keep only flakiness reports.
    pub fn flaky_only(mut self) -> Self {
        self.flaky_only = true;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<E> tower_service::Service<RetryEvent<E>> for JsonlSink
where
    E: fmt::Display + Send + 'static,
{
    type Response = ();
    type Error = io::Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: RetryEvent<E>) -> Self::Future {
        if self.flaky_only && event.as_flaky().is_none() {
            return Box::pin(async { Ok(()) });
        }
        let path = self.path.clone();
        let line = event_to_json(&event).to_string() + "\n";
        Box::pin(async move {
            use tokio::io::AsyncWriteExt;
            let mut file =
                tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
            tracing::trace!(path = %path.display(), "jsonl event written");
            Ok(())
        })
    }
}

impl<E> TelemetrySink<E> for JsonlSink
where
    E: fmt::Display + Send + 'static,
{
    type SinkError = io::Error;
}
