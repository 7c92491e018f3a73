use flakeguard::{
    Attempt, Backoff, Classification, InstantSleeper, OperationTaxonomy, RetryClassifier,
    RetryEvent, RetryPolicy,
};
use flakeguard_jsonl::JsonlSink;
use std::time::Duration;
use tower_service::Service;

fn read_lines(path: &std::path::Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .expect("file")
        .lines()
        .map(|l| serde_json::from_str(l).expect("valid json line"))
        .collect()
}

#[tokio::test]
async fn writes_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let mut sink = JsonlSink::new(&path);

    let event: RetryEvent<String> = RetryEvent::Scheduled {
        attempt_id: "search".into(),
        attempt: 1,
        classification: Classification::Transient,
        delay: Duration::from_millis(50),
    };
    sink.call(event.clone()).await.unwrap();
    sink.call(event).await.unwrap();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["kind"], "retry_scheduled");
    assert_eq!(lines[0]["delay_ms"], 50);
}

#[tokio::test]
async fn flaky_pass_is_persisted_with_history() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flaky.jsonl");
    let engine = RetryClassifier::new(JsonlSink::new(&path).flaky_only());
    let policy = RetryPolicy::builder()
        .max_attempts(3)
        .backoff(Backoff::fixed(Duration::from_millis(10)))
        .with_sleeper(InstantSleeper)
        .build()
        .unwrap();
    let taxonomy = OperationTaxonomy::new(|_: &String| Classification::Transient);

    let mut remaining = 2;
    let attempt = Attempt::with_id("upload", move || {
        remaining -= 1;
        let fail = remaining >= 0;
        async move {
            if fail {
                Err("connection reset".to_string())
            } else {
                Ok(())
            }
        }
    });

    let outcome = engine.execute(attempt, &policy, &taxonomy).await;
    assert!(outcome.is_success());

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 1, "scheduled events are filtered out");
    assert_eq!(lines[0]["kind"], "flaky");
    assert_eq!(lines[0]["attempt_id"], "upload");
    assert_eq!(lines[0]["attempts_used"], 3);
    assert_eq!(lines[0]["failures"].as_array().map(Vec::len), Some(2));
    assert_eq!(lines[0]["failures"][1]["message"], "connection reset");
}

#[tokio::test]
async fn unwritable_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = JsonlSink::new(dir.path().join("missing").join("events.jsonl"));
    let event: RetryEvent<String> = RetryEvent::Exhausted {
        attempt_id: "x".into(),
        attempts: 1,
        classification: Classification::Deterministic,
        elapsed: Duration::ZERO,
    };
    assert!(sink.call(event).await.is_err());
}
