//! Integration tests for the full poll-claim-process loop and the
//! heartbeat task running beside it.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use busalert_core::heartbeat::WorkerActivity;
use busalert_core::job::JobStatus;
use busalert_inference::backoff::BackoffConfig;
use busalert_store::memory::MemoryStore;
use busalert_store::repositories::{HeartbeatRepo, JobRepo, LeaseRepo};
use busalert_store::ObjectStore;
use busalert_worker::heartbeat;
use busalert_worker::runner::{LoopSettings, Worker};

use common::{detection, processor, submit, MockBackend, Reply};

fn settings(worker_id: &str) -> LoopSettings {
    LoopSettings {
        worker_id: worker_id.into(),
        poll_interval: Duration::from_millis(20),
        backoff: BackoffConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            multiplier: 2.0,
        },
    }
}

/// Poll `check` until it holds or `limit` elapses.
async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// ---------------------------------------------------------------------------
// Test: overload, backoff, reprocess
// ---------------------------------------------------------------------------

#[tokio::test]
async fn loop_requeues_on_overload_then_completes() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let job = submit(store.as_ref(), "42").await;

    let backend = MockBackend::new([Reply::Overloaded, Reply::Success(detection(3, true))]);
    let worker = Worker::new(
        store.clone(),
        processor(store.clone(), backend.clone(), "w1", 2, Duration::from_secs(5)),
        settings("w1"),
    );

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(worker.run(cancel.clone()));

    let job_id = job.job_id.clone();
    let reader = store.clone();
    let done = eventually(Duration::from_secs(5), || {
        let reader = reader.clone();
        let job_id = job_id.clone();
        async move {
            JobRepo::read(reader.as_ref(), &job_id)
                .await
                .map(|r| r.status == JobStatus::Completed)
                .unwrap_or(false)
        }
    })
    .await;
    assert!(done, "job never completed");

    cancel.cancel();
    let stats = handle.await.unwrap();

    assert_eq!(stats.processed(), 1);
    assert_eq!(stats.failed(), 1);
    assert_eq!(backend.calls(), 2);
    assert!(LeaseRepo::holders(store.as_ref()).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Test: shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn idle_loop_stops_promptly_on_cancel() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let backend = MockBackend::new([]);
    let mut loop_settings = settings("w1");
    loop_settings.poll_interval = Duration::from_secs(60);

    let worker = Worker::new(
        store.clone(),
        processor(store.clone(), backend, "w1", 1, Duration::from_secs(5)),
        loop_settings,
    );

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(worker.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(30)).await;
    cancel.cancel();

    let stats = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("loop did not stop")
        .unwrap();
    assert_eq!(stats.processed(), 0);
    assert_eq!(stats.failed(), 0);
}

// ---------------------------------------------------------------------------
// Test: single pass
// ---------------------------------------------------------------------------

#[tokio::test]
async fn poll_once_processes_every_pending_job() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    for bus in ["1", "2", "3"] {
        submit(store.as_ref(), bus).await;
    }

    let backend = MockBackend::new([Reply::Success(detection(0, false))]);
    let mut worker = Worker::new(
        store.clone(),
        processor(store.clone(), backend.clone(), "w1", 1, Duration::from_secs(5)),
        settings("w1"),
    );

    let report = worker.poll_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.candidates, 3);
    assert_eq!(report.claimed, 3);
    assert!(!report.overloaded);
    assert_eq!(worker.stats().processed(), 3);

    let counts = JobRepo::status_counts(store.as_ref()).await.unwrap();
    assert_eq!(counts.completed, 3);
    assert_eq!(counts.pending, 0);
}

#[tokio::test]
async fn overload_ends_the_pass_early() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    for bus in ["1", "2"] {
        submit(store.as_ref(), bus).await;
    }

    let backend = MockBackend::new([Reply::Overloaded]);
    let mut worker = Worker::new(
        store.clone(),
        processor(store.clone(), backend.clone(), "w1", 1, Duration::from_secs(5)),
        settings("w1"),
    );

    let report = worker.poll_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.claimed, 1);
    assert!(report.overloaded);
    assert_eq!(backend.calls(), 1);

    let counts = JobRepo::status_counts(store.as_ref()).await.unwrap();
    assert_eq!(counts.pending, 2);
}

// ---------------------------------------------------------------------------
// Test: heartbeat follows the loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn heartbeat_reports_counters_from_loop() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    submit(store.as_ref(), "42").await;

    let backend = MockBackend::new([Reply::Success(detection(2, true))]);
    let mut worker = Worker::new(
        store.clone(),
        processor(store.clone(), backend, "w1", 1, Duration::from_secs(5)),
        settings("w1"),
    );

    let cancel = CancellationToken::new();
    let beats = tokio::spawn(heartbeat::run(
        store.clone(),
        "w1".into(),
        Duration::from_millis(10),
        worker.subscribe(),
        cancel.clone(),
    ));

    worker.poll_once(&cancel).await.unwrap();

    let reader = store.clone();
    let reported = eventually(Duration::from_secs(2), || {
        let reader = reader.clone();
        async move {
            HeartbeatRepo::read(reader.as_ref(), "w1")
                .await
                .map(|r| r.processed == 1 && r.status == WorkerActivity::Idle)
                .unwrap_or(false)
        }
    })
    .await;

    cancel.cancel();
    beats.await.unwrap();
    assert!(reported, "heartbeat never showed the processed job");
}
