//! Periodic heartbeat publisher.
//!
//! Writes `workers/{worker_id}.json` on a fixed timer for the lifetime of
//! the process, carrying the latest [`WorkerSnapshot`] from the job loop.
//! Write failures skip the beat.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use busalert_core::heartbeat::WorkerSnapshot;
use busalert_store::repositories::HeartbeatRepo;
use busalert_store::ObjectStore;

/// Run the heartbeat loop until `cancel` fires.
///
/// The first beat is written immediately.
pub async fn run(
    store: Arc<dyn ObjectStore>,
    worker_id: String,
    interval: Duration,
    snapshots: watch::Receiver<WorkerSnapshot>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    tracing::info!(worker_id = %worker_id, interval_secs = interval.as_secs(), "Heartbeat started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(worker_id = %worker_id, "Heartbeat stopping");
                break;
            }
            _ = ticker.tick() => {
                let snapshot = snapshots.borrow().clone();
                beat(store.as_ref(), &worker_id, &snapshot).await;
            }
        }
    }
}

/// Publish one heartbeat. Returns whether the write succeeded.
pub async fn beat(store: &dyn ObjectStore, worker_id: &str, snapshot: &WorkerSnapshot) -> bool {
    let record = snapshot.to_record(worker_id, Utc::now());
    match HeartbeatRepo::publish(store, &record).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(worker_id, error = %e, "Heartbeat write failed, skipping beat");
            false
        }
    }
}
