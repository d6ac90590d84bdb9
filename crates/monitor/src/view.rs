//! Snapshot of fleet state read from the store.

use chrono::Utc;

use busalert_core::heartbeat::HeartbeatRecord;
use busalert_core::types::Timestamp;
use busalert_store::repositories::job_repo::StatusCounts;
use busalert_store::repositories::{HeartbeatRepo, JobRepo, LeaseRepo};
use busalert_store::{ObjectStore, StoreError};

#[derive(Debug, Clone)]
pub struct FleetView {
    pub taken_at: Timestamp,
    /// Every readable heartbeat, sorted by worker id.
    pub workers: Vec<HeartbeatRecord>,
    /// Worker ids of current GPU lease holders.
    pub lease_holders: Vec<String>,
    pub jobs: Option<StatusCounts>,
}

impl FleetView {
    pub fn holds_lease(&self, worker_id: &str) -> bool {
        self.lease_holders.iter().any(|id| id == worker_id)
    }
}

/// Read heartbeats, leases and (optionally) job counts.
pub async fn collect(store: &dyn ObjectStore, job_counts: bool) -> Result<FleetView, StoreError> {
    let mut workers = HeartbeatRepo::list(store).await?;
    workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));

    let lease_holders = LeaseRepo::holders(store).await?;
    let jobs = if job_counts {
        Some(JobRepo::status_counts(store).await?)
    } else {
        None
    };

    Ok(FleetView {
        taken_at: Utc::now(),
        workers,
        lease_holders,
        jobs,
    })
}
