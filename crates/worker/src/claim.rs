//! Claim protocol: `pending -> processing` with ownership.
//!
//! A claim is a read-verify-overwrite through [`JobRepo::try_transition`].
//! Losing a claim is a normal outcome: the caller moves on and must not
//! process the job.

use busalert_core::job::{JobRecord, JobStatus};
use busalert_store::repositories::job_repo::TransitionOutcome;
use busalert_store::repositories::JobRepo;
use busalert_store::{ObjectStore, StoreError};

/// Result of a claim attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// This worker now owns the job; the record is in `processing`.
    Claimed(JobRecord),
    /// The job was not `pending` when read. `actual` is `None` when the
    /// record no longer exists.
    NotClaimed { actual: Option<JobStatus> },
}

/// Try to take ownership of `job_id` for `worker_id`.
pub async fn claim_job(
    store: &dyn ObjectStore,
    job_id: &str,
    worker_id: &str,
) -> Result<ClaimOutcome, StoreError> {
    let owner = worker_id.to_string();
    let outcome = JobRepo::try_transition(
        store,
        job_id,
        JobStatus::Pending,
        JobStatus::Processing,
        move |record| record.owner_worker_id = Some(owner),
    )
    .await;

    match outcome {
        Ok(TransitionOutcome::Applied(record)) => {
            tracing::info!(job_id, worker_id, bus_number = %record.bus_number, "Job claimed");
            Ok(ClaimOutcome::Claimed(record))
        }
        Ok(TransitionOutcome::Rejected { actual }) => {
            tracing::debug!(job_id, status = %actual, "Job no longer pending, skipping");
            Ok(ClaimOutcome::NotClaimed {
                actual: Some(actual),
            })
        }
        Err(e) if e.is_not_found() => {
            tracing::debug!(job_id, "Job record disappeared before claim");
            Ok(ClaimOutcome::NotClaimed { actual: None })
        }
        Err(e) => Err(e),
    }
}
