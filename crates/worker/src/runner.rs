//! The poll-claim-process loop.
//!
//! Each pass lists pending jobs and walks them in listing order, claiming
//! and processing one at a time. An empty pass sleeps for the poll
//! interval; a backend overload ends the pass and backs off
//! exponentially. The loop exits between steps once the cancellation
//! token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use busalert_core::heartbeat::{WorkerActivity, WorkerSnapshot};
use busalert_core::job::JobRecord;
use busalert_inference::backoff::{Backoff, BackoffConfig};
use busalert_store::repositories::JobRepo;
use busalert_store::{ObjectStore, StoreError};

use crate::claim::{claim_job, ClaimOutcome};
use crate::processor::{JobProcessor, ProcessOutcome};
use crate::stats::WorkerStats;

/// Loop timing and identity.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub worker_id: String,
    /// Sleep after a pass that processed nothing.
    pub poll_interval: Duration,
    pub backoff: BackoffConfig,
}

/// What one pass over the pending list did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Pending candidates seen in the listing.
    pub candidates: usize,
    /// Jobs this worker claimed and processed.
    pub claimed: usize,
    /// The pass ended early because the backend was overloaded.
    pub overloaded: bool,
}

pub struct Worker {
    store: Arc<dyn ObjectStore>,
    processor: JobProcessor,
    settings: LoopSettings,
    backoff: Backoff,
    stats: WorkerStats,
    snapshots: watch::Sender<WorkerSnapshot>,
}

impl Worker {
    pub fn new(store: Arc<dyn ObjectStore>, processor: JobProcessor, settings: LoopSettings) -> Self {
        let backoff = Backoff::new(settings.backoff.clone());
        let (snapshots, _) = watch::channel(WorkerSnapshot::default());
        Self {
            store,
            processor,
            settings,
            backoff,
            stats: WorkerStats::new(),
            snapshots,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.settings.worker_id
    }

    /// Receiver for the heartbeat task.
    pub fn subscribe(&self) -> watch::Receiver<WorkerSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Run until `cancel` fires. Returns the final counters.
    pub async fn run(mut self, cancel: CancellationToken) -> WorkerStats {
        tracing::info!(
            worker_id = %self.settings.worker_id,
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            "Worker loop started",
        );

        while !cancel.is_cancelled() {
            let pause = match self.poll_once(&cancel).await {
                Ok(report) if report.overloaded => {
                    let delay = self.backoff.next_delay();
                    tracing::info!(delay_secs = delay.as_secs_f64(), "Backing off after overload");
                    Some(delay)
                }
                Ok(report) if report.claimed > 0 => {
                    tracing::info!(
                        processed = self.stats.processed(),
                        failed = self.stats.failed(),
                        "Pass finished",
                    );
                    None
                }
                Ok(_) => Some(self.settings.poll_interval),
                Err(e) => {
                    tracing::error!(error = %e, "Poll cycle failed");
                    Some(self.settings.poll_interval)
                }
            };

            if let Some(delay) = pause {
                if !pause_unless_cancelled(delay, &cancel).await {
                    break;
                }
            }
        }

        tracing::info!(worker_id = %self.settings.worker_id, "Worker loop stopped");
        self.stats
    }

    /// One pass over the pending list.
    ///
    /// Fails only when the listing itself fails; claim errors skip the
    /// candidate.
    pub async fn poll_once(&mut self, cancel: &CancellationToken) -> Result<PassReport, StoreError> {
        let pending = JobRepo::list_pending(self.store.as_ref()).await?;
        let mut report = PassReport {
            candidates: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            return Ok(report);
        }
        tracing::info!(count = pending.len(), "Found pending jobs");

        for (job_id, _) in pending {
            if cancel.is_cancelled() {
                break;
            }

            let claimed = match claim_job(self.store.as_ref(), &job_id, &self.settings.worker_id).await {
                Ok(ClaimOutcome::Claimed(record)) => record,
                Ok(ClaimOutcome::NotClaimed { .. }) => continue,
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Claim attempt failed");
                    continue;
                }
            };

            report.claimed += 1;
            let outcome = self.handle(&claimed, cancel).await;
            if outcome.is_overload() {
                report.overloaded = true;
                break;
            }
        }

        Ok(report)
    }

    async fn handle(&mut self, job: &JobRecord, cancel: &CancellationToken) -> ProcessOutcome {
        self.publish(WorkerActivity::Processing, Some(job.job_id.as_str()));

        let outcome = self.processor.process(job, cancel).await;
        self.stats.record(&outcome);
        if !outcome.is_overload() {
            self.backoff.reset();
        }

        self.publish(WorkerActivity::Idle, None);
        outcome
    }

    fn publish(&self, activity: WorkerActivity, job_id: Option<&str>) {
        self.snapshots
            .send_replace(self.stats.snapshot(activity, job_id));
    }
}

/// Sleep for `delay`. Returns `false` if cancelled first.
async fn pause_unless_cancelled(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
