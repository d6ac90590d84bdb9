//! Processing of a single claimed job.
//!
//! Every exit path releases the GPU lease. The payload is held in memory
//! for the duration of the backend call and dropped on return.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use busalert_core::archive;
use busalert_core::detection::DetectionResult;
use busalert_core::error::CoreError;
use busalert_core::job::JobRecord;
use busalert_inference::{DetectionRequest, InferenceBackend, InferenceError};
use busalert_store::repositories::job_repo::TransitionOutcome;
use busalert_store::repositories::JobRepo;
use busalert_store::{ObjectStore, StoreError};

use crate::lease::LeaseManager;

/// Knobs for the backend call.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Upper bound on one inference call.
    pub request_timeout: Duration,
    pub confidence_threshold: f64,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(300),
            confidence_threshold: 0.75,
        }
    }
}

/// What happened to a claimed job.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Result persisted, job `completed`.
    Completed(DetectionResult),
    /// Backend overloaded, job returned to `pending`.
    Requeued,
    /// Job marked `failed` with this message.
    Failed(String),
    /// Shutdown arrived before a lease was obtained; job returned to
    /// `pending` untouched.
    Abandoned,
}

impl ProcessOutcome {
    pub fn is_overload(&self) -> bool {
        matches!(self, Self::Requeued)
    }
}

/// Failures inside a processing attempt.
#[derive(Debug, thiserror::Error)]
enum JobError {
    #[error("Failed to download payload: {0}")]
    Payload(#[source] StoreError),

    #[error("{0}")]
    Archive(#[from] CoreError),

    #[error("{0}")]
    Inference(#[from] InferenceError),
}

pub struct JobProcessor {
    store: Arc<dyn ObjectStore>,
    backend: Arc<dyn InferenceBackend>,
    leases: LeaseManager,
    settings: ProcessorSettings,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        backend: Arc<dyn InferenceBackend>,
        leases: LeaseManager,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            store,
            backend,
            leases,
            settings,
        }
    }

    /// Run a job this worker has claimed through to a recorded outcome.
    ///
    /// Never returns an error: store failures while recording the outcome
    /// are logged and leave the record as the store last saw it.
    pub async fn process(&self, job: &JobRecord, cancel: &CancellationToken) -> ProcessOutcome {
        let job_id = job.job_id.as_str();

        if !self.leases.acquire(cancel).await {
            tracing::info!(job_id, "Shutdown while waiting for a lease, returning job to queue");
            self.requeue(job_id).await;
            return ProcessOutcome::Abandoned;
        }

        let attempt = AssertUnwindSafe(self.run_job(job)).catch_unwind().await;
        let outcome = match attempt {
            Ok(Ok(result)) => ProcessOutcome::Completed(result),
            Ok(Err(JobError::Inference(e))) if e.is_overloaded() => {
                tracing::warn!(job_id, error = %e, "Backend overloaded, requeueing job");
                ProcessOutcome::Requeued
            }
            Ok(Err(e)) => {
                tracing::error!(job_id, error = %e, "Job failed");
                ProcessOutcome::Failed(e.to_string())
            }
            Err(panic) => {
                let message = format!("Unexpected error: {}", panic_message(panic.as_ref()));
                tracing::error!(job_id, error = %message, "Job processing panicked");
                ProcessOutcome::Failed(message)
            }
        };

        let outcome = self.record(job_id, outcome).await;
        self.leases.release().await;
        outcome
    }

    async fn run_job(&self, job: &JobRecord) -> Result<DetectionResult, JobError> {
        let payload = self
            .store
            .get(&job.payload_key())
            .await
            .map_err(JobError::Payload)?;

        let summary = archive::inspect_archive(&payload)?;
        tracing::info!(
            job_id = %job.job_id,
            images = summary.images,
            size_mb = %format!("{:.2}", summary.size_mb()),
            "Sending job to inference backend",
        );

        let request = DetectionRequest {
            bus_number: job.bus_number.clone(),
            latlong: job.latlong.clone(),
            confidence_threshold: self.settings.confidence_threshold,
        };

        let timeout = self.settings.request_timeout;
        let result = tokio::time::timeout(timeout, self.backend.detect(payload, &request))
            .await
            .map_err(|_| InferenceError::Timeout(timeout))??;

        tracing::info!(
            job_id = %job.job_id,
            matches_found = result.matches_found,
            alert = result.alert,
            confidence = result.confidence,
            "Detection finished",
        );
        Ok(result)
    }

    /// Persist `outcome` and return what actually ended up recorded.
    async fn record(&self, job_id: &str, outcome: ProcessOutcome) -> ProcessOutcome {
        let store = self.store.as_ref();
        match outcome {
            ProcessOutcome::Completed(result) => {
                match JobRepo::complete(store, job_id, &result).await {
                    Ok(applied) => {
                        log_rejection(job_id, &applied);
                        ProcessOutcome::Completed(result)
                    }
                    Err(e) => {
                        let message = format!("Failed to store result: {e}");
                        tracing::error!(job_id, error = %e, "Could not persist result");
                        self.fail(job_id, &message).await;
                        ProcessOutcome::Failed(message)
                    }
                }
            }
            ProcessOutcome::Requeued => {
                self.requeue(job_id).await;
                ProcessOutcome::Requeued
            }
            ProcessOutcome::Failed(message) => {
                self.fail(job_id, &message).await;
                ProcessOutcome::Failed(message)
            }
            ProcessOutcome::Abandoned => ProcessOutcome::Abandoned,
        }
    }

    async fn fail(&self, job_id: &str, message: &str) {
        match JobRepo::fail(self.store.as_ref(), job_id, message).await {
            Ok(applied) => log_rejection(job_id, &applied),
            Err(e) => tracing::error!(job_id, error = %e, "Could not mark job failed"),
        }
    }

    async fn requeue(&self, job_id: &str) {
        match JobRepo::requeue(self.store.as_ref(), job_id).await {
            Ok(applied) => log_rejection(job_id, &applied),
            Err(e) => tracing::error!(job_id, error = %e, "Could not requeue job"),
        }
    }
}

/// The record left `processing` behind our back, e.g. a lost claim race.
fn log_rejection(job_id: &str, outcome: &TransitionOutcome) {
    if let TransitionOutcome::Rejected { actual } = outcome {
        tracing::warn!(job_id, status = %actual, "Job changed state during processing, outcome not recorded");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
