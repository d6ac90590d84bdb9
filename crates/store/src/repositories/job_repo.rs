//! Repository for job records (`{job_id}/metadata.json`).
//!
//! Every status change goes through [`JobRepo::try_transition`], the single
//! read-modify-write point. The store offers no conditional writes, so two
//! callers that read the same record before either writes will both see
//! their transition applied; the last write wins.

use chrono::Utc;
use serde::Serialize;

use busalert_core::archive;
use busalert_core::detection::DetectionResult;
use busalert_core::job::{self, state_machine, JobRecord, JobResult, JobStatus};
use busalert_core::keys;
use busalert_core::error::CoreError;

use crate::error::StoreError;
use crate::object_store::{get_json, put_json, ObjectStore, CONTENT_TYPE_ZIP};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Result of [`JobRepo::try_transition`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The record matched the expected status and was overwritten.
    Applied(JobRecord),
    /// The record was found in a different status; nothing was written.
    Rejected { actual: JobStatus },
}

/// Optional device description attached at upload time.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_brand: Option<String>,
    pub device_model: Option<String>,
}

/// Input for [`JobRepo::submit`].
#[derive(Debug, Clone)]
pub struct NewJob {
    pub bus_number: String,
    pub latlong: String,
    /// Zip archive of images.
    pub archive: Vec<u8>,
    pub device: Option<DeviceInfo>,
}

/// Number of job records per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    /// Metadata objects that could not be read or decoded.
    pub unreadable: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }

    fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Processing => self.processing += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Provides typed access to job records.
pub struct JobRepo;

impl JobRepo {
    /// Read one job record.
    pub async fn read(store: &dyn ObjectStore, job_id: &str) -> Result<JobRecord, StoreError> {
        get_json(store, &keys::job_metadata(job_id)).await
    }

    /// Overwrite a job record. Last writer wins.
    pub async fn write(store: &dyn ObjectStore, record: &JobRecord) -> Result<(), StoreError> {
        put_json(store, &keys::job_metadata(&record.job_id), record).await
    }

    /// Read the persisted detection result of a completed job.
    pub async fn read_result(
        store: &dyn ObjectStore,
        job_id: &str,
    ) -> Result<DetectionResult, StoreError> {
        get_json(store, &keys::job_results(job_id)).await
    }

    /// List every `pending` job, in store listing order.
    ///
    /// Reads the metadata of every job in the bucket, so the cost is linear
    /// in the total number of jobs. Records that vanish or fail to decode
    /// between listing and reading are skipped.
    pub async fn list_pending(
        store: &dyn ObjectStore,
    ) -> Result<Vec<(String, JobRecord)>, StoreError> {
        let mut pending = Vec::new();
        for job_id in Self::list_job_ids(store).await? {
            match Self::read(store, &job_id).await {
                Ok(record) if record.status == JobStatus::Pending => {
                    pending.push((job_id, record));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Skipping unreadable job record");
                }
            }
        }
        Ok(pending)
    }

    /// Count job records per status.
    pub async fn status_counts(store: &dyn ObjectStore) -> Result<StatusCounts, StoreError> {
        let mut counts = StatusCounts::default();
        for job_id in Self::list_job_ids(store).await? {
            match Self::read(store, &job_id).await {
                Ok(record) => counts.record(record.status),
                Err(e) => {
                    tracing::debug!(job_id = %job_id, error = %e, "Unreadable job record");
                    counts.unreadable += 1;
                }
            }
        }
        Ok(counts)
    }

    /// Ids of every job that has a metadata object.
    async fn list_job_ids(store: &dyn ObjectStore) -> Result<Vec<String>, StoreError> {
        Ok(store
            .list("")
            .await?
            .iter()
            .filter_map(|key| keys::job_id_from_metadata_key(key))
            .map(str::to_string)
            .collect())
    }

    /// Move a job from `expected` to `next` if it is currently in `expected`.
    ///
    /// `update` runs on the record after the status change and before the
    /// write, to set the owner or result. An edge outside the job state
    /// machine is rejected with [`CoreError::InvalidTransition`] before any
    /// I/O.
    pub async fn try_transition<F>(
        store: &dyn ObjectStore,
        job_id: &str,
        expected: JobStatus,
        next: JobStatus,
        update: F,
    ) -> Result<TransitionOutcome, StoreError>
    where
        F: FnOnce(&mut JobRecord) + Send,
    {
        state_machine::validate_transition(expected, next).map_err(CoreError::InvalidTransition)?;

        let mut record = Self::read(store, job_id).await?;
        if record.status != expected {
            return Ok(TransitionOutcome::Rejected {
                actual: record.status,
            });
        }

        record.transition(next, Utc::now())?;
        update(&mut record);
        Self::write(store, &record).await?;

        Ok(TransitionOutcome::Applied(record))
    }

    /// `processing -> completed`, persisting `results.json` first.
    ///
    /// If the transition is not applied, `results.json` is removed again so
    /// it only ever exists next to a `completed` record. A rejection because
    /// the record is already `completed` leaves it in place.
    pub async fn complete(
        store: &dyn ObjectStore,
        job_id: &str,
        result: &DetectionResult,
    ) -> Result<TransitionOutcome, StoreError> {
        put_json(store, &keys::job_results(job_id), result).await?;

        let detection = result.clone();
        let outcome = Self::try_transition(
            store,
            job_id,
            JobStatus::Processing,
            JobStatus::Completed,
            move |record| record.result = Some(JobResult::Detection(detection)),
        )
        .await;

        match &outcome {
            Ok(TransitionOutcome::Applied(_))
            | Ok(TransitionOutcome::Rejected {
                actual: JobStatus::Completed,
            }) => {}
            Ok(TransitionOutcome::Rejected { .. }) | Err(_) => {
                Self::discard_result(store, job_id).await;
            }
        }
        outcome
    }

    /// Best-effort removal of `results.json`.
    async fn discard_result(store: &dyn ObjectStore, job_id: &str) {
        if let Err(e) = store.delete(&keys::job_results(job_id)).await {
            tracing::warn!(job_id, error = %e, "Failed to remove orphaned result");
        }
    }

    /// `processing -> failed` with an error message.
    pub async fn fail(
        store: &dyn ObjectStore,
        job_id: &str,
        message: &str,
    ) -> Result<TransitionOutcome, StoreError> {
        let message = message.to_string();
        Self::try_transition(
            store,
            job_id,
            JobStatus::Processing,
            JobStatus::Failed,
            move |record| record.result = Some(JobResult::Error { message }),
        )
        .await
    }

    /// `processing -> pending`, releasing ownership so any worker may retry.
    pub async fn requeue(
        store: &dyn ObjectStore,
        job_id: &str,
    ) -> Result<TransitionOutcome, StoreError> {
        Self::try_transition(
            store,
            job_id,
            JobStatus::Processing,
            JobStatus::Pending,
            |record| record.owner_worker_id = None,
        )
        .await
    }

    /// Store an uploaded archive and create its `pending` record.
    ///
    /// The archive is written before the record so a worker never sees a
    /// pending job without a payload.
    pub async fn submit(store: &dyn ObjectStore, input: NewJob) -> Result<JobRecord, StoreError> {
        job::validate_bus_number(&input.bus_number)?;
        let summary = archive::inspect_archive(&input.archive)?;

        let now = Utc::now();
        let job_id = job::generate_job_id(&input.bus_number, now);
        let mut record = JobRecord::new_pending(&job_id, &input.bus_number, &input.latlong, now);

        record
            .extra
            .insert("total_images".into(), summary.images.into());
        record
            .extra
            .insert("zip_size_mb".into(), summary.size_mb().into());
        if let Some(device) = &input.device {
            let value = serde_json::to_value(device).map_err(|source| StoreError::Malformed {
                key: keys::job_metadata(&job_id),
                source,
            })?;
            record.extra.insert("device_info".into(), value);
        }

        store
            .put(&record.payload_key(), input.archive, CONTENT_TYPE_ZIP)
            .await?;
        Self::write(store, &record).await?;

        tracing::info!(
            job_id = %job_id,
            bus_number = %input.bus_number,
            images = summary.images,
            "Job submitted",
        );

        Ok(record)
    }
}
