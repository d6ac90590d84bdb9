//! Job record schema and status state machine.
//!
//! One [`JobRecord`] is stored per job at `{job_id}/metadata.json`. The
//! ingestion side writes extra descriptive fields (image counts, device
//! info, ...) that the coordination layer does not interpret; they are kept
//! in [`JobRecord::extra`] so a full overwrite never drops them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::detection::DetectionResult;
use crate::error::CoreError;
use crate::keys;
use crate::types::{Timestamp, WorkerId};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a job, serialized in lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    /// Wire name stored in `metadata.json`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Completed and failed jobs never change status again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

pub mod state_machine {
    use super::JobStatus;

    /// Returns the statuses reachable from `from`.
    ///
    /// `Processing -> Pending` is the recovery edge used when the inference
    /// backend reports overload.
    pub fn valid_transitions(from: JobStatus) -> &'static [JobStatus] {
        match from {
            JobStatus::Pending => &[JobStatus::Processing],
            JobStatus::Processing => &[
                JobStatus::Completed,
                JobStatus::Failed,
                JobStatus::Pending,
            ],
            JobStatus::Completed | JobStatus::Failed => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a state transition, returning an error message for invalid ones.
    pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<(), String> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(format!("Invalid transition: {from} -> {to}"))
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Outcome persisted on a job once it reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobResult {
    Detection(DetectionResult),
    Error { message: String },
}

impl JobResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Error text for failed jobs, `None` for detections.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { message } => Some(message),
            Self::Detection(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Contents of `{job_id}/metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_worker_id: Option<WorkerId>,
    /// Key of the input archive. Older records omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_ref: Option<String>,
    pub bus_number: String,
    pub latlong: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    /// Fields owned by other producers, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JobRecord {
    /// Build a fresh `pending` record as written at ingestion time.
    pub fn new_pending(
        job_id: impl Into<String>,
        bus_number: impl Into<String>,
        latlong: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        let job_id = job_id.into();
        let payload_ref = keys::job_payload(&job_id);
        Self {
            job_id,
            status: JobStatus::Pending,
            owner_worker_id: None,
            payload_ref: Some(payload_ref),
            bus_number: bus_number.into(),
            latlong: latlong.into(),
            created_at: Some(now),
            updated_at: Some(now),
            result: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Key of the input archive, falling back to the default layout.
    pub fn payload_key(&self) -> String {
        self.payload_ref
            .clone()
            .unwrap_or_else(|| keys::job_payload(&self.job_id))
    }

    /// Move the record to `next`, stamping `updated_at`.
    ///
    /// Non-terminal targets drop any previous result so a requeued job does
    /// not carry a stale outcome.
    pub fn transition(&mut self, next: JobStatus, now: Timestamp) -> Result<(), CoreError> {
        state_machine::validate_transition(self.status, next)
            .map_err(CoreError::InvalidTransition)?;
        self.status = next;
        self.updated_at = Some(now);
        if !next.is_terminal() {
            self.result = None;
        }
        Ok(())
    }
}

/// Generate a job id of the form `job_{bus_number}_{YYYYmmdd_HHMMSS}_{8 hex}`.
///
/// The random suffix keeps two uploads for the same bus within one second
/// from colliding.
pub fn generate_job_id(bus_number: &str, now: Timestamp) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "job_{}_{}_{}",
        bus_number,
        now.format("%Y%m%d_%H%M%S"),
        &suffix[..8]
    )
}

/// Validate a bus identifier supplied at ingestion.
///
/// It becomes part of the job id, and therefore of object keys, so `/` and
/// whitespace are rejected.
pub fn validate_bus_number(bus_number: &str) -> Result<(), CoreError> {
    if bus_number.is_empty() {
        return Err(CoreError::Validation(
            "Bus number must not be empty".to_string(),
        ));
    }
    if !bus_number
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::Validation(format!(
            "Bus number '{bus_number}' may only contain alphanumeric, hyphen, or underscore characters"
        )));
    }
    Ok(())
}
