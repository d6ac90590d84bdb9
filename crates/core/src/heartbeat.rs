//! Worker heartbeat records and staleness classification.
//!
//! Each worker overwrites `workers/{worker_id}.json` on a fixed period.
//! Readers infer liveness from the age of `last_seen`; records are never
//! deleted, and a stale worker triggers no automatic remediation.

use serde::{Deserialize, Serialize};

use crate::types::{Timestamp, WorkerId};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// How often a worker rewrites its heartbeat record.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 10;

/// A heartbeat older than this many seconds is considered stale.
pub const STALE_THRESHOLD_SECS: i64 = 30;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Advisory activity reported by a worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerActivity {
    #[default]
    Idle,
    Processing,
}

impl WorkerActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
        }
    }
}

/// Contents of `workers/{worker_id}.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub worker_id: WorkerId,
    pub status: WorkerActivity,
    #[serde(default)]
    pub current_job_id: Option<String>,
    pub last_seen: Timestamp,
    #[serde(default)]
    pub processed: u64,
    #[serde(default)]
    pub failed: u64,
}

/// Point-in-time view of a worker, published by the job loop and read by
/// the heartbeat task. Each publication replaces the previous snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub activity: WorkerActivity,
    pub current_job_id: Option<String>,
    pub processed: u64,
    pub failed: u64,
}

impl WorkerSnapshot {
    /// Render the snapshot as a heartbeat record stamped at `now`.
    pub fn to_record(&self, worker_id: &str, now: Timestamp) -> HeartbeatRecord {
        HeartbeatRecord {
            worker_id: worker_id.to_string(),
            status: self.activity,
            current_job_id: self.current_job_id.clone(),
            last_seen: now,
            processed: self.processed,
            failed: self.failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Staleness
// ---------------------------------------------------------------------------

/// Liveness verdict for display purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Fresh,
    Stale,
}

/// Classify a heartbeat by the age of `last_seen` relative to `now`.
///
/// Stale only when the age strictly exceeds `threshold_secs`. A `last_seen`
/// in the future (clock skew between hosts) counts as fresh.
pub fn classify(last_seen: Timestamp, now: Timestamp, threshold_secs: i64) -> Liveness {
    if now - last_seen > chrono::Duration::seconds(threshold_secs) {
        Liveness::Stale
    } else {
        Liveness::Fresh
    }
}

impl HeartbeatRecord {
    /// Seconds since the record was written, clamped at zero.
    pub fn age_secs(&self, now: Timestamp) -> i64 {
        (now - self.last_seen).num_seconds().max(0)
    }

    pub fn liveness(&self, now: Timestamp) -> Liveness {
        classify(self.last_seen, now, STALE_THRESHOLD_SECS)
    }
}
