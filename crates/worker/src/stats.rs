//! Per-worker advisory counters.
//!
//! Owned by the job loop. The heartbeat task only ever sees immutable
//! [`WorkerSnapshot`]s derived from these counters.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::Utc;

use busalert_core::heartbeat::{WorkerActivity, WorkerSnapshot};
use busalert_core::types::Timestamp;

use crate::processor::ProcessOutcome;

#[derive(Debug, Clone)]
pub struct WorkerStats {
    started_at: Timestamp,
    started: Instant,
    processed: u64,
    failed: u64,
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            processed: 0,
            failed: 0,
        }
    }

    /// Count one processing attempt.
    ///
    /// Overload requeues count as failures of the attempt. Abandoned jobs
    /// (shutdown while waiting for a lease) are not counted.
    pub fn record(&mut self, outcome: &ProcessOutcome) {
        match outcome {
            ProcessOutcome::Completed(_) => self.processed += 1,
            ProcessOutcome::Requeued | ProcessOutcome::Failed(_) => self.failed += 1,
            ProcessOutcome::Abandoned => {}
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Immutable view for the heartbeat task.
    pub fn snapshot(&self, activity: WorkerActivity, current_job_id: Option<&str>) -> WorkerSnapshot {
        WorkerSnapshot {
            activity,
            current_job_id: current_job_id.map(str::to_string),
            processed: self.processed,
            failed: self.failed,
        }
    }

    /// Final figures reported on shutdown.
    pub fn report(&self) -> StatsReport {
        StatsReport {
            processed: self.processed,
            failed: self.failed,
            uptime: self.uptime(),
        }
    }
}

/// Summary printed once when the worker exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsReport {
    pub processed: u64,
    pub failed: u64,
    pub uptime: Duration,
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.uptime.as_secs();
        write!(
            f,
            "uptime {secs}s ({:.1}min), processed {}, failed {}",
            secs as f64 / 60.0,
            self.processed,
            self.failed,
        )
    }
}
