//! Object-store key layout.
//!
//! ```text
//! {job_id}/metadata.json      job record
//! {job_id}/images.zip         input archive
//! {job_id}/results.json       detection result (completed jobs only)
//! workers/{worker_id}.json    heartbeat
//! gpu_locks/{worker_id}.lock  concurrency lease marker
//! ```

/// Prefix holding heartbeat records.
pub const WORKERS_PREFIX: &str = "workers/";

/// Prefix holding lease markers.
pub const LEASES_PREFIX: &str = "gpu_locks/";

/// Prefixes that never contain jobs.
pub const RESERVED_PREFIXES: &[&str] = &[WORKERS_PREFIX, LEASES_PREFIX];

const METADATA_FILE: &str = "metadata.json";
const PAYLOAD_FILE: &str = "images.zip";
const RESULTS_FILE: &str = "results.json";
const HEARTBEAT_EXT: &str = ".json";
const LEASE_EXT: &str = ".lock";

pub fn job_metadata(job_id: &str) -> String {
    format!("{job_id}/{METADATA_FILE}")
}

pub fn job_payload(job_id: &str) -> String {
    format!("{job_id}/{PAYLOAD_FILE}")
}

pub fn job_results(job_id: &str) -> String {
    format!("{job_id}/{RESULTS_FILE}")
}

pub fn heartbeat(worker_id: &str) -> String {
    format!("{WORKERS_PREFIX}{worker_id}{HEARTBEAT_EXT}")
}

pub fn lease(worker_id: &str) -> String {
    format!("{LEASES_PREFIX}{worker_id}{LEASE_EXT}")
}

/// True when `key` lives under a prefix reserved for coordination records.
pub fn is_reserved(key: &str) -> bool {
    RESERVED_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Extract the job id from a `{job_id}/metadata.json` key.
///
/// Returns `None` for reserved keys, payloads, results, and anything
/// nested deeper than one level.
pub fn job_id_from_metadata_key(key: &str) -> Option<&str> {
    if is_reserved(key) {
        return None;
    }
    let job_id = key.strip_suffix(METADATA_FILE)?.strip_suffix('/')?;
    if job_id.is_empty() || job_id.contains('/') {
        return None;
    }
    Some(job_id)
}

/// Extract the worker id from a `gpu_locks/{worker_id}.lock` key.
pub fn worker_id_from_lease_key(key: &str) -> Option<&str> {
    key.strip_prefix(LEASES_PREFIX)?
        .strip_suffix(LEASE_EXT)
        .filter(|id| !id.is_empty())
}
