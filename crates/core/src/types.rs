/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier of a worker process (`WORKER_ID` or a generated `worker-<uuid>`).
pub type WorkerId = String;
