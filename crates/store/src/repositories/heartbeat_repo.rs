//! Repository for worker heartbeats (`workers/{worker_id}.json`).

use busalert_core::heartbeat::HeartbeatRecord;
use busalert_core::keys;

use crate::error::StoreError;
use crate::object_store::{get_json, put_json, ObjectStore};

pub struct HeartbeatRepo;

impl HeartbeatRepo {
    /// Overwrite the heartbeat of `record.worker_id`.
    pub async fn publish(
        store: &dyn ObjectStore,
        record: &HeartbeatRecord,
    ) -> Result<(), StoreError> {
        put_json(store, &keys::heartbeat(&record.worker_id), record).await
    }

    pub async fn read(
        store: &dyn ObjectStore,
        worker_id: &str,
    ) -> Result<HeartbeatRecord, StoreError> {
        get_json(store, &keys::heartbeat(worker_id)).await
    }

    /// Every readable heartbeat. Unreadable records are skipped.
    pub async fn list(store: &dyn ObjectStore) -> Result<Vec<HeartbeatRecord>, StoreError> {
        let mut records = Vec::new();
        for key in store.list(keys::WORKERS_PREFIX).await? {
            match get_json::<HeartbeatRecord>(store, &key).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "Skipping unreadable heartbeat");
                }
            }
        }
        Ok(records)
    }
}
