//! Repository for concurrency lease markers (`gpu_locks/{worker_id}.lock`).
//!
//! A lease is existence-only: the body is a fixed marker and carries no
//! owner data or expiry.

use busalert_core::keys;

use crate::error::StoreError;
use crate::object_store::ObjectStore;

/// Fixed body written to every lease key.
const LEASE_MARKER: &[u8] = b"locked";

const CONTENT_TYPE_TEXT: &str = "text/plain";

pub struct LeaseRepo;

impl LeaseRepo {
    /// Worker ids of every current lease holder, in listing order.
    pub async fn holders(store: &dyn ObjectStore) -> Result<Vec<String>, StoreError> {
        Ok(store
            .list(keys::LEASES_PREFIX)
            .await?
            .iter()
            .filter_map(|key| keys::worker_id_from_lease_key(key))
            .map(str::to_string)
            .collect())
    }

    /// Write the lease marker for `worker_id`.
    pub async fn create(store: &dyn ObjectStore, worker_id: &str) -> Result<(), StoreError> {
        store
            .put(&keys::lease(worker_id), LEASE_MARKER.to_vec(), CONTENT_TYPE_TEXT)
            .await
    }

    /// Delete the lease marker for `worker_id`. Missing markers are fine.
    pub async fn remove(store: &dyn ObjectStore, worker_id: &str) -> Result<(), StoreError> {
        store.delete(&keys::lease(worker_id)).await
    }
}
