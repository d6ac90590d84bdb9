//! The object-store seam.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

/// Content type used for every JSON record.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Content type of job payload archives.
pub const CONTENT_TYPE_ZIP: &str = "application/zip";

/// Minimal key/value blob store.
///
/// No compare-and-swap and no multi-key transactions: every coordination
/// protocol built on top must tolerate interleaved read-then-write races.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create or overwrite the object at `key`.
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StoreError>;

    /// Fetch the object at `key`, or [`StoreError::NotFound`].
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// All keys starting with `prefix`, recursively, in store order.
    ///
    /// Each call performs a fresh listing; there is no continuation across
    /// calls.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Remove the object at `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Read `key` and decode it as JSON.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    key: &str,
) -> Result<T, StoreError> {
    let bytes = store.get(key).await?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Malformed {
        key: key.to_string(),
        source,
    })
}

/// Encode `value` as pretty JSON and write it to `key`.
pub async fn put_json<T: Serialize + ?Sized>(
    store: &dyn ObjectStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let body = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Malformed {
        key: key.to_string(),
        source,
    })?;
    store.put(key, body, CONTENT_TYPE_JSON).await
}
