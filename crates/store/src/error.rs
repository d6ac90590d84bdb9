use busalert_core::error::CoreError;

/// Errors surfaced by the object store and the repositories built on it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No object exists under the key.
    #[error("Object not found: {key}")]
    NotFound { key: String },

    /// The store request itself failed (network, credentials, bucket, ...).
    #[error("Object store request failed: {0}")]
    Request(String),

    /// An object exists but its JSON body could not be decoded or encoded.
    #[error("Malformed object {key}: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A domain rule rejected the operation before any write.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
