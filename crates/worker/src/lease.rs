//! GPU concurrency leases.
//!
//! Caps how many workers call the inference backend at once. A lease is an
//! existence-only marker under `gpu_locks/`; acquisition is list, write,
//! re-list, and roll back if the re-list shows more than `limit` holders.
//! Leases never expire: a worker that dies holding one leaks the slot until
//! the marker is cleared by hand.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use busalert_store::repositories::LeaseRepo;
use busalert_store::{ObjectStore, StoreError};

pub struct LeaseManager {
    store: Arc<dyn ObjectStore>,
    worker_id: String,
    limit: i64,
    retry_interval: Duration,
}

impl LeaseManager {
    /// `limit <= 0` disables leasing entirely.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        worker_id: impl Into<String>,
        limit: i64,
        retry_interval: Duration,
    ) -> Self {
        Self {
            store,
            worker_id: worker_id.into(),
            limit,
            retry_interval,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    /// One acquisition attempt.
    ///
    /// Returns `Ok(false)` when all slots are taken or the post-write
    /// re-list shows the limit was overrun by a concurrent writer. In the
    /// latter case this worker's marker has already been removed again.
    pub async fn try_acquire(&self) -> Result<bool, StoreError> {
        if !self.is_enabled() {
            return Ok(true);
        }

        let holders = LeaseRepo::holders(self.store.as_ref()).await?;
        if holders.iter().any(|id| id == &self.worker_id) {
            // Left over from an earlier attempt by this same worker.
            tracing::debug!(worker_id = %self.worker_id, "Lease already held");
            return Ok(true);
        }
        if holders.len() as i64 >= self.limit {
            return Ok(false);
        }

        LeaseRepo::create(self.store.as_ref(), &self.worker_id).await?;

        let holders = match LeaseRepo::holders(self.store.as_ref()).await {
            Ok(holders) => holders,
            Err(e) => {
                self.release().await;
                return Err(e);
            }
        };

        if holders.len() as i64 > self.limit {
            tracing::debug!(
                worker_id = %self.worker_id,
                holders = holders.len(),
                limit = self.limit,
                "Lease race detected, backing out",
            );
            self.release().await;
            return Ok(false);
        }

        tracing::debug!(worker_id = %self.worker_id, holders = holders.len(), "Lease acquired");
        Ok(true)
    }

    /// Poll until a lease is acquired or `cancel` fires.
    ///
    /// Returns `false` only when abandoned because of cancellation. Store
    /// errors count as a failed attempt and are retried.
    pub async fn acquire(&self, cancel: &CancellationToken) -> bool {
        let mut attempts: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                return false;
            }

            attempts += 1;
            match self.try_acquire().await {
                Ok(true) => return true,
                Ok(false) => {
                    if attempts == 1 {
                        tracing::info!(
                            worker_id = %self.worker_id,
                            limit = self.limit,
                            "Waiting for a GPU lease",
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(worker_id = %self.worker_id, error = %e, "Lease attempt failed");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }

    /// Best-effort removal of this worker's lease marker. Never fails.
    pub async fn release(&self) {
        if !self.is_enabled() {
            return;
        }
        if let Err(e) = LeaseRepo::remove(self.store.as_ref(), &self.worker_id).await {
            tracing::warn!(worker_id = %self.worker_id, error = %e, "Failed to release lease");
        }
    }
}
