//! Integration tests for GPU concurrency leases.

mod common;

use std::sync::Arc;
use std::time::Duration;

use busalert_store::memory::MemoryStore;
use busalert_store::repositories::LeaseRepo;
use busalert_store::ObjectStore;
use busalert_worker::lease::LeaseManager;

use common::RacingStore;

fn manager(store: Arc<dyn ObjectStore>, worker_id: &str, limit: i64) -> LeaseManager {
    LeaseManager::new(store, worker_id, limit, Duration::from_millis(5))
}

// ---------------------------------------------------------------------------
// Test: limit holds under serialized attempts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn holders_never_exceed_limit() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let limit = 3;

    let managers: Vec<_> = (0..8)
        .map(|i| manager(store.clone(), &format!("w{i}"), limit))
        .collect();

    let mut acquired = 0;
    for m in &managers {
        if m.try_acquire().await.unwrap() {
            acquired += 1;
        }
        let holders = LeaseRepo::holders(store.as_ref()).await.unwrap();
        assert!(holders.len() as i64 <= limit);
    }
    assert_eq!(acquired, limit);

    managers[0].release().await;
    assert!(managers[7].try_acquire().await.unwrap());
    assert_eq!(LeaseRepo::holders(store.as_ref()).await.unwrap().len() as i64, limit);
}

// ---------------------------------------------------------------------------
// Test: re-list rejects the holder that overran the limit
// ---------------------------------------------------------------------------

/// Another worker writes its lease between our listing and our re-list. The
/// re-list sees `limit + 1` holders, so we back out and leave the others.
#[tokio::test]
async fn relist_rejects_racing_holder() {
    let inner = MemoryStore::new();
    LeaseRepo::create(&inner, "a").await.unwrap();
    let store: Arc<RacingStore> = Arc::new(RacingStore::new(inner, "intruder"));

    let b = manager(store.clone(), "b", 2);
    assert!(!b.try_acquire().await.unwrap());

    let holders = LeaseRepo::holders(&store.inner).await.unwrap();
    assert_eq!(holders, vec!["a", "intruder"]);
}

// ---------------------------------------------------------------------------
// Test: release semantics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn release_twice_or_without_lease_is_fine() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let m = manager(store.clone(), "w1", 1);

    m.release().await;
    assert!(m.try_acquire().await.unwrap());
    m.release().await;
    m.release().await;

    assert!(LeaseRepo::holders(store.as_ref()).await.unwrap().is_empty());
}

#[tokio::test]
async fn disabled_leasing_writes_nothing() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let m = manager(store.clone(), "w1", 0);

    assert!(m.try_acquire().await.unwrap());
    assert!(m.acquire(&Default::default()).await);
    assert!(LeaseRepo::holders(store.as_ref()).await.unwrap().is_empty());
}
