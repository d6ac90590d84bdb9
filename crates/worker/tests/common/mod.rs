//! Shared fixtures for worker integration tests.
//!
//! Provides a scripted inference backend, payload builders, and object
//! store wrappers that force specific interleavings.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Barrier;

use busalert_core::detection::DetectionResult;
use busalert_core::job::JobRecord;
use busalert_inference::{DetectionRequest, InferenceBackend, InferenceError};
use busalert_store::memory::MemoryStore;
use busalert_store::repositories::job_repo::NewJob;
use busalert_store::repositories::JobRepo;
use busalert_store::{ObjectStore, StoreError};
use busalert_worker::lease::LeaseManager;
use busalert_worker::processor::{JobProcessor, ProcessorSettings};

// ---------------------------------------------------------------------------
// Payloads and jobs
// ---------------------------------------------------------------------------

pub fn sample_zip() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for name in ["front.jpg", "side.png"] {
        writer
            .start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"dummy image data").unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn detection(matches_found: u32, alert: bool) -> DetectionResult {
    DetectionResult {
        matches_found,
        alert,
        confidence: 0.91,
        details: vec![],
    }
}

/// Submit a job the way the ingestion endpoint does.
pub async fn submit(store: &dyn ObjectStore, bus_number: &str) -> JobRecord {
    JobRepo::submit(
        store,
        NewJob {
            bus_number: bus_number.into(),
            latlong: "28.61,77.20".into(),
            archive: sample_zip(),
            device: None,
        },
    )
    .await
    .unwrap()
}

// ---------------------------------------------------------------------------
// Scripted inference backend
// ---------------------------------------------------------------------------

/// One scripted backend reaction.
#[derive(Debug, Clone)]
pub enum Reply {
    Success(DetectionResult),
    Overloaded,
    ServerError(String),
    /// Sleep, then succeed.
    Slow(Duration, DetectionResult),
    Panic,
}

/// Backend that answers from a script; once the script runs out it keeps
/// repeating the last reply.
pub struct MockBackend {
    script: Mutex<VecDeque<Reply>>,
    last: Mutex<Option<Reply>>,
    calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(replies.into_iter().collect()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Reply {
        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = script.pop_front() {
            *last = Some(reply.clone());
            reply
        } else {
            last.clone()
                .unwrap_or_else(|| Reply::ServerError("script exhausted".into()))
        }
    }
}

#[async_trait]
impl InferenceBackend for MockBackend {
    async fn detect(
        &self,
        archive: Vec<u8>,
        _request: &DetectionRequest,
    ) -> Result<DetectionResult, InferenceError> {
        assert!(!archive.is_empty(), "backend received an empty payload");
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.next_reply() {
            Reply::Success(result) => Ok(result),
            Reply::Overloaded => Err(InferenceError::Overloaded { status: 503 }),
            Reply::ServerError(body) => Err(InferenceError::ApiError { status: 500, body }),
            Reply::Slow(delay, result) => {
                tokio::time::sleep(delay).await;
                Ok(result)
            }
            Reply::Panic => panic!("model crashed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn processor(
    store: Arc<dyn ObjectStore>,
    backend: Arc<MockBackend>,
    worker_id: &str,
    lease_limit: i64,
    request_timeout: Duration,
) -> JobProcessor {
    let leases = LeaseManager::new(
        store.clone(),
        worker_id,
        lease_limit,
        Duration::from_millis(10),
    );
    JobProcessor::new(
        store,
        backend,
        leases,
        ProcessorSettings {
            request_timeout,
            confidence_threshold: 0.75,
        },
    )
}

// ---------------------------------------------------------------------------
// Interleaving stores
// ---------------------------------------------------------------------------

/// Holds the first `parties` reads of job metadata at a barrier so that
/// concurrent claimers all read before any of them writes.
pub struct BarrierStore {
    inner: MemoryStore,
    barrier: Barrier,
    remaining: AtomicUsize,
}

impl BarrierStore {
    pub fn new(inner: MemoryStore, parties: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(parties),
            remaining: AtomicUsize::new(parties),
        }
    }
}

#[async_trait]
impl ObjectStore for BarrierStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        self.inner.put(key, body, content_type).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let body = self.inner.get(key).await;
        if key.ends_with("/metadata.json")
            && self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            self.barrier.wait().await;
        }
        body
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list(prefix).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}

/// Writes a lease for `intruder` right after the first lease write by
/// anyone else, as if another worker acquired between our list and
/// re-list.
pub struct RacingStore {
    pub inner: MemoryStore,
    intruder: String,
    fired: AtomicUsize,
}

impl RacingStore {
    pub fn new(inner: MemoryStore, intruder: &str) -> Self {
        Self {
            inner,
            intruder: intruder.into(),
            fired: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ObjectStore for RacingStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        self.inner.put(key, body, content_type).await?;
        if key.starts_with("gpu_locks/") && self.fired.fetch_add(1, Ordering::SeqCst) == 0 {
            let intruder_key = format!("gpu_locks/{}.lock", self.intruder);
            self.inner
                .put(&intruder_key, b"locked".to_vec(), "text/plain")
                .await?;
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.get(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list(prefix).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}

// ---------------------------------------------------------------------------
// Failing store
// ---------------------------------------------------------------------------

/// Store operation a [`FlakyStore`] rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Put,
    Get,
    List,
    Delete,
}

#[derive(Debug)]
struct FailureRule {
    op: Op,
    /// Matches keys (or list prefixes) containing this text.
    pattern: String,
    /// Matching calls let through before failures start.
    skip: usize,
    /// Matching calls that fail once `skip` is used up.
    remaining: usize,
}

/// Passes everything to a [`MemoryStore`] except calls matched by an armed
/// rule, which fail with [`StoreError::Request`].
pub struct FlakyStore {
    pub inner: MemoryStore,
    rules: Mutex<Vec<FailureRule>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            rules: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `times` calls of `op` whose key contains `pattern`.
    pub fn fail_next(&self, op: Op, pattern: &str, times: usize) {
        self.fail_after(op, pattern, 0, times);
    }

    /// Let `skip` matching calls through, then fail the next `times`.
    pub fn fail_after(&self, op: Op, pattern: &str, skip: usize, times: usize) {
        self.rules.lock().unwrap().push(FailureRule {
            op,
            pattern: pattern.into(),
            skip,
            remaining: times,
        });
    }

    fn check(&self, op: Op, key: &str) -> Result<(), StoreError> {
        let mut rules = self.rules.lock().unwrap();
        let Some(rule) = rules
            .iter_mut()
            .find(|r| r.op == op && r.remaining > 0 && key.contains(r.pattern.as_str()))
        else {
            return Ok(());
        };

        if rule.skip > 0 {
            rule.skip -= 1;
            return Ok(());
        }
        rule.remaining -= 1;
        Err(StoreError::Request(format!("injected {op:?} failure on {key}")))
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        self.check(Op::Put, key)?;
        self.inner.put(key, body, content_type).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.check(Op::Get, key)?;
        self.inner.get(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.check(Op::List, prefix)?;
        self.inner.list(prefix).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check(Op::Delete, key)?;
        self.inner.delete(key).await
    }
}
