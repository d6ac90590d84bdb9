//! Object-store access for the bus-alert job queue.
//!
//! [`ObjectStore`] is the only shared mutable resource between workers.
//! [`s3::S3Store`] talks to MinIO or any S3-compatible service;
//! [`memory::MemoryStore`] keeps everything in-process for tests and local
//! runs. Typed access to job, heartbeat, and lease records lives in
//! [`repositories`].

pub mod error;
pub mod memory;
pub mod object_store;
pub mod repositories;
pub mod s3;

pub use error::StoreError;
pub use object_store::ObjectStore;
