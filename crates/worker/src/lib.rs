//! `busalert-worker` library crate.
//!
//! One worker process polls the object store for pending jobs, claims
//! them, takes a GPU concurrency lease, runs detection against the
//! inference backend, and records the outcome. A heartbeat task runs
//! alongside the loop. The binary entrypoint lives in `main.rs`.

pub mod claim;
pub mod config;
pub mod heartbeat;
pub mod lease;
pub mod processor;
pub mod runner;
pub mod shutdown;
pub mod stats;
