//! Shared domain types for the bus-alert job queue.
//!
//! Pure data and rules only: the job record and its state machine, the
//! heartbeat record and staleness rule, the object-store key layout, and
//! payload archive inspection. Nothing here performs I/O.

pub mod archive;
pub mod detection;
pub mod error;
pub mod heartbeat;
pub mod job;
pub mod keys;
pub mod types;
