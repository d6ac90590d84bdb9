//! `busalert-monitor` library crate.
//!
//! Read-only view of the worker fleet: heartbeats, GPU lease holders and
//! job status counts, redrawn on a fixed period. Staleness is for display
//! only; the monitor never writes to the store.

pub mod config;
pub mod render;
pub mod view;
