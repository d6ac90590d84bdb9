//! Client for the external bus-alert inference backend.
//!
//! Provides the [`InferenceBackend`] seam, its HTTP implementation
//! [`InferenceApi`], and the backoff schedule workers follow after the
//! backend reports overload.

pub mod backoff;
pub mod client;

pub use client::{DetectionRequest, InferenceApi, InferenceBackend, InferenceError};
