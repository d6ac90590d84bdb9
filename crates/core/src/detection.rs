//! Structured outcome returned by the inference backend.

use serde::{Deserialize, Serialize};

/// Successful response body of `POST /bus-alert`.
///
/// `details` is opaque to the coordination layer and is persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub matches_found: u32,
    pub alert: bool,
    pub confidence: f64,
    #[serde(default)]
    pub details: Vec<serde_json::Value>,
}
