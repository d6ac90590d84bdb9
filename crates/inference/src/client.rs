//! REST client for the inference backend.
//!
//! Wraps `POST /bus-alert` (multipart upload of the job archive plus form
//! parameters) and `GET /health` using [`reqwest`]. The backend sits behind
//! a proxy that caps GPU concurrency and answers `503` (or `429`) when the
//! cap is hit; those responses surface as [`InferenceError::Overloaded`] so
//! callers can requeue instead of failing the job.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use busalert_core::detection::DetectionResult;

/// HTTP statuses that mean "try again later".
const OVERLOAD_STATUSES: [u16; 2] = [503, 429];

/// Parameters sent alongside the archive.
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    pub bus_number: String,
    pub latlong: String,
    pub confidence_threshold: f64,
}

/// Errors from the inference backend.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend is at capacity; the job should be retried later.
    #[error("Inference backend overloaded (HTTP {status})")]
    Overloaded { status: u16 },

    /// No response within the allotted time.
    #[error("Inference request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The backend returned a non-2xx status other than overload.
    #[error("Inference API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose body is not a detection result.
    #[error("Invalid inference response: {0}")]
    InvalidResponse(#[source] serde_json::Error),
}

impl InferenceError {
    pub fn is_overloaded(&self) -> bool {
        matches!(self, Self::Overloaded { .. })
    }
}

/// Anything that can run detection on a job archive.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn detect(
        &self,
        archive: Vec<u8>,
        request: &DetectionRequest,
    ) -> Result<DetectionResult, InferenceError>;
}

/// HTTP client for a single inference endpoint.
pub struct InferenceApi {
    client: reqwest::Client,
    api_url: String,
}

impl InferenceApi {
    /// Create a new client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8000`.
    ///
    /// No overall request timeout is configured here; callers bound each
    /// call themselves.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Probe `GET /health`.
    pub async fn health(&self) -> Result<(), InferenceError> {
        let response = self
            .client
            .get(format!("{}/health", self.api_url))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        check_status(status, body)
    }
}

#[async_trait]
impl InferenceBackend for InferenceApi {
    async fn detect(
        &self,
        archive: Vec<u8>,
        request: &DetectionRequest,
    ) -> Result<DetectionResult, InferenceError> {
        let file = Part::bytes(archive)
            .file_name("images.zip")
            .mime_str("application/zip")?;

        let form = Form::new()
            .part("file", file)
            .text("bus_number", request.bus_number.clone())
            .text("latlong", request.latlong.clone())
            .text(
                "confidence_threshold",
                request.confidence_threshold.to_string(),
            );

        tracing::debug!(
            url = %self.api_url,
            bus_number = %request.bus_number,
            "Posting archive to inference backend",
        );

        let response = self
            .client
            .post(format!("{}/bus-alert", self.api_url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        check_status(status, body.clone())?;
        parse_detection(&body)
    }
}

/// Map a response status to success, overload, or an API error.
pub fn check_status(status: u16, body: String) -> Result<(), InferenceError> {
    if (200..300).contains(&status) {
        Ok(())
    } else if OVERLOAD_STATUSES.contains(&status) {
        Err(InferenceError::Overloaded { status })
    } else {
        Err(InferenceError::ApiError { status, body })
    }
}

/// Decode a successful response body.
pub fn parse_detection(body: &str) -> Result<DetectionResult, InferenceError> {
    serde_json::from_str(body).map_err(InferenceError::InvalidResponse)
}
