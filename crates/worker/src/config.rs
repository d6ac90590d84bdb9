use std::str::FromStr;
use std::time::Duration;

use busalert_core::heartbeat::DEFAULT_HEARTBEAT_INTERVAL_SECS;
use busalert_inference::backoff::BackoffConfig;
use busalert_store::s3::StoreConfig;

use crate::processor::ProcessorSettings;
use crate::runner::LoopSettings;

/// Error raised when an environment variable holds an unusable value.
#[derive(Debug, thiserror::Error)]
#[error("{var} must be {expected}, got '{value}'")]
pub struct ConfigError {
    pub var: &'static str,
    pub expected: &'static str,
    pub value: String,
}

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local MinIO + mock backend.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identity used for the heartbeat and lease keys.
    pub worker_id: String,
    pub store: StoreConfig,
    /// Base URL of the inference backend.
    pub inference_url: String,
    /// Pause between polls when no job could be claimed.
    pub poll_interval: Duration,
    /// Maximum concurrent lease holders; `<= 0` disables leasing.
    pub lease_limit: i64,
    /// Pause between lease acquisition attempts.
    pub lease_retry_interval: Duration,
    pub heartbeat_interval: Duration,
    /// Upper bound on a single inference call.
    pub request_timeout: Duration,
    pub confidence_threshold: f64,
    /// Pause schedule after the backend reports overload.
    pub backoff: BackoffConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// Object-store variables are read by [`StoreConfig::from_lookup`].
    ///
    /// | Env Var                   | Default                  |
    /// |---------------------------|--------------------------|
    /// | `WORKER_ID`               | `worker-<uuid v4>`       |
    /// | `CONTAINER_API`           | `http://localhost:8000`  |
    /// | `POLL_INTERVAL`           | `5` (seconds)            |
    /// | `GPU_CONCURRENCY_LIMIT`   | `2`                      |
    /// | `LEASE_RETRY_INTERVAL_MS` | `1000`                   |
    /// | `HEARTBEAT_INTERVAL`      | `10` (seconds)           |
    /// | `REQUEST_TIMEOUT`         | `300` (seconds)          |
    /// | `CONFIDENCE_THRESHOLD`    | `0.75`                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading variables through
    /// `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let worker_id = lookup("WORKER_ID")
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("worker-{}", uuid::Uuid::new_v4()));

        let store = StoreConfig::from_lookup(&lookup);

        let poll_secs: u64 = parse(&lookup, "POLL_INTERVAL", "5", "a whole number of seconds")?;
        let lease_limit: i64 = parse(&lookup, "GPU_CONCURRENCY_LIMIT", "2", "an integer")?;
        let lease_retry_ms: u64 =
            parse(&lookup, "LEASE_RETRY_INTERVAL_MS", "1000", "a whole number of milliseconds")?;
        let heartbeat_secs: u64 = parse(
            &lookup,
            "HEARTBEAT_INTERVAL",
            &DEFAULT_HEARTBEAT_INTERVAL_SECS.to_string(),
            "a whole number of seconds",
        )?;
        let timeout_secs: u64 =
            parse(&lookup, "REQUEST_TIMEOUT", "300", "a whole number of seconds")?;
        let confidence_threshold: f64 =
            parse(&lookup, "CONFIDENCE_THRESHOLD", "0.75", "a number")?;

        for (var, value) in [
            ("POLL_INTERVAL", poll_secs),
            ("LEASE_RETRY_INTERVAL_MS", lease_retry_ms),
            ("HEARTBEAT_INTERVAL", heartbeat_secs),
        ] {
            if value == 0 {
                return Err(ConfigError {
                    var,
                    expected: "greater than zero",
                    value: value.to_string(),
                });
            }
        }
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(ConfigError {
                var: "CONFIDENCE_THRESHOLD",
                expected: "between 0 and 1",
                value: confidence_threshold.to_string(),
            });
        }

        Ok(Self {
            worker_id,
            store,
            inference_url: var("CONTAINER_API", "http://localhost:8000"),
            poll_interval: Duration::from_secs(poll_secs),
            lease_limit,
            lease_retry_interval: Duration::from_millis(lease_retry_ms),
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            request_timeout: Duration::from_secs(timeout_secs),
            confidence_threshold,
            backoff: BackoffConfig::default(),
        })
    }

    pub fn processor_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            request_timeout: self.request_timeout,
            confidence_threshold: self.confidence_threshold,
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            worker_id: self.worker_id.clone(),
            poll_interval: self.poll_interval,
            backoff: self.backoff.clone(),
        }
    }
}

fn parse<T, F>(
    lookup: &F,
    var: &'static str,
    default: &str,
    expected: &'static str,
) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(var).unwrap_or_else(|| default.to_string());
    value.trim().parse().map_err(|_| ConfigError {
        var,
        expected,
        value,
    })
}
