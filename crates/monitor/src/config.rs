use std::time::Duration;

use busalert_store::s3::StoreConfig;

/// Error raised when an environment variable holds an unusable value.
#[derive(Debug, thiserror::Error)]
#[error("{var} must be {expected}, got '{value}'")]
pub struct ConfigError {
    pub var: &'static str,
    pub expected: &'static str,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub store: StoreConfig,
    /// Time between redraws.
    pub refresh: Duration,
    /// Whether to scan every job record for the status summary.
    pub job_counts: bool,
}

impl MonitorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// Object-store variables are read by [`StoreConfig::from_lookup`].
    ///
    /// | Env Var                | Default       |
    /// |------------------------|---------------|
    /// | `MONITOR_REFRESH_SECS` | `2`           |
    /// | `MONITOR_JOB_COUNTS`   | `true`        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let refresh_raw = lookup("MONITOR_REFRESH_SECS").unwrap_or_else(|| "2".into());
        let refresh_secs: u64 = match refresh_raw.trim().parse() {
            Ok(secs) if secs > 0 => secs,
            _ => {
                return Err(ConfigError {
                    var: "MONITOR_REFRESH_SECS",
                    expected: "a positive whole number of seconds",
                    value: refresh_raw,
                })
            }
        };

        let job_counts = !matches!(
            lookup("MONITOR_JOB_COUNTS")
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
                .as_str(),
            "false" | "0" | "no"
        );

        Ok(Self {
            store: StoreConfig::from_lookup(&lookup),
            refresh: Duration::from_secs(refresh_secs),
            job_counts,
        })
    }
}
