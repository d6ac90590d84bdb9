//! Exponential backoff after the inference backend reports overload.
//!
//! Each consecutive overload doubles the pause before the worker goes back
//! to polling, up to a cap. Any other outcome resets the schedule.

use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Pause after the first overload.
    pub initial_delay: Duration,
    /// Upper bound on the pause.
    pub max_delay: Duration,
    /// Factor by which the pause grows after each consecutive overload.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`BackoffConfig::max_delay`].
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Stateful backoff schedule.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            current: None,
        }
    }

    /// Delay to wait now; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.config.initial_delay.min(self.config.max_delay),
            Some(current) => next_delay(current, &self.config),
        };
        self.current = Some(delay);
        delay
    }

    /// Return to the initial delay.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Whether the schedule has advanced since the last reset.
    pub fn is_backing_off(&self) -> bool {
        self.current.is_some()
    }
}
