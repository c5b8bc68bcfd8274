//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::providers::retry::duration_ms;
use crate::{HuginnError, Result};

/// Rolling window the rate limit counts dispatches in.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Limits for [`TaskQueue`](super::TaskQueue).
///
/// ```rust
/// # use huginn::queue::QueueConfig;
/// # use std::time::Duration;
/// let config = QueueConfig::new()
///     .max_concurrent(4)
///     .retry_attempts(2)
///     .retry_delay(Duration::from_millis(500))
///     .rate_limit_per_minute(120);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Tasks processing at once. Must be ≥ 1. Default: 3.
    pub max_concurrent: usize,
    /// Retries after the first failure; a task runs at most
    /// `retry_attempts + 1` times. Default: 2.
    pub retry_attempts: u32,
    /// Delay before the first retry; doubles per retry. Default: 1s.
    #[serde(with = "duration_ms")]
    pub retry_delay: Duration,
    /// Cap on the retry delay. Default: 30s.
    #[serde(with = "duration_ms")]
    pub max_retry_delay: Duration,
    /// Dispatch starts per rolling minute, retries included. `None` is
    /// unlimited. Default: 60.
    pub rate_limit_per_minute: Option<u32>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            retry_attempts: 2,
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            rate_limit_per_minute: Some(60),
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn retry_attempts(mut self, n: u32) -> Self {
        self.retry_attempts = n;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = delay;
        self
    }

    pub fn rate_limit_per_minute(mut self, n: u32) -> Self {
        self.rate_limit_per_minute = Some(n);
        self
    }

    pub fn unlimited_rate(mut self) -> Self {
        self.rate_limit_per_minute = None;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(HuginnError::Configuration(
                "queue max_concurrent must be at least 1".to_owned(),
            ));
        }
        if self.rate_limit_per_minute == Some(0) {
            return Err(HuginnError::Configuration(
                "queue rate_limit_per_minute must be at least 1 (omit it for no limit)"
                    .to_owned(),
            ));
        }
        Ok(())
    }

    /// Delay before retry number `retry` (1-based):
    /// `retry_delay * 2^(retry-1)`, capped at `max_retry_delay`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.retry_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_retry_delay)
    }
}
