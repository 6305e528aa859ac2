//! Retry policy: error classification and exponential backoff.

use crate::error::{ServiceError, ServiceErrorKind};
use crate::rng::SeededStream;
use crate::types::ContentKey;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fraction of the delay jitter may add or remove.
const JITTER_SPREAD: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Retryable,
    Terminal,
}

/// Retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the first attempt; a job makes at most `max_retries + 1` calls.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Spread delays by ±20%.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.base_delay_ms > self.max_delay_ms {
            return Err(format!(
                "base_delay_ms ({}) cannot exceed max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, config: &RetryConfig) -> Self {
        Self {
            max_retries,
            base: Duration::from_millis(config.base_delay_ms),
            max: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Calls a job may make in total.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn classify(&self, error: &ServiceError) -> Classification {
        classify(error)
    }

    /// Whether a job that has made `attempts` calls may make another.
    pub fn can_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts()
    }

    /// Delay before the retry following attempt `attempt` (1-based):
    /// `base * 2^(attempt-1)`, capped at the maximum.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let factor = 1u64 << exponent;
        let millis = (self.base.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(millis).min(self.max)
    }

    /// `next_delay` with ±20% jitter drawn deterministically from the job key.
    pub fn jittered_delay(&self, attempt: u32, key: &ContentKey) -> Duration {
        let delay = self.next_delay(attempt);
        if !self.jitter {
            return delay;
        }
        let mut label = Vec::with_capacity(key.len() + 4);
        label.extend_from_slice(key);
        label.extend_from_slice(&attempt.to_le_bytes());
        let mut stream = SeededStream::new(0, &label);
        let scale = 1.0 + JITTER_SPREAD * (stream.unit() * 2.0 - 1.0);
        delay.mul_f64(scale)
    }
}

/// Transient failures are retryable; rejected or forbidden requests are not.
/// Unclassified failures are retried.
pub fn classify(error: &ServiceError) -> Classification {
    match error.kind {
        ServiceErrorKind::RateLimited
        | ServiceErrorKind::Timeout
        | ServiceErrorKind::Unavailable
        | ServiceErrorKind::Connection
        | ServiceErrorKind::Other => Classification::Retryable,
        ServiceErrorKind::InvalidRequest | ServiceErrorKind::Denied => Classification::Terminal,
    }
}
