//! Call-rate limiting for the generation service.
//!
//! Token bucket with capacity `N`, refilled continuously at `N / W`, paired
//! with a record of the last `N` grant times. A grant needs both a token and
//! fewer than `N` grants in the trailing window, so no window of length `W`
//! ever holds more than `N` calls, including right after an idle period when
//! the bucket is full again.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

const MIN_WAIT: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Rate limiter wait was cancelled")]
pub struct AcquireCancelled;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
    grants: VecDeque<Instant>,
}

/// "N calls per rolling window" limiter, shared by all scheduler workers.
pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// `calls` and `window` must be non-zero.
    pub fn new(calls: u32, window: Duration) -> Self {
        let calls = calls.max(1);
        Self {
            capacity: calls,
            window,
            state: Mutex::new(BucketState {
                tokens: f64::from(calls),
                last_refill: Instant::now(),
                grants: VecDeque::with_capacity(calls as usize),
            }),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn refill_rate(&self) -> f64 {
        f64::from(self.capacity) / self.window.as_secs_f64().max(f64::EPSILON)
    }

    /// Take a slot if one is free, or report how long to wait before retrying.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let rate = self.refill_rate();
        let mut state = self.state.lock();

        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * rate).min(f64::from(self.capacity));
        state.last_refill = now;

        while let Some(oldest) = state.grants.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                state.grants.pop_front();
            } else {
                break;
            }
        }

        let window_full = state.grants.len() >= self.capacity as usize;
        if state.tokens >= 1.0 && !window_full {
            state.tokens -= 1.0;
            state.grants.push_back(now);
            return Ok(());
        }

        let token_wait = if state.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - state.tokens) / rate)
        };
        let window_wait = match state.grants.front() {
            Some(oldest) if window_full => (*oldest + self.window).saturating_duration_since(now),
            _ => Duration::ZERO,
        };
        Err(token_wait.max(window_wait).max(MIN_WAIT))
    }

    /// Wait for a call slot without busy-waiting.
    ///
    /// Returns `Err(AcquireCancelled)` as soon as `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), AcquireCancelled> {
        loop {
            if cancel.is_cancelled() {
                return Err(AcquireCancelled);
            }
            match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(wait) => {
                    trace!(wait_ms = wait.as_millis() as u64, "Waiting for rate limit slot");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(AcquireCancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
    }
}
