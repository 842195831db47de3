//! Rate limiting for API requests using token bucket algorithm
//!
//! Keeps outbound request admission under the gateway's quota. Tokens refill
//! continuously; each admission consumes exactly one.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

/// Configuration for rate limiting behavior
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Maximum number of tokens the bucket holds
    pub capacity: u32,

    /// Tokens added per refill interval
    pub tokens_per_interval: u32,

    /// Refill interval in milliseconds
    pub interval_ms: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            tokens_per_interval: 100,
            interval_ms: 60_000,
        }
    }
}

impl RateLimiterConfig {
    /// `requests` per second with an equal burst capacity
    pub fn per_second(requests: u32) -> Self {
        Self {
            capacity: requests,
            tokens_per_interval: requests,
            interval_ms: 1000,
        }
    }

    /// `requests` per minute with an equal burst capacity
    pub fn per_minute(requests: u32) -> Self {
        Self {
            capacity: requests,
            tokens_per_interval: requests,
            interval_ms: 60_000,
        }
    }
}

struct RateLimiterState {
    /// Tokens currently available, fractional between refills
    available_tokens: f64,

    /// Maximum tokens (capacity)
    capacity: f64,

    /// Refill rate (tokens per millisecond)
    refill_per_ms: f64,

    /// Last token refill time
    last_refill: Instant,
}

impl RateLimiterState {
    fn refill(&mut self, now: Instant) {
        let elapsed_ms = now.duration_since(self.last_refill).as_secs_f64() * 1000.0;
        if elapsed_ms > 0.0 {
            self.available_tokens =
                (self.available_tokens + elapsed_ms * self.refill_per_ms).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Takes a token, or returns how long until one is available
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);

        // Tolerate float drift left over from a refill that should have produced a whole token
        if self.available_tokens + 1e-9 >= 1.0 {
            self.available_tokens = (self.available_tokens - 1.0).max(0.0);
            return Ok(());
        }

        let missing = 1.0 - self.available_tokens;
        let wait_ms = (missing / self.refill_per_ms).ceil().max(1.0);
        Err(Duration::from_millis(wait_ms as u64))
    }
}

/// Token bucket rate limiter for API requests
///
/// Clones share the same bucket, so one limiter can gate several executors.
pub struct RateLimiter {
    state: Arc<Mutex<RateLimiterState>>,
}

impl RateLimiter {
    /// Creates a new rate limiter with a full bucket
    pub fn new(config: RateLimiterConfig) -> Self {
        let capacity = config.capacity.max(1) as f64;
        let refill_per_ms =
            config.tokens_per_interval.max(1) as f64 / config.interval_ms.max(1) as f64;

        let state = RateLimiterState {
            available_tokens: capacity,
            capacity,
            refill_per_ms,
            last_refill: Instant::now(),
        };

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Waits until a token is available, then consumes it
    pub async fn acquire(&self) {
        loop {
            let mut state = self.state.lock().await;

            match state.try_take(Instant::now()) {
                Ok(()) => {
                    trace!(
                        remaining = state.available_tokens,
                        "Rate limiter token acquired"
                    );
                    return;
                }
                Err(wait) => {
                    drop(state); // Release lock while sleeping
                    debug!(
                        wait_ms = wait.as_millis() as u64,
                        "Rate limit reached - waiting for next token"
                    );
                    sleep(wait).await;
                }
            }
        }
    }

    /// Consumes a token if one is available right now
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        let admitted = state.try_take(Instant::now()).is_ok();
        if !admitted {
            debug!("Rate limit reached - request not admitted");
        }
        admitted
    }

    /// Gets the current number of whole tokens available
    pub async fn available_tokens(&self) -> u32 {
        let mut state = self.state.lock().await;
        state.refill(Instant::now());
        state.available_tokens.floor() as u32
    }

    /// Resets the rate limiter to full capacity
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.available_tokens = state.capacity;
        state.last_refill = Instant::now();
        debug!("Rate limiter reset to full capacity");
    }
}

impl Clone for RateLimiter {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}
