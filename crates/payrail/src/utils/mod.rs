//! Resilience building blocks shared by the executor and the stream manager
//!
//! - Token bucket rate limiting for API calls
//! - Retry policy with exponential backoff
//! - Reconnection strategy with exponential backoff
//! - Heartbeat monitoring for the payment stream
//! - Cancellable timer handles

pub mod heartbeat;
pub mod rate_limiter;
pub mod reconnect;
pub mod retry;
pub mod timer;

pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor, HeartbeatWake};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use reconnect::{ReconnectConfig, ReconnectStrategy};
pub use retry::RetryPolicy;
pub use timer::Timer;
