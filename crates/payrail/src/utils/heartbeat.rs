//! Heartbeat monitoring for the payment stream
//!
//! Sends a ping every `ping_interval` and expects the pong within
//! `pong_timeout`. A missed pong means the socket is silently dead, which a
//! close event would never reveal. At most one probe is outstanding.
//!
//! The monitor only exists while the connection is up; the connection
//! manager creates it on connect and drops it on every exit from
//! `Connected`, taking both timers with it.

use super::timer::Timer;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Configuration for heartbeat monitoring
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Interval between pings in milliseconds; 0 disables active pinging
    pub ping_interval_ms: u64,

    /// Time allowed for the pong to arrive in milliseconds
    pub pong_timeout_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: 30_000,
            pong_timeout_ms: 5_000,
        }
    }
}

impl HeartbeatConfig {
    /// Conservative production configuration
    pub fn production() -> Self {
        Self::default()
    }

    /// Aggressive configuration for faster failure detection
    pub fn aggressive() -> Self {
        Self {
            ping_interval_ms: 10_000,
            pong_timeout_ms: 2_000,
        }
    }

    /// No active pinging
    pub fn disabled() -> Self {
        Self {
            ping_interval_ms: 0,
            ..Default::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.ping_interval_ms > 0
    }

    fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }
}

/// What woke the heartbeat up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatWake {
    /// The ping interval elapsed
    PingDue,
    /// The outstanding probe was not acknowledged in time
    PongOverdue,
}

/// Heartbeat state for one live connection
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    last_probe_sent_at: Option<Instant>,
    pending_probe: bool,
    ping_timer: Timer,
    pong_deadline: Timer,
}

impl HeartbeatMonitor {
    /// Starts monitoring; the first ping is due one interval from now
    pub fn start(config: HeartbeatConfig) -> Self {
        let mut ping_timer = Timer::new();
        if config.is_enabled() {
            ping_timer.arm(config.ping_interval());
        }

        Self {
            config,
            last_probe_sent_at: None,
            pending_probe: false,
            ping_timer,
            pong_deadline: Timer::new(),
        }
    }

    /// Waits for the next ping tick or pong deadline
    pub async fn next_wake(&mut self) -> HeartbeatWake {
        tokio::select! {
            biased;
            _ = self.pong_deadline.fired() => HeartbeatWake::PongOverdue,
            _ = self.ping_timer.fired() => HeartbeatWake::PingDue,
        }
    }

    /// Handles a ping tick: re-arms the interval and reports whether a probe
    /// should go out now
    pub fn on_ping_due(&mut self) -> bool {
        self.ping_timer.arm(self.config.ping_interval());

        if self.pending_probe {
            debug!("Heartbeat ping skipped - probe still outstanding");
            return false;
        }
        true
    }

    /// Records that a ping was sent and arms the pong deadline
    pub fn record_probe_sent(&mut self) {
        self.last_probe_sent_at = Some(Instant::now());
        self.pending_probe = true;
        self.pong_deadline.arm(self.config.pong_timeout());
        debug!("Heartbeat ping sent");
    }

    /// Records a pong; returns the round trip if it answered our probe
    pub fn record_pong(&mut self) -> Option<Duration> {
        if !self.pending_probe {
            debug!("Unsolicited pong ignored");
            return None;
        }

        self.pending_probe = false;
        self.pong_deadline.cancel();

        let latency = self.last_probe_sent_at.map(|sent| sent.elapsed());
        debug!(latency_ms = ?latency.map(|l| l.as_millis()), "Heartbeat pong received");
        latency
    }

    /// Handles an expired pong deadline
    pub fn on_pong_overdue(&mut self) {
        self.pending_probe = false;
        warn!(
            timeout_ms = self.config.pong_timeout_ms,
            "Heartbeat timeout - no pong received"
        );
    }

    /// Cancels both timers
    pub fn stop(&mut self) {
        self.ping_timer.cancel();
        self.pong_deadline.cancel();
        self.pending_probe = false;
    }

    pub fn is_probe_pending(&self) -> bool {
        self.pending_probe
    }

    pub fn last_probe_sent_at(&self) -> Option<Instant> {
        self.last_probe_sent_at
    }

    /// Number of timers currently armed
    pub fn armed_timers(&self) -> usize {
        usize::from(self.ping_timer.is_armed()) + usize::from(self.pong_deadline.is_armed())
    }
}
