//! Payment stream connection manager
//!
//! Integrates heartbeat monitoring and reconnection logic to keep one
//! payment-update stream alive. All state lives in a single actor task; the
//! [`ConnectionManager`] handle only sends commands to it and reads
//! snapshots, so every transition for one stream is serialized.
//!
//! ```text
//! Disconnected --connect()--> Connecting --open--> Connected
//!      ^                        |   ^                 |
//!      |                 lost   |   | delay      lost |
//!      |                        v   |                 v
//!   close() (any state)      Reconnecting <-----------+
//!                               |
//!                  attempts exhausted --> Terminated
//! ```

use crate::config::PRODUCTION_STREAM_URL;
use crate::error::{StreamError, TransportError};
use crate::events::{EventDispatcher, EventKind, StreamEvent, DEFAULT_EVENT_BUFFER};
use crate::frame::{decode_frame, Frame};
use crate::transport::http::API_KEY_HEADER;
use crate::transport::{ChannelEvent, StreamChannel, StreamConnector};
use crate::utils::{
    HeartbeatConfig, HeartbeatMonitor, HeartbeatWake, ReconnectConfig, ReconnectStrategy, Timer,
};
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const NORMAL_CLOSURE: u16 = 1000;

/// Upper bound on the close handshake of a channel being discarded
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Stream connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial state, and the state after `close()`
    Disconnected,
    /// Channel open in progress
    Connecting,
    /// Channel open and receiving frames
    Connected,
    /// Connection lost, waiting for the backoff delay
    Reconnecting,
    /// Reconnect attempts exhausted; only `connect()` starts a new session
    Terminated,
}

/// Read-only view of the manager's state
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,

    /// Reconnect attempts since the last successful connection
    pub reconnect_attempts: u32,

    /// Time of last successful connection
    pub last_connected_at: Option<DateTime<Utc>>,

    /// Total number of successful connections
    pub total_connections: u64,

    /// Total number of lost connections (client closes excluded)
    pub total_disconnections: u64,

    /// Round trip of the last acknowledged heartbeat
    pub last_latency: Option<Duration>,

    /// Ping, pong-deadline and reconnect timers currently armed
    pub armed_timers: usize,
}

impl Default for ConnectionSnapshot {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            last_connected_at: None,
            total_connections: 0,
            total_disconnections: 0,
            last_latency: None,
            armed_timers: 0,
        }
    }
}

/// Configuration for the payment stream
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// WebSocket endpoint
    pub endpoint: String,

    /// Sent as a header when opening the channel
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    pub reconnect: ReconnectConfig,

    pub heartbeat: HeartbeatConfig,

    /// Time allowed for the transport handshake in milliseconds
    pub connect_timeout_ms: u64,

    /// Events queued per subscriber before new ones are dropped
    pub event_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: PRODUCTION_STREAM_URL.to_string(),
            api_key: None,
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            connect_timeout_ms: 10_000,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl StreamConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.api_key
            .iter()
            .map(|key| (API_KEY_HEADER.to_string(), key.clone()))
            .collect()
    }
}

enum Command {
    Connect,
    Close { ack: oneshot::Sender<()> },
}

/// Handle to a self-healing payment stream
///
/// Public operations never fail; everything that goes wrong after
/// `connect()` is reported as a [`StreamEvent::Error`]. Dropping the handle
/// stops the actor and closes the channel.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<ConnectionSnapshot>,
    events: EventDispatcher,
}

impl ConnectionManager {
    /// Spawns the connection actor; must be called within a tokio runtime
    pub fn new(config: StreamConfig, connector: Arc<dyn StreamConnector>) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(ConnectionSnapshot::default());
        let events = EventDispatcher::with_capacity(config.event_buffer);

        let actor = ConnectionActor {
            strategy: ReconnectStrategy::new(config.reconnect.clone()),
            config,
            connector,
            commands: commands_rx,
            events: events.clone(),
            snapshot: snapshot_tx,
            state: ConnectionState::Disconnected,
            last_connected_at: None,
            total_connections: 0,
            total_disconnections: 0,
            last_latency: None,
            channel: None,
            pending_open: None,
            heartbeat: None,
            reconnect_timer: Timer::new(),
        };
        tokio::spawn(actor.run());

        Self {
            commands: commands_tx,
            snapshot: snapshot_rx,
            events,
        }
    }

    /// Receives every stream event
    pub fn subscribe(&self) -> mpsc::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// Receives only events of the given kinds
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> mpsc::Receiver<StreamEvent> {
        self.events.subscribe_to(kinds)
    }

    /// Starts a session; ignored while one is already active
    pub fn connect(&self) {
        if self.commands.send(Command::Connect).is_err() {
            warn!("Connection actor stopped - connect ignored");
        }
    }

    /// Closes the stream without reconnecting
    ///
    /// Returns once every timer is cancelled and the channel is closed; no
    /// events are emitted after that.
    pub async fn close(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Close { ack }).is_err() {
            return;
        }
        let _ = done.await;
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot.borrow().state
    }

    /// Waits until a snapshot satisfies `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F) -> ConnectionSnapshot
    where
        F: FnMut(&ConnectionSnapshot) -> bool,
    {
        let mut rx = self.snapshot.clone();
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if predicate(&snapshot) {
                    return snapshot.clone();
                }
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }
}

type PendingOpen = BoxFuture<'static, Result<Box<dyn StreamChannel>, TransportError>>;

enum Wake {
    Command(Option<Command>),
    Opened(Result<Box<dyn StreamChannel>, TransportError>),
    Channel(ChannelEvent),
    Heartbeat(HeartbeatWake),
    ReconnectDue,
}

struct ConnectionActor {
    config: StreamConfig,
    connector: Arc<dyn StreamConnector>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: EventDispatcher,
    snapshot: watch::Sender<ConnectionSnapshot>,

    state: ConnectionState,
    strategy: ReconnectStrategy,
    last_connected_at: Option<DateTime<Utc>>,
    total_connections: u64,
    total_disconnections: u64,
    last_latency: Option<Duration>,

    channel: Option<Box<dyn StreamChannel>>,
    pending_open: Option<PendingOpen>,
    heartbeat: Option<HeartbeatMonitor>,
    reconnect_timer: Timer,
}

impl ConnectionActor {
    async fn run(mut self) {
        loop {
            let wake = tokio::select! {
                biased;
                command = self.commands.recv() => Wake::Command(command),
                result = poll_open(&mut self.pending_open) => Wake::Opened(result),
                event = next_channel_event(&mut self.channel) => Wake::Channel(event),
                wake = next_heartbeat_wake(&mut self.heartbeat) => Wake::Heartbeat(wake),
                _ = self.reconnect_timer.fired() => Wake::ReconnectDue,
            };

            match wake {
                Wake::Command(None) => {
                    self.shutdown().await;
                    return;
                }
                Wake::Command(Some(Command::Connect)) => self.handle_connect(),
                Wake::Command(Some(Command::Close { ack })) => {
                    self.handle_close().await;
                    self.publish();
                    let _ = ack.send(());
                    continue;
                }
                Wake::Opened(Ok(channel)) => self.on_open(channel),
                Wake::Opened(Err(e)) => {
                    self.on_channel_lost(
                        format!("connect failed: {}", e),
                        Some(StreamError::Transport(e.to_string())),
                    )
                    .await;
                }
                Wake::Channel(event) => self.on_channel_event(event).await,
                Wake::Heartbeat(HeartbeatWake::PingDue) => self.on_ping_due().await,
                Wake::Heartbeat(HeartbeatWake::PongOverdue) => self.on_pong_overdue().await,
                Wake::ReconnectDue => self.on_reconnect_due(),
            }

            self.publish();
        }
    }

    fn handle_connect(&mut self) {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Terminated => {
                self.strategy.reset();
                info!(endpoint = %self.config.endpoint, "Connecting to payment stream");
                self.begin_open();
            }
            state => debug!(?state, "Connect ignored - session already active"),
        }
    }

    fn begin_open(&mut self) {
        self.state = ConnectionState::Connecting;

        let connector = Arc::clone(&self.connector);
        let url = self.config.endpoint.clone();
        let headers = self.config.headers();
        let limit = self.config.connect_timeout();
        self.pending_open = Some(Box::pin(async move {
            match timeout(limit, connector.open(&url, &headers)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Connect(format!(
                    "open timed out after {}ms",
                    limit.as_millis()
                ))),
            }
        }));
    }

    fn on_open(&mut self, channel: Box<dyn StreamChannel>) {
        let attempts = self.strategy.attempts();

        self.channel = Some(channel);
        self.state = ConnectionState::Connected;
        self.strategy.reset();
        self.last_connected_at = Some(Utc::now());
        self.total_connections += 1;

        if self.config.heartbeat.is_enabled() {
            self.heartbeat = Some(HeartbeatMonitor::start(self.config.heartbeat.clone()));
        }

        info!(
            connections = self.total_connections,
            reconnect_attempts = attempts,
            "Payment stream connected"
        );
        self.events.emit(StreamEvent::Connected);
    }

    async fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message(bytes) => self.on_message(&bytes),
            ChannelEvent::Pong(_) => self.on_pong(),
            ChannelEvent::Closed { code, reason } => {
                let reason = match code {
                    Some(code) => format!("closed by remote ({}): {}", code, reason),
                    None => format!("closed by remote: {}", reason),
                };
                self.on_channel_lost(reason, None).await;
            }
            ChannelEvent::Error(message) => {
                self.on_channel_lost(
                    format!("transport error: {}", message),
                    Some(StreamError::Transport(message)),
                )
                .await;
            }
        }
    }

    fn on_message(&mut self, bytes: &[u8]) {
        match decode_frame(bytes) {
            Ok(Frame::PaymentUpdate(payment)) => {
                debug!(
                    payment_id = %payment.payment_id,
                    status = ?payment.payment_status,
                    "Payment update received"
                );
                self.events.emit(StreamEvent::PaymentUpdate(payment));
            }
            Ok(Frame::Ignored(kind)) => debug!(kind = %kind, "Ignoring stream frame"),
            Err(e) => {
                warn!(error = %e, "Failed to decode stream frame");
                self.events.emit(StreamEvent::Error(e));
            }
        }
    }

    fn on_pong(&mut self) {
        let Some(heartbeat) = self.heartbeat.as_mut() else {
            return;
        };

        if let Some(latency) = heartbeat.record_pong() {
            self.last_latency = Some(latency);
            self.events.emit(StreamEvent::Pong { latency });
        }
    }

    async fn on_ping_due(&mut self) {
        let should_ping = self
            .heartbeat
            .as_mut()
            .map_or(false, |heartbeat| heartbeat.on_ping_due());
        if !should_ping {
            return;
        }

        let result = match self.channel.as_mut() {
            Some(channel) => channel.ping(Vec::new()).await,
            None => return,
        };

        match result {
            Ok(()) => {
                if let Some(heartbeat) = self.heartbeat.as_mut() {
                    heartbeat.record_probe_sent();
                }
            }
            Err(e) => {
                self.on_channel_lost(
                    format!("ping failed: {}", e),
                    Some(StreamError::Transport(e.to_string())),
                )
                .await;
            }
        }
    }

    async fn on_pong_overdue(&mut self) {
        if let Some(heartbeat) = self.heartbeat.as_mut() {
            heartbeat.on_pong_overdue();
        }
        // Same transition as a remote close
        self.on_channel_lost("heartbeat timeout: no pong received".to_string(), None)
            .await;
    }

    fn on_reconnect_due(&mut self) {
        let attempt = self.strategy.record_attempt();
        info!(
            attempt,
            max_attempts = self.strategy.max_attempts(),
            "Reconnecting to payment stream"
        );
        self.begin_open();
    }

    /// Transport closed, errored or went silent while connecting or connected
    async fn on_channel_lost(&mut self, reason: String, error: Option<StreamError>) {
        self.stop_heartbeat();
        self.pending_open = None;
        self.close_channel("connection lost").await;
        self.total_disconnections += 1;

        warn!(
            reason = %reason,
            disconnections = self.total_disconnections,
            "Payment stream disconnected"
        );

        if let Some(error) = error {
            self.events.emit(StreamEvent::Error(error));
        }
        self.events.emit(StreamEvent::Disconnected { reason });

        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if !self.strategy.can_retry() {
            let attempts = self.strategy.attempts();
            self.state = ConnectionState::Terminated;
            error!(attempts, "All reconnection attempts exhausted");
            self.events
                .emit(StreamEvent::Error(StreamError::ReconnectExhausted { attempts }));
            return;
        }

        let attempt = self.strategy.next_attempt();
        let delay = self.strategy.delay_for(attempt);
        self.state = ConnectionState::Reconnecting;
        self.reconnect_timer.arm(delay);

        warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnection scheduled"
        );
        self.events
            .emit(StreamEvent::Reconnecting { attempt, delay });
    }

    async fn handle_close(&mut self) {
        let was_active = matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        );

        self.teardown("client closed").await;
        self.state = ConnectionState::Disconnected;

        if was_active {
            info!("Payment stream closed by client");
            self.events.emit(StreamEvent::Disconnected {
                reason: "closed by client".to_string(),
            });
        } else {
            debug!("Close ignored - no active session");
        }
    }

    async fn shutdown(&mut self) {
        self.teardown("client dropped").await;
        self.state = ConnectionState::Disconnected;
        self.publish();
        debug!("Connection actor stopped");
    }

    /// Cancels every timer and discards the channel
    async fn teardown(&mut self, reason: &str) {
        self.stop_heartbeat();
        self.reconnect_timer.cancel();
        self.pending_open = None;
        self.close_channel(reason).await;
    }

    fn stop_heartbeat(&mut self) {
        if let Some(mut heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }
    }

    async fn close_channel(&mut self, reason: &str) {
        let Some(mut channel) = self.channel.take() else {
            return;
        };

        match timeout(CLOSE_TIMEOUT, channel.close(NORMAL_CLOSURE, reason)).await {
            Ok(Ok(())) => debug!("Stream channel closed"),
            Ok(Err(e)) => debug!(error = %e, "Stream channel close failed"),
            Err(_) => debug!("Stream channel close timed out"),
        }
    }

    fn armed_timers(&self) -> usize {
        usize::from(self.reconnect_timer.is_armed())
            + self
                .heartbeat
                .as_ref()
                .map_or(0, HeartbeatMonitor::armed_timers)
    }

    fn publish(&self) {
        self.snapshot.send_replace(ConnectionSnapshot {
            state: self.state,
            reconnect_attempts: self.strategy.attempts(),
            last_connected_at: self.last_connected_at,
            total_connections: self.total_connections,
            total_disconnections: self.total_disconnections,
            last_latency: self.last_latency,
            armed_timers: self.armed_timers(),
        });
    }
}

async fn poll_open(
    slot: &mut Option<PendingOpen>,
) -> Result<Box<dyn StreamChannel>, TransportError> {
    match slot {
        Some(open) => {
            let result = open.await;
            *slot = None;
            result
        }
        None => pending().await,
    }
}

async fn next_channel_event(channel: &mut Option<Box<dyn StreamChannel>>) -> ChannelEvent {
    match channel {
        Some(channel) => channel
            .next_event()
            .await
            .unwrap_or_else(|| ChannelEvent::Closed {
                code: None,
                reason: "stream ended".to_string(),
            }),
        None => pending().await,
    }
}

async fn next_heartbeat_wake(heartbeat: &mut Option<HeartbeatMonitor>) -> HeartbeatWake {
    match heartbeat {
        Some(heartbeat) => heartbeat.next_wake().await,
        None => pending().await,
    }
}
