//! Stream events and their dispatch to subscribers
//!
//! Each subscriber gets its own bounded channel, optionally filtered to a
//! set of [`EventKind`]s. Emitting never blocks the connection actor: an
//! event for a subscriber whose queue is full is dropped with a warning, and
//! subscribers whose receiver was dropped are pruned on the next emit.

use crate::error::StreamError;
use crate::types::Payment;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Events queued per subscriber unless configured otherwise
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected,
    Disconnected { reason: String },
    Reconnecting { attempt: u32, delay: Duration },
    PaymentUpdate(Payment),
    Pong { latency: Duration },
    Error(StreamError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    Reconnecting,
    PaymentUpdate,
    Pong,
    Error,
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Connected => EventKind::Connected,
            StreamEvent::Disconnected { .. } => EventKind::Disconnected,
            StreamEvent::Reconnecting { .. } => EventKind::Reconnecting,
            StreamEvent::PaymentUpdate(_) => EventKind::PaymentUpdate,
            StreamEvent::Pong { .. } => EventKind::Pong,
            StreamEvent::Error(_) => EventKind::Error,
        }
    }
}

struct Subscriber {
    /// `None` receives everything
    kinds: Option<Vec<EventKind>>,
    tx: mpsc::Sender<StreamEvent>,
}

impl Subscriber {
    fn wants(&self, kind: EventKind) -> bool {
        self.kinds
            .as_ref()
            .map_or(true, |kinds| kinds.contains(&kind))
    }
}

/// Fan-out of stream events to registered subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    capacity: usize,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_BUFFER)
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each subscriber queues at most `capacity` events (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    /// Receives every event
    pub fn subscribe(&self) -> mpsc::Receiver<StreamEvent> {
        self.register(None)
    }

    /// Receives only events of the given kinds
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> mpsc::Receiver<StreamEvent> {
        self.register(Some(kinds.to_vec()))
    }

    fn register(&self, kinds: Option<Vec<EventKind>>) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.lock().push(Subscriber { kinds, tx });
        rx
    }

    pub fn emit(&self, event: StreamEvent) {
        let kind = event.kind();
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|subscriber| {
            if !subscriber.wants(kind) {
                return !subscriber.tx.is_closed();
            }
            match subscriber.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        event = ?kind,
                        capacity = self.capacity,
                        "Subscriber queue full, dropping event"
                    );
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
