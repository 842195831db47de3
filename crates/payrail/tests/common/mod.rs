//! Scripted transports shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use payrail::{
    ApiRequest, ChannelEvent, HttpResponse, HttpTransport, StreamChannel, StreamConnector,
    TransportError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

// =============================================================================
// HTTP
// =============================================================================

pub enum Reply {
    Respond(HttpResponse),
    Fail(String),
}

impl Reply {
    pub fn status(status: u16) -> Self {
        let body = if (200..300).contains(&status) {
            r#"{"ok":true}"#.to_string()
        } else {
            format!(r#"{{"code":"HTTP_{}","message":"status {}"}}"#, status, status)
        };
        Reply::Respond(HttpResponse::new(status, body))
    }

    pub fn body(status: u16, body: &str) -> Self {
        Reply::Respond(HttpResponse::new(status, body))
    }
}

pub struct RecordedCall {
    pub at: Instant,
    pub request: ApiRequest,
}

/// Replays scripted replies in order; errors once the script runs out
#[derive(Default)]
pub struct MockHttpTransport {
    script: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockHttpTransport {
    pub fn new(script: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn statuses(statuses: &[u16]) -> Arc<Self> {
        Self::new(statuses.iter().map(|s| Reply::status(*s)).collect())
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn call_instants(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|call| call.at).collect()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.calls.lock().iter().map(|call| call.request.clone()).collect()
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<HttpResponse, TransportError> {
        self.calls.lock().push(RecordedCall {
            at: Instant::now(),
            request: request.clone(),
        });

        match self.script.lock().pop_front() {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail(message)) => Err(TransportError::Request(message)),
            None => Err(TransportError::Request("script exhausted".to_string())),
        }
    }
}

/// Milliseconds between consecutive instants
pub fn gaps_ms(instants: &[Instant]) -> Vec<u64> {
    instants
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_millis() as u64)
        .collect()
}

/// Paused-clock sleeps land on the next whole millisecond
pub fn assert_close_ms(actual: u64, expected: u64) {
    assert!(
        actual >= expected && actual <= expected + 5,
        "expected ~{}ms, got {}ms",
        expected,
        actual
    );
}

// =============================================================================
// Stream
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Open {
    Accept,
    Refuse,
    /// Never completes
    Hang,
}

#[derive(Default)]
struct RemoteState {
    pings: AtomicUsize,
    closed: AtomicBool,
}

/// Server side of one accepted channel
#[derive(Clone)]
pub struct MockRemote {
    events: mpsc::UnboundedSender<ChannelEvent>,
    state: Arc<RemoteState>,
}

impl MockRemote {
    pub fn push(&self, event: ChannelEvent) {
        let _ = self.events.send(event);
    }

    pub fn push_text(&self, text: &str) {
        self.push(ChannelEvent::Message(text.as_bytes().to_vec()));
    }

    pub fn pong(&self) {
        self.push(ChannelEvent::Pong(Vec::new()));
    }

    pub fn close(&self, code: u16, reason: &str) {
        self.push(ChannelEvent::Closed {
            code: Some(code),
            reason: reason.to_string(),
        });
    }

    pub fn fail(&self, message: &str) {
        self.push(ChannelEvent::Error(message.to_string()));
    }

    pub fn pings(&self) -> usize {
        self.state.pings.load(Ordering::SeqCst)
    }

    /// Whether the client closed this channel
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

struct MockChannel {
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    loopback: mpsc::UnboundedSender<ChannelEvent>,
    state: Arc<RemoteState>,
    auto_pong: bool,
}

#[async_trait]
impl StreamChannel for MockChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    async fn ping(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        if self.auto_pong {
            let _ = self.loopback.send(ChannelEvent::Pong(payload));
        }
        Ok(())
    }

    async fn close(&mut self, _code: u16, _reason: &str) -> Result<(), TransportError> {
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Opens channels per script, then falls back to `otherwise`
pub struct MockConnector {
    script: Mutex<VecDeque<Open>>,
    otherwise: Open,
    auto_pong: bool,
    opens: Mutex<Vec<Instant>>,
    headers: Mutex<Vec<Vec<(String, String)>>>,
    remotes: Mutex<Vec<MockRemote>>,
}

impl MockConnector {
    pub fn new(script: Vec<Open>, otherwise: Open) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            otherwise,
            auto_pong: false,
            opens: Mutex::new(Vec::new()),
            headers: Mutex::new(Vec::new()),
            remotes: Mutex::new(Vec::new()),
        })
    }

    pub fn accepting() -> Arc<Self> {
        Self::new(Vec::new(), Open::Accept)
    }

    pub fn refusing() -> Arc<Self> {
        Self::new(Vec::new(), Open::Refuse)
    }

    /// Channels answer every ping immediately
    pub fn with_auto_pong(script: Vec<Open>, otherwise: Open) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            otherwise,
            auto_pong: true,
            opens: Mutex::new(Vec::new()),
            headers: Mutex::new(Vec::new()),
            remotes: Mutex::new(Vec::new()),
        })
    }

    /// Open attempts, accepted or not
    pub fn open_count(&self) -> usize {
        self.opens.lock().len()
    }

    pub fn open_instants(&self) -> Vec<Instant> {
        self.opens.lock().clone()
    }

    pub fn last_headers(&self) -> Option<Vec<(String, String)>> {
        self.headers.lock().last().cloned()
    }

    pub fn remote(&self, index: usize) -> MockRemote {
        self.remotes.lock()[index].clone()
    }

    pub fn latest_remote(&self) -> MockRemote {
        self.remotes
            .lock()
            .last()
            .cloned()
            .expect("no channel accepted yet")
    }

    pub fn accepted(&self) -> usize {
        self.remotes.lock().len()
    }
}

#[async_trait]
impl StreamConnector for MockConnector {
    async fn open(
        &self,
        _url: &str,
        headers: &[(String, String)],
    ) -> Result<Box<dyn StreamChannel>, TransportError> {
        self.opens.lock().push(Instant::now());
        self.headers.lock().push(headers.to_vec());

        let outcome = self.script.lock().pop_front().unwrap_or(self.otherwise);
        match outcome {
            Open::Accept => {}
            Open::Refuse => {
                return Err(TransportError::Connect("connection refused".to_string()));
            }
            Open::Hang => std::future::pending::<()>().await,
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(RemoteState::default());
        self.remotes.lock().push(MockRemote {
            events: tx.clone(),
            state: Arc::clone(&state),
        });

        Ok(Box::new(MockChannel {
            events: rx,
            loopback: tx,
            state,
            auto_pong: self.auto_pong,
        }))
    }
}
