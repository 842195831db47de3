//! Transport seams for the request executor and the stream manager
//!
//! The resilience layer only sees these traits; [`http::ReqwestTransport`]
//! and [`ws::TungsteniteConnector`] are the production implementations.

pub mod http;
pub mod ws;

use crate::error::TransportError;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

pub use http::ReqwestTransport;
pub use ws::TungsteniteConnector;

/// HTTP method of an API call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical API call
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL, e.g. `/payment`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Validation schema checked before dispatch
    pub schema: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            schema: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a JSON body from any serializable value
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Parameters subject to validation: the body, or the query as an object
    pub fn params(&self) -> Value {
        match &self.body {
            Some(body) => body.clone(),
            None => Value::Object(
                self.query
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                    .collect(),
            ),
        }
    }
}

/// Raw response of one attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Request/response transport
///
/// Errors returned here are treated as terminal by the executor; transports
/// that retry at the connection level do so internally.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<HttpResponse, TransportError>;
}

/// Something that happened on a streaming channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Inbound data frame
    Message(Vec<u8>),
    /// Acknowledgement of a ping
    Pong(Vec<u8>),
    /// Remote closed the channel
    Closed { code: Option<u16>, reason: String },
    /// Channel failed
    Error(String),
}

/// An open streaming channel, exclusively owned by one connection manager
#[async_trait::async_trait]
pub trait StreamChannel: Send {
    /// Next event, or `None` once the stream has ended
    ///
    /// Must be cancel safe: it is polled from a `select!` loop.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    async fn ping(&mut self, payload: Vec<u8>) -> Result<(), TransportError>;

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// Opens streaming channels; a successful `open` is the "open" event
#[async_trait::async_trait]
pub trait StreamConnector: Send + Sync + 'static {
    async fn open(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<Box<dyn StreamChannel>, TransportError>;
}
