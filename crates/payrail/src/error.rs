//! Error types for the request executor and the payment stream
//!
//! Every failure maps onto an [`ErrorKind`] so callers can route on the
//! category without matching individual variants. Service failures keep the
//! status code, symbolic code and structured body the gateway returned.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Failure categories shared by the executor and the stream manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller input rejected before dispatch; never retried
    ValidationFailure,
    /// 429 or 5xx; retried up to the policy limit
    RetryableServiceFailure,
    /// Other 4xx or malformed response; surfaced immediately
    TerminalServiceFailure,
    /// Connection-level failure
    TransportFailure,
    /// Inbound frame could not be decoded; non-fatal to the connection
    ProtocolDecodeFailure,
    /// Reconnect ceiling reached; the session must be restarted by the caller
    ReconnectExhausted,
}

/// One field-level validation problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Returns true for statuses the executor retries (429 and 5xx)
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Error reported by the gateway for a single attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceFailure {
    /// HTTP status code
    pub status: u16,
    /// Human readable message, taken from the body's `message` field when present
    pub message: String,
    /// Symbolic error code from the body's `code` field
    pub code: Option<String>,
    /// Full structured body, if it was JSON
    pub data: Option<Value>,
}

impl ServiceFailure {
    /// Builds a failure from a non-success response body
    pub fn from_response(status: u16, body: &str) -> Self {
        let data = serde_json::from_str::<Value>(body).ok();

        let message = data
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.to_string()
                }
            });

        let code = data
            .as_ref()
            .and_then(|v| v.get("code"))
            .and_then(|code| match code {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        Self {
            status,
            message,
            code,
            data,
        }
    }

    pub fn is_retryable(&self) -> bool {
        is_retryable_status(self.status)
    }
}

impl fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "HTTP {} [{}]: {}", self.status, code, self.message),
            None => write!(f, "HTTP {}: {}", self.status, self.message),
        }
    }
}

/// Errors raised by HTTP and stream transports
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("channel closed")]
    Closed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Final error of one logical [`execute`](crate::RequestExecutor::execute) call
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("validation failed for `{schema}`: {}", join_violations(.violations))]
    Validation {
        schema: String,
        violations: Vec<Violation>,
    },

    #[error("retries exhausted after {attempts} attempts: {failure}")]
    RetriesExhausted { attempts: u32, failure: ServiceFailure },

    #[error("request rejected: {0}")]
    Rejected(ServiceFailure),

    #[error("malformed response (HTTP {status}): {reason}")]
    MalformedResponse {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid executor configuration: {0}")]
    Config(#[from] ConfigError),
}

impl ExecutorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutorError::Validation { .. } | ExecutorError::Config(_) => {
                ErrorKind::ValidationFailure
            }
            ExecutorError::RetriesExhausted { .. } => ErrorKind::RetryableServiceFailure,
            ExecutorError::Rejected(_) | ExecutorError::MalformedResponse { .. } => {
                ErrorKind::TerminalServiceFailure
            }
            ExecutorError::Transport(_) => ErrorKind::TransportFailure,
        }
    }

    /// HTTP status of the last attempt, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            ExecutorError::RetriesExhausted { failure, .. } | ExecutorError::Rejected(failure) => {
                Some(failure.status)
            }
            ExecutorError::MalformedResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Remote failure details, if the gateway answered
    pub fn service_failure(&self) -> Option<&ServiceFailure> {
        match self {
            ExecutorError::RetriesExhausted { failure, .. } | ExecutorError::Rejected(failure) => {
                Some(failure)
            }
            _ => None,
        }
    }
}

/// Failures reported on the stream event channel
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("failed to decode frame: {reason}")]
    ProtocolDecode { reason: String, frame: String },

    #[error("reconnect attempts exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl StreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamError::Transport(_) => ErrorKind::TransportFailure,
            StreamError::ProtocolDecode { .. } => ErrorKind::ProtocolDecodeFailure,
            StreamError::ReconnectExhausted { .. } => ErrorKind::ReconnectExhausted,
        }
    }
}

/// Invalid or missing configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
