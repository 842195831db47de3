//! payrail client
//!
//! Resilience layer for the payrail payment gateway:
//! - [`RequestExecutor`]: rate-limited, retrying request/response calls
//! - [`ConnectionManager`]: self-healing, heartbeat-monitored payment stream
//!
//! [`PaymentsApi`] wraps the executor with typed gateway operations and
//! [`CallbackSigner`] checks signed payment callbacks.

pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod executor;
pub mod frame;
pub mod signature;
pub mod transport;
pub mod types;
pub mod utils;
pub mod validation;

pub use api::PaymentsApi;
pub use config::ClientConfig;
pub use connection::{ConnectionManager, ConnectionSnapshot, ConnectionState, StreamConfig};
pub use error::{
    ConfigError, ErrorKind, ExecutorError, Result, ServiceFailure, StreamError, TransportError,
    Violation,
};
pub use events::{EventDispatcher, EventKind, StreamEvent};
pub use executor::{ApiResponse, AttemptOutcome, ExecutorConfig, RequestExecutor};
pub use signature::{CallbackSigner, SIGNATURE_HEADER};
pub use transport::{
    ApiRequest, ChannelEvent, HttpResponse, HttpTransport, Method, ReqwestTransport,
    StreamChannel, StreamConnector, TungsteniteConnector,
};
pub use types::{Payment, PaymentStatus};
pub use utils::{HeartbeatConfig, RateLimiter, RateLimiterConfig, ReconnectConfig, RetryPolicy};
pub use validation::{FieldKind, FieldRule, FieldValidator, SchemaValidator};
