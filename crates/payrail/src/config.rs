//! Client configuration
//!
//! Loaded from a TOML file or from `PAYRAIL_*` environment variables.
//!
//! # Environment Variables
//!
//! - `PAYRAIL_API_KEY` - API key (required)
//! - `PAYRAIL_IPN_SECRET` - callback signing secret
//! - `PAYRAIL_ENV` - `production` (default) or `sandbox`
//! - `PAYRAIL_BASE_URL` / `PAYRAIL_STREAM_URL` - endpoint overrides
//! - `PAYRAIL_TIMEOUT_MS` - per-request HTTP timeout
//! - `PAYRAIL_MAX_ATTEMPTS` - attempts per API call
//! - `PAYRAIL_MAX_RECONNECT_ATTEMPTS` - stream reconnect ceiling
//! - `PAYRAIL_PING_INTERVAL_MS` / `PAYRAIL_PONG_TIMEOUT_MS` - heartbeat timing

use crate::connection::StreamConfig;
use crate::error::ConfigError;
use crate::executor::ExecutorConfig;
use crate::signature::CallbackSigner;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub const PRODUCTION_API_URL: &str = "https://api.payrail.io/v1";
pub const SANDBOX_API_URL: &str = "https://api-sandbox.payrail.io/v1";
pub const PRODUCTION_STREAM_URL: &str = "wss://stream.payrail.io/v1";
pub const SANDBOX_STREAM_URL: &str = "wss://stream-sandbox.payrail.io/v1";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(skip_serializing)]
    pub api_key: String,

    /// Secret for callback signatures
    #[serde(skip_serializing)]
    pub ipn_secret: Option<String>,

    pub base_url: String,

    pub request_timeout_ms: u64,

    pub executor: ExecutorConfig,

    pub stream: StreamConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl ClientConfig {
    pub fn production() -> Self {
        Self {
            api_key: String::new(),
            ipn_secret: None,
            base_url: PRODUCTION_API_URL.to_string(),
            request_timeout_ms: 30_000,
            executor: ExecutorConfig::default(),
            stream: StreamConfig::default(),
        }
    }

    pub fn sandbox() -> Self {
        Self {
            base_url: SANDBOX_API_URL.to_string(),
            stream: StreamConfig::default().with_endpoint(SANDBOX_STREAM_URL),
            ..Self::production()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_ipn_secret(mut self, secret: impl Into<String>) -> Self {
        self.ipn_secret = Some(secret.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Loads configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `PAYRAIL_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut config = match get("PAYRAIL_ENV").as_deref() {
            None | Some("production") => Self::production(),
            Some("sandbox") => Self::sandbox(),
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "PAYRAIL_ENV",
                    reason: format!("expected `production` or `sandbox`, got `{}`", other),
                })
            }
        };

        config.api_key = get("PAYRAIL_API_KEY").ok_or(ConfigError::Missing("PAYRAIL_API_KEY"))?;
        config.ipn_secret = get("PAYRAIL_IPN_SECRET");

        if let Some(base_url) = get("PAYRAIL_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(stream_url) = get("PAYRAIL_STREAM_URL") {
            config.stream.endpoint = stream_url;
        }
        if let Some(timeout) = parse(&get, "PAYRAIL_TIMEOUT_MS")? {
            config.request_timeout_ms = timeout;
        }
        if let Some(attempts) = parse(&get, "PAYRAIL_MAX_ATTEMPTS")? {
            config.executor.retry.max_attempts = attempts;
        }
        if let Some(attempts) = parse(&get, "PAYRAIL_MAX_RECONNECT_ATTEMPTS")? {
            config.stream.reconnect.max_attempts = attempts;
        }
        if let Some(interval) = parse(&get, "PAYRAIL_PING_INTERVAL_MS")? {
            config.stream.heartbeat.ping_interval_ms = interval;
        }
        if let Some(timeout) = parse(&get, "PAYRAIL_PONG_TIMEOUT_MS")? {
            config.stream.heartbeat.pong_timeout_ms = timeout;
        }

        config.validate()?;

        info!(
            base_url = %config.base_url,
            stream = %config.stream.endpoint,
            max_attempts = config.executor.retry.max_attempts,
            max_reconnect_attempts = config.stream.reconnect.max_attempts,
            "Configuration loaded"
        );

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("PAYRAIL_API_KEY"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "request_timeout_ms",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.stream.heartbeat.is_enabled() && self.stream.heartbeat.pong_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "pong_timeout_ms",
                reason: "must be greater than 0 while pinging".to_string(),
            });
        }
        self.executor.validate()
    }

    /// Verifier for payment callbacks; `None` without an IPN secret
    pub fn callback_signer(&self) -> Option<CallbackSigner> {
        self.ipn_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .map(CallbackSigner::new)
    }

    /// Stream settings with the API key attached
    pub fn stream_config(&self) -> StreamConfig {
        self.stream.clone().with_api_key(self.api_key.clone())
    }
}

fn parse<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| {
            value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                reason: format!("`{}`: {}", value, e),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, PRODUCTION_API_URL);
        assert_eq!(config.stream.endpoint, PRODUCTION_STREAM_URL);
        assert_eq!(config.executor.retry.max_attempts, 3);
        assert_eq!(config.executor.retry.initial_delay_ms, 1000);
        assert_eq!(config.executor.rate_limit.capacity, 100);
        assert_eq!(config.executor.rate_limit.interval_ms, 60_000);
    }

    #[test]
    fn test_from_env_minimal() {
        let config = ClientConfig::from_lookup(lookup(&[("PAYRAIL_API_KEY", "key-1")])).unwrap();
        assert_eq!(config.api_key, "key-1");
        assert_eq!(config.base_url, PRODUCTION_API_URL);
        assert!(config.ipn_secret.is_none());
    }

    #[test]
    fn test_from_env_sandbox_with_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("PAYRAIL_API_KEY", "key-1"),
            ("PAYRAIL_ENV", "sandbox"),
            ("PAYRAIL_MAX_ATTEMPTS", "5"),
            ("PAYRAIL_PING_INTERVAL_MS", "10000"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, SANDBOX_API_URL);
        assert_eq!(config.stream.endpoint, SANDBOX_STREAM_URL);
        assert_eq!(config.executor.retry.max_attempts, 5);
        assert_eq!(config.stream.heartbeat.ping_interval_ms, 10_000);
    }

    #[test]
    fn test_missing_api_key() {
        let err = ClientConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PAYRAIL_API_KEY")));
    }

    #[test]
    fn test_invalid_number() {
        let err = ClientConfig::from_lookup(lookup(&[
            ("PAYRAIL_API_KEY", "key-1"),
            ("PAYRAIL_TIMEOUT_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "PAYRAIL_TIMEOUT_MS",
                ..
            }
        ));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[
            ("PAYRAIL_API_KEY", "key-1"),
            ("PAYRAIL_MAX_ATTEMPTS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "max_attempts", .. }));
    }

    #[test]
    fn test_parse_toml_config() {
        let toml_str = r#"
api_key = "key-1"
base_url = "https://api.example.test/v1"

[executor.retry]
max_attempts = 4

[stream]
endpoint = "wss://stream.example.test"

[stream.heartbeat]
ping_interval_ms = 15000
"#;

        let config: ClientConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_key, "key-1");
        assert_eq!(config.executor.retry.max_attempts, 4);
        assert_eq!(config.executor.retry.initial_delay_ms, 1000);
        assert_eq!(config.stream.endpoint, "wss://stream.example.test");
        assert_eq!(config.stream.heartbeat.ping_interval_ms, 15_000);
        assert_eq!(config.stream.heartbeat.pong_timeout_ms, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_callback_signer_from_ipn_secret() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("PAYRAIL_API_KEY", "key-1"),
            ("PAYRAIL_IPN_SECRET", "ipn-secret"),
        ]))
        .unwrap();
        let signer = config.callback_signer().unwrap();

        let body = br#"{"payment_id":"1","payment_status":"finished"}"#;
        let header = CallbackSigner::new("ipn-secret")
            .sign(&serde_json::from_slice(body).unwrap())
            .unwrap();
        assert!(signer.verify(body, &header).unwrap());

        assert!(ClientConfig::default().callback_signer().is_none());
        assert!(ClientConfig::default()
            .with_ipn_secret("")
            .callback_signer()
            .is_none());
    }

    #[test]
    fn test_stream_config_carries_api_key() {
        let config = ClientConfig::sandbox().with_api_key("key-1");
        assert_eq!(config.stream_config().api_key.as_deref(), Some("key-1"));
    }
}
