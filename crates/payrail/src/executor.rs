//! Rate-limited, retrying request executor
//!
//! Each logical call is validated once, then dispatched up to
//! `RetryPolicy::max_attempts` times. Every attempt first takes a token from
//! the shared [`RateLimiter`]. 429 and 5xx responses are retried after an
//! exponential delay; everything else ends the call.

use crate::error::{ConfigError, ExecutorError, Result, ServiceFailure};
use crate::transport::{ApiRequest, HttpResponse, HttpTransport};
use crate::utils::{RateLimiter, RateLimiterConfig, RetryPolicy};
use crate::validation::FieldValidator;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

/// Executor settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub retry: RetryPolicy,
    pub rate_limit: RateLimiterConfig,
}

impl ExecutorConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.rate_limit.capacity == 0 || self.rate_limit.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "rate_limit",
                reason: "capacity and interval must be greater than 0".to_string(),
            });
        }
        self.retry.validate()
    }
}

/// Classification of one attempt
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(Value),
    RetryableFailure(ServiceFailure),
    TerminalFailure(ExecutorError),
}

impl AttemptOutcome {
    /// Classifies a raw response
    ///
    /// A 2xx with an empty body succeeds with `null`; a 2xx whose body is not
    /// JSON is a terminal malformed response.
    pub fn classify(response: HttpResponse) -> Self {
        if response.is_success() {
            if response.body.trim().is_empty() {
                return AttemptOutcome::Success(Value::Null);
            }
            return match serde_json::from_str(&response.body) {
                Ok(payload) => AttemptOutcome::Success(payload),
                Err(e) => AttemptOutcome::TerminalFailure(ExecutorError::MalformedResponse {
                    status: response.status,
                    reason: e.to_string(),
                    body: response.body,
                }),
            };
        }

        let failure = ServiceFailure::from_response(response.status, &response.body);
        if failure.is_retryable() {
            AttemptOutcome::RetryableFailure(failure)
        } else {
            AttemptOutcome::TerminalFailure(ExecutorError::Rejected(failure))
        }
    }
}

/// Successful result of a logical call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub payload: Value,
    /// Attempts it took, including the successful one
    pub attempts: u32,
    /// Wall time including backoff and rate-limit waits
    pub elapsed: Duration,
}

/// Executes API requests with admission control and retries
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    limiter: RateLimiter,
    policy: RetryPolicy,
    validator: Option<Arc<dyn FieldValidator>>,
}

impl RequestExecutor {
    /// Fails if the retry policy or rate limit settings are unusable
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        config: ExecutorConfig,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            transport,
            limiter: RateLimiter::new(config.rate_limit),
            policy: config.retry,
            validator: None,
        })
    }

    pub fn with_validator(mut self, validator: Arc<dyn FieldValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Shares an existing limiter, e.g. between executors for the same account
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs one logical call to completion
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "api_call",
            %request_id,
            method = %request.method,
            path = %request.path
        );
        self.run(request).instrument(span).await
    }

    /// Runs a call and deserializes its payload
    pub async fn execute_as<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        let response = self.execute(request).await?;
        serde_json::from_value(response.payload.clone()).map_err(|e| {
            ExecutorError::MalformedResponse {
                status: response.status,
                reason: e.to_string(),
                body: response.payload.to_string(),
            }
        })
    }

    async fn run(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.validate(request)?;

        let started = Instant::now();
        let max_attempts = self.policy.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.limiter.acquire().await;

            let sent_at = Instant::now();
            let response = match self.transport.send(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(
                        attempt,
                        duration_ms = sent_at.elapsed().as_millis() as u64,
                        error = %e,
                        "API call failed at transport level"
                    );
                    return Err(e.into());
                }
            };

            let status = response.status;
            debug!(
                method = %request.method,
                path = %request.path,
                attempt,
                status,
                duration_ms = sent_at.elapsed().as_millis() as u64,
                "API call completed"
            );

            match AttemptOutcome::classify(response) {
                AttemptOutcome::Success(payload) => {
                    return Ok(ApiResponse {
                        status,
                        payload,
                        attempts: attempt,
                        elapsed: started.elapsed(),
                    });
                }
                AttemptOutcome::TerminalFailure(e) => {
                    warn!(attempt, status, error = %e, "API call failed");
                    return Err(e);
                }
                AttemptOutcome::RetryableFailure(failure) if attempt >= max_attempts => {
                    warn!(attempts = attempt, status, error = %failure, "API call retries exhausted");
                    return Err(ExecutorError::RetriesExhausted {
                        attempts: attempt,
                        failure,
                    });
                }
                AttemptOutcome::RetryableFailure(failure) => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        status,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Retryable API failure, backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    fn validate(&self, request: &ApiRequest) -> Result<()> {
        let (Some(schema), Some(validator)) = (&request.schema, &self.validator) else {
            return Ok(());
        };

        validator
            .validate(schema, &request.params())
            .map_err(|violations| ExecutorError::Validation {
                schema: schema.clone(),
                violations,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_classify_success() {
        match AttemptOutcome::classify(HttpResponse::new(200, r#"{"message":"OK"}"#)) {
            AttemptOutcome::Success(payload) => assert_eq!(payload, json!({"message": "OK"})),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_classify_empty_success() {
        assert!(matches!(
            AttemptOutcome::classify(HttpResponse::new(204, "")),
            AttemptOutcome::Success(Value::Null)
        ));
    }

    #[test]
    fn test_classify_retryable() {
        for status in [429, 500, 502, 503] {
            assert!(matches!(
                AttemptOutcome::classify(HttpResponse::new(status, "")),
                AttemptOutcome::RetryableFailure(_)
            ));
        }
    }

    #[test]
    fn test_classify_terminal() {
        let outcome = AttemptOutcome::classify(HttpResponse::new(
            404,
            r#"{"code":"NOT_FOUND","message":"payment not found"}"#,
        ));
        match outcome {
            AttemptOutcome::TerminalFailure(e) => {
                assert_eq!(e.kind(), ErrorKind::TerminalServiceFailure);
                let failure = e.service_failure().unwrap();
                assert_eq!(failure.code.as_deref(), Some("NOT_FOUND"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_classify_malformed_success() {
        match AttemptOutcome::classify(HttpResponse::new(200, "<html>")) {
            AttemptOutcome::TerminalFailure(ExecutorError::MalformedResponse { status, body, .. }) => {
                assert_eq!(status, 200);
                assert_eq!(body, "<html>");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_executor_config_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.rate_limit.capacity, 100);
    }
}
