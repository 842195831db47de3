//! Typed payment gateway operations
//!
//! Thin wrappers over [`RequestExecutor::execute`]; every call gets the
//! executor's validation, rate limiting and retries.

use crate::config::ClientConfig;
use crate::error::{ExecutorError, Result, Violation};
use crate::executor::RequestExecutor;
use crate::transport::{ApiRequest, HttpTransport, ReqwestTransport};
use crate::types::{Amount, ApiStatus, CreatePayment, Currencies, Estimate, MinAmount, Payment};
use crate::validation::SchemaValidator;
use std::sync::Arc;
use tracing::info;

/// Payment gateway REST client
#[derive(Clone)]
pub struct PaymentsApi {
    executor: RequestExecutor,
}

impl PaymentsApi {
    pub fn new(executor: RequestExecutor) -> Self {
        Self { executor }
    }

    /// Builds a reqwest-backed client with the built-in request schemas
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(
            config.base_url.clone(),
            Some(config.api_key.clone()),
            config.request_timeout(),
        )?;
        Self::with_transport(Arc::new(transport), config)
    }

    /// Builds a client over any transport with the built-in request schemas
    pub fn with_transport(
        transport: Arc<dyn HttpTransport>,
        config: &ClientConfig,
    ) -> Result<Self> {
        let executor = RequestExecutor::new(transport, config.executor.clone())?
            .with_validator(Arc::new(SchemaValidator::payments()));
        Ok(Self::new(executor))
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Gateway health
    pub async fn status(&self) -> Result<ApiStatus> {
        self.executor.execute_as(&ApiRequest::get("/status")).await
    }

    /// Currencies available for payment
    pub async fn currencies(&self) -> Result<Currencies> {
        self.executor.execute_as(&ApiRequest::get("/currencies")).await
    }

    /// Estimated amount of `currency_to` for `amount` of `currency_from`
    pub async fn estimate_price(
        &self,
        amount: Amount,
        currency_from: &str,
        currency_to: &str,
    ) -> Result<Estimate> {
        let request = ApiRequest::get("/estimate")
            .query("amount", amount)
            .query("currency_from", currency_from)
            .query("currency_to", currency_to)
            .schema("estimate");
        self.executor.execute_as(&request).await
    }

    /// Smallest payment accepted for a currency pair
    pub async fn min_amount(&self, currency_from: &str, currency_to: &str) -> Result<MinAmount> {
        let request = ApiRequest::get("/min-amount")
            .query("currency_from", currency_from)
            .query("currency_to", currency_to)
            .schema("min_amount");
        self.executor.execute_as(&request).await
    }

    pub async fn create_payment(&self, payment: &CreatePayment) -> Result<Payment> {
        let request = ApiRequest::post("/payment")
            .json(payment)
            .map_err(|e| ExecutorError::Validation {
                schema: "create_payment".to_string(),
                violations: vec![Violation::new("body", e.to_string())],
            })?
            .schema("create_payment");

        let created: Payment = self.executor.execute_as(&request).await?;
        info!(
            payment_id = %created.payment_id,
            status = ?created.payment_status,
            pay_currency = ?created.pay_currency,
            "Payment created"
        );
        Ok(created)
    }

    pub async fn payment_status(&self, payment_id: &str) -> Result<Payment> {
        check_path_segment("payment_status", "payment_id", payment_id)?;
        let request = ApiRequest::get(format!("/payment/{}", payment_id));
        self.executor.execute_as(&request).await
    }
}

/// Ids are interpolated into the path, so only `[A-Za-z0-9_-]` is accepted
fn check_path_segment(schema: &str, field: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        return Ok(());
    }
    Err(ExecutorError::Validation {
        schema: schema.to_string(),
        violations: vec![Violation::new(
            field,
            format!("`{}` is not a valid identifier", value),
        )],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_path_segment_accepts_ids() {
        for id in ["5745459419", "pay_01-AB"] {
            assert!(check_path_segment("payment_status", "payment_id", id).is_ok());
        }
    }

    #[test]
    fn test_path_segment_rejects_path_characters() {
        for id in ["", "1?x=y", "../status", "12/34", "a b", "1%2F"] {
            let err = check_path_segment("payment_status", "payment_id", id).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationFailure, "{}", id);
        }
    }
}
