use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Amount = f64;

// ============================================================================
// Payments
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Waiting,
    Confirming,
    Confirmed,
    Sending,
    PartiallyPaid,
    Finished,
    Failed,
    Refunded,
    Expired,
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    /// No further updates are expected once a payment reaches a final status
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Finished
                | PaymentStatus::Failed
                | PaymentStatus::Refunded
                | PaymentStatus::Expired
        )
    }
}

/// Payment as returned by the API and pushed on the stream
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    #[serde(deserialize_with = "string_or_number")]
    pub payment_id: String,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub pay_address: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub price_amount: Option<Amount>,
    #[serde(default)]
    pub price_currency: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub pay_amount: Option<Amount>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub actually_paid: Option<Amount>,
    #[serde(default)]
    pub pay_currency: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub order_description: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub outcome_amount: Option<Amount>,
    #[serde(default)]
    pub outcome_currency: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreatePayment {
    pub price_amount: Amount,
    pub price_currency: String,
    pub pay_currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pay_amount: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipn_callback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_description: Option<String>,
}

impl CreatePayment {
    pub fn new(
        price_amount: Amount,
        price_currency: impl Into<String>,
        pay_currency: impl Into<String>,
    ) -> Self {
        Self {
            price_amount,
            price_currency: price_currency.into(),
            pay_currency: pay_currency.into(),
            pay_amount: None,
            ipn_callback_url: None,
            order_id: None,
            order_description: None,
        }
    }

    pub fn with_order(mut self, order_id: impl Into<String>, description: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self.order_description = Some(description.into());
        self
    }

    pub fn with_callback(mut self, url: impl Into<String>) -> Self {
        self.ipn_callback_url = Some(url.into());
        self
    }
}

// ============================================================================
// Market info
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ApiStatus {
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Currencies {
    pub currencies: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Estimate {
    pub currency_from: String,
    pub currency_to: String,
    #[serde(deserialize_with = "lenient_amount")]
    pub amount_from: Option<Amount>,
    #[serde(deserialize_with = "lenient_amount")]
    pub estimated_amount: Option<Amount>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct MinAmount {
    pub currency_from: String,
    pub currency_to: String,
    #[serde(deserialize_with = "lenient_amount")]
    pub min_amount: Option<Amount>,
}

// ============================================================================
// Serde helpers
// ============================================================================

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// Amounts arrive as numbers or numeric strings depending on the endpoint
fn lenient_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Amount>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<Amount>()
            .map(Some)
            .map_err(|e| de::Error::custom(format!("invalid amount {:?}: {}", s, e))),
        other => Err(de::Error::custom(format!("expected amount, got {}", other))),
    }
}
