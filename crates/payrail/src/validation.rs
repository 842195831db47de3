//! Field-level validation of request parameters
//!
//! Checks run before dispatch so a request the gateway would reject never
//! spends a rate-limit token or a retry.

use crate::error::Violation;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Validates request parameters against a named schema
pub trait FieldValidator: Send + Sync {
    fn validate(&self, schema: &str, params: &Value) -> Result<(), Vec<Violation>>;
}

/// Expected JSON type of a field
///
/// Query parameters arrive as strings, so numeric kinds also accept strings
/// that parse as numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    PositiveNumber,
    Boolean,
    Object,
    Any,
}

impl FieldKind {
    fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            FieldKind::String => match value {
                Value::String(s) if !s.trim().is_empty() => Ok(()),
                Value::String(_) => Err("must not be empty".to_string()),
                _ => Err("must be a string".to_string()),
            },
            FieldKind::Number => as_number(value)
                .map(|_| ())
                .ok_or_else(|| "must be a number".to_string()),
            FieldKind::PositiveNumber => match as_number(value) {
                Some(n) if n > 0.0 => Ok(()),
                Some(n) => Err(format!("must be greater than 0, got {}", n)),
                None => Err("must be a number".to_string()),
            },
            FieldKind::Boolean => match value {
                Value::Bool(_) => Ok(()),
                _ => Err("must be a boolean".to_string()),
            },
            FieldKind::Object => match value {
                Value::Object(_) => Ok(()),
                _ => Err("must be an object".to_string()),
            },
            FieldKind::Any => Ok(()),
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldRule {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Table of named schemas
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    schemas: HashMap<String, Vec<FieldRule>>,
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, name: impl Into<String>, rules: Vec<FieldRule>) -> Self {
        self.schemas.insert(name.into(), rules);
        self
    }

    /// Schemas for the built-in payment operations
    pub fn payments() -> Self {
        Self::new()
            .with_schema(
                "create_payment",
                vec![
                    FieldRule::required("price_amount", FieldKind::PositiveNumber),
                    FieldRule::required("price_currency", FieldKind::String),
                    FieldRule::required("pay_currency", FieldKind::String),
                    FieldRule::optional("pay_amount", FieldKind::PositiveNumber),
                    FieldRule::optional("ipn_callback_url", FieldKind::String),
                    FieldRule::optional("order_id", FieldKind::String),
                    FieldRule::optional("order_description", FieldKind::String),
                ],
            )
            .with_schema(
                "estimate",
                vec![
                    FieldRule::required("amount", FieldKind::PositiveNumber),
                    FieldRule::required("currency_from", FieldKind::String),
                    FieldRule::required("currency_to", FieldKind::String),
                ],
            )
            .with_schema(
                "min_amount",
                vec![
                    FieldRule::required("currency_from", FieldKind::String),
                    FieldRule::required("currency_to", FieldKind::String),
                ],
            )
    }

    pub fn has_schema(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }
}

impl FieldValidator for SchemaValidator {
    fn validate(&self, schema: &str, params: &Value) -> Result<(), Vec<Violation>> {
        let Some(rules) = self.schemas.get(schema) else {
            return Err(vec![Violation::new(
                "schema",
                format!("unknown schema `{}`", schema),
            )]);
        };

        let Some(fields) = params.as_object() else {
            return Err(vec![Violation::new("params", "must be an object")]);
        };

        let violations: Vec<Violation> = rules
            .iter()
            .filter_map(|rule| match fields.get(&rule.name) {
                None | Some(Value::Null) if rule.required => {
                    Some(Violation::new(&rule.name, "is required"))
                }
                None | Some(Value::Null) => None,
                Some(value) => rule
                    .kind
                    .check(value)
                    .err()
                    .map(|message| Violation::new(&rule.name, message)),
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            debug!(schema, violations = violations.len(), "Request failed validation");
            Err(violations)
        }
    }
}
