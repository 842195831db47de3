//! Decoding of inbound stream frames
//!
//! Payment updates arrive either wrapped as
//! `{"type": "payment_update", "data": {...}}` or as a bare payment object.
//! Anything else that parses as JSON is ignored; anything that does not is a
//! decode failure.

use crate::error::StreamError;
use crate::types::Payment;
use serde_json::Value;

pub const PAYMENT_UPDATE: &str = "payment_update";

/// Longest frame excerpt carried in a decode error
const FRAME_EXCERPT_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    PaymentUpdate(Payment),
    /// Well-formed frame of a type the client does not handle
    Ignored(String),
}

pub fn decode_frame(bytes: &[u8]) -> Result<Frame, StreamError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| decode_error(e.to_string(), bytes))?;

    match value.get("type").and_then(Value::as_str) {
        Some(PAYMENT_UPDATE) => {
            let data = value
                .get("data")
                .cloned()
                .ok_or_else(|| decode_error("payment_update frame without data", bytes))?;
            let payment = serde_json::from_value(data)
                .map_err(|e| decode_error(format!("invalid payment_update: {}", e), bytes))?;
            Ok(Frame::PaymentUpdate(payment))
        }
        Some(other) => Ok(Frame::Ignored(other.to_string())),
        None if value.get("payment_id").is_some() => {
            let payment = serde_json::from_value(value)
                .map_err(|e| decode_error(format!("invalid payment: {}", e), bytes))?;
            Ok(Frame::PaymentUpdate(payment))
        }
        None => Ok(Frame::Ignored("untyped".to_string())),
    }
}

fn decode_error(reason: impl Into<String>, bytes: &[u8]) -> StreamError {
    let text = String::from_utf8_lossy(bytes);
    let cut = text.char_indices().nth(FRAME_EXCERPT_LEN).map(|(end, _)| end);
    let frame = match cut {
        Some(end) => format!("{}...", &text[..end]),
        None => text.into_owned(),
    };

    StreamError::ProtocolDecode {
        reason: reason.into(),
        frame,
    }
}
