//! Callback signature signing and verification
//!
//! The gateway signs payment callbacks with HMAC-SHA512 over the JSON body
//! with keys sorted recursively, hex encoded, and sends the result in the
//! [`SIGNATURE_HEADER`] header.

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha512;
use tracing::debug;

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the callback signature
pub const SIGNATURE_HEADER: &str = "x-payrail-sig";

/// Signs and verifies callback payloads with the account's callback secret
#[derive(Clone)]
pub struct CallbackSigner {
    secret: String,
}

impl CallbackSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Hex encoded signature of `payload`
    pub fn sign(&self, payload: &Value) -> Result<String> {
        let canonical = serde_json::to_string(&sort_keys(payload))
            .context("Failed to serialize callback payload")?;

        let mut mac = self.mac()?;
        mac.update(canonical.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Checks `header` against the signature of the raw callback body
    ///
    /// A header that is not valid hex is a mismatch, not an error; a body
    /// that is not JSON is an error.
    pub fn verify(&self, body: &[u8], header: &str) -> Result<bool> {
        let payload: Value =
            serde_json::from_slice(body).context("Callback body is not valid JSON")?;

        let Ok(expected) = hex::decode(header.trim()) else {
            debug!("Callback signature is not hex");
            return Ok(false);
        };

        let canonical = serde_json::to_string(&sort_keys(&payload))
            .context("Failed to serialize callback payload")?;

        let mut mac = self.mac()?;
        mac.update(canonical.as_bytes());
        Ok(mac.verify_slice(&expected).is_ok())
    }

    fn mac(&self) -> Result<HmacSha512> {
        HmacSha512::new_from_slice(self.secret.as_bytes()).context("Invalid HMAC key")
    }
}

impl std::fmt::Debug for CallbackSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSigner").finish_non_exhaustive()
    }
}

/// Copy of `value` with object keys in sorted order at every level
fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), sort_keys(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
