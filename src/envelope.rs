//! Envelope inspection for inbound frames.
//!
//! DESIGN
//! ======
//! The relay only ever reads one field, `receiver`. Everything else in the
//! payload is opaque and the original frame is forwarded untouched, so this
//! module returns the receiver and nothing else. Parse failures and shape
//! failures are distinct error variants; the connection handler drops both.

use serde_json::Value;

/// Opaque client-declared identifier used as the registry key.
pub type ClientId = String;

/// Envelope key naming the intended recipient.
pub const RECEIVER_FIELD: &str = "receiver";

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("envelope is not a JSON object")]
    NotAnObject,
    #[error("envelope has no usable `receiver`")]
    MissingReceiver,
}

impl EnvelopeError {
    /// Grepable code for log lines.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "E_MALFORMED",
            Self::NotAnObject => "E_NOT_OBJECT",
            Self::MissingReceiver => "E_NO_RECEIVER",
        }
    }
}

/// Extract the receiver from a raw frame payload.
///
/// Accepts text or binary payloads (anything `serde_json` can read from a
/// byte slice). The receiver must be a non-empty JSON string.
///
/// # Errors
///
/// - [`EnvelopeError::Malformed`] if the bytes are not valid JSON.
/// - [`EnvelopeError::NotAnObject`] if the JSON is not an object.
/// - [`EnvelopeError::MissingReceiver`] if `receiver` is absent, not a string, or empty.
pub fn receiver_of(raw: &[u8]) -> Result<ClientId, EnvelopeError> {
    let value: Value = serde_json::from_slice(raw)?;
    let Value::Object(mut fields) = value else {
        return Err(EnvelopeError::NotAnObject);
    };
    match fields.remove(RECEIVER_FIELD) {
        Some(Value::String(receiver)) if !receiver.is_empty() => Ok(receiver),
        _ => Err(EnvelopeError::MissingReceiver),
    }
}

#[cfg(test)]
#[path = "envelope_test.rs"]
mod tests;
