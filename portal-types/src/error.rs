//! Error types for the relay wire format.

use thiserror::Error;

/// Errors raised while parsing or producing wire data.
#[derive(Debug, Error)]
pub enum WireError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// A user id that is not exactly eight ASCII digits
    #[error("invalid user id {0:?}: expected 8 digits")]
    InvalidUserId(String),

    /// Base64 payload could not be decoded
    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    /// Public key with the wrong length
    #[error("invalid public key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Push frame with an event name this client does not understand
    #[error("unknown push event: {0:?}")]
    UnknownEvent(String),

    /// Push frame missing a field its event requires
    #[error("push event {event:?} is missing field {field:?}")]
    MissingField {
        /// Event name.
        event: String,
        /// Field name.
        field: &'static str,
    },
}
