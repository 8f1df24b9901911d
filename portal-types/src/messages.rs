//! Push channel frames and registration DTOs.

use serde::{Deserialize, Serialize};

use crate::{PublicKeyBytes, SendEnvelope, UserId, WireError};

/// First frame a client sends on the push channel.
///
/// Subscribes the channel to `new` events for this user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    /// The local user id.
    pub id: UserId,
}

impl Greeting {
    /// Create a greeting for the given user.
    pub fn new(id: UserId) -> Self {
        Self { id }
    }

    /// Serialize to the JSON text frame.
    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialization)
    }
}

/// Raw server frame before interpretation.
#[derive(Debug, Deserialize)]
struct ServerFrame {
    event: String,
    #[serde(default)]
    meta: Option<SendEnvelope>,
}

/// A typed push event from the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// New content is waiting for this user.
    New(SendEnvelope),
    /// The relay refused the greeting.
    Forbidden,
}

impl PushEvent {
    /// Parse a text frame.
    ///
    /// Extra fields the relay attaches (such as `publicKeyBase64`) are ignored;
    /// keys are only ever taken from the friend store.
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let frame: ServerFrame = serde_json::from_str(text).map_err(WireError::Deserialization)?;
        match frame.event.as_str() {
            "new" => frame.meta.map(PushEvent::New).ok_or(WireError::MissingField {
                event: frame.event.clone(),
                field: "meta",
            }),
            "forbidden" => Ok(PushEvent::Forbidden),
            _ => Err(WireError::UnknownEvent(frame.event)),
        }
    }

    /// Serialize to a server frame (used by in-memory relays).
    pub fn to_json(&self) -> Result<String, WireError> {
        let value = match self {
            PushEvent::New(envelope) => serde_json::json!({ "event": "new", "meta": envelope }),
            PushEvent::Forbidden => serde_json::json!({ "event": "forbidden" }),
        };
        serde_json::to_string(&value).map_err(WireError::Serialization)
    }
}

/// Body of `POST /users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreateRequest {
    /// The new user's public key.
    #[serde(rename = "publicKeyBase64")]
    pub public_key: PublicKeyBytes,
}

/// Response of `POST /users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreateResponse {
    /// The relay-assigned id.
    pub id: UserId,
}
