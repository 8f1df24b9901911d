//! SendEnvelope and ContentMetadata - what travels alongside every blob.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{UserId, WireError};

/// The unencrypted wrapper the relay stores next to a blob.
///
/// Only `sender_id` is readable by the relay. The metadata is sealed
/// under the sender/receiver pair key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendEnvelope {
    /// Who sent the content; used to look up the matching friend key.
    #[serde(rename = "senderId")]
    pub sender_id: UserId,
    /// Sealed [`ContentMetadata`] JSON.
    #[serde(
        rename = "encryptedContentMetadataBase64",
        serialize_with = "to_base64",
        deserialize_with = "from_base64"
    )]
    pub encrypted_metadata: Vec<u8>,
}

impl SendEnvelope {
    /// Create a new envelope.
    pub fn new(sender_id: UserId, encrypted_metadata: Vec<u8>) -> Self {
        Self {
            sender_id,
            encrypted_metadata,
        }
    }

    /// Serialize to the JSON text sent as the multipart `meta` field.
    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialization)
    }

    /// Parse from JSON text.
    pub fn from_json(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(WireError::Deserialization)
    }
}

impl std::fmt::Debug for SendEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendEnvelope")
            .field("sender_id", &self.sender_id)
            .field(
                "encrypted_metadata",
                &format!("[{} bytes]", self.encrypted_metadata.len()),
            )
            .finish()
    }
}

fn to_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD
        .decode(encoded.trim())
        .map_err(serde::de::Error::custom)
}

/// What kind of content a blob holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// UTF-8 text.
    Text,
    /// A single file, raw bytes.
    File,
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Text => f.write_str("text"),
            ContentKind::File => f.write_str("file"),
        }
    }
}

/// Plaintext metadata describing a blob. Only ever sent sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMetadata {
    /// Content type.
    #[serde(rename = "type")]
    pub kind: ContentKind,
    /// Original filename for files.
    #[serde(default)]
    pub filename: Option<String>,
}

impl ContentMetadata {
    /// Metadata for a text payload.
    pub fn text() -> Self {
        Self {
            kind: ContentKind::Text,
            filename: None,
        }
    }

    /// Metadata for a file payload.
    pub fn file(filename: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::File,
            filename: Some(filename.into()),
        }
    }

    /// Serialize to JSON bytes (the plaintext that gets sealed).
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Serialization)
    }

    /// Parse from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(WireError::Deserialization)
    }
}
