//! Identity types as they appear on the wire.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::WireError;

/// Length of a relay-assigned user id.
pub const USER_ID_LEN: usize = 8;

/// Size of an X25519 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// A relay-assigned user id.
///
/// Always exactly eight ASCII digits, e.g. `"00412345"`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Parse and validate a user id.
    pub fn parse(raw: &str) -> Result<Self, WireError> {
        let trimmed = raw.trim();
        if trimmed.len() == USER_ID_LEN && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(WireError::InvalidUserId(raw.to_string()))
        }
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for UserId {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = WireError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

/// A peer's X25519 public key.
///
/// Serialized as standard base64 (with padding), which is how the relay
/// stores and serves it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKeyBytes([u8; PUBLIC_KEY_SIZE]);

impl PublicKeyBytes {
    /// Wrap raw key bytes.
    pub fn new(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, WireError> {
        let arr: [u8; PUBLIC_KEY_SIZE] =
            bytes.try_into().map_err(|_| WireError::InvalidKeyLength {
                expected: PUBLIC_KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Decode from base64.
    ///
    /// Accepts surrounding whitespace and JSON string quotes, since
    /// `GET /{id}.publickey` may return either form.
    pub fn from_base64(encoded: &str) -> Result<Self, WireError> {
        let cleaned = encoded.trim().trim_matches('"');
        let bytes = STANDARD
            .decode(cleaned)
            .map_err(|e| WireError::InvalidBase64(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Encode as standard base64.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Short human-comparable fingerprint, e.g. `3f2a-91c0-7be4-0d15`.
    ///
    /// First 8 bytes of SHA-256 over the raw key, hex, in groups of two bytes.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        let hex = hex::encode(&digest[..8]);
        hex.as_bytes()
            .chunks(4)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl fmt::Display for PublicKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for PublicKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyBytes({})", self.fingerprint())
    }
}

impl Serialize for PublicKeyBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKeyBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_accepts_eight_digits() {
        let id = UserId::parse("11112222").unwrap();
        assert_eq!(id.as_str(), "11112222");
        assert_eq!(id.to_string(), "11112222");
    }

    #[test]
    fn user_id_keeps_leading_zeros() {
        let id: UserId = "00000042".parse().unwrap();
        assert_eq!(id.as_str(), "00000042");
    }

    #[test]
    fn user_id_trims_whitespace() {
        let id = UserId::parse(" 33334444\n").unwrap();
        assert_eq!(id.as_str(), "33334444");
    }

    #[test]
    fn user_id_rejects_wrong_length_and_letters() {
        assert!(UserId::parse("1234567").is_err());
        assert!(UserId::parse("123456789").is_err());
        assert!(UserId::parse("1234abcd").is_err());
        assert!(UserId::parse("").is_err());
        assert!(UserId::parse("１２３４５６７８").is_err());
    }

    #[test]
    fn user_id_serializes_as_plain_string() {
        let id = UserId::parse("55556666").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"55556666\"");

        let back: UserId = serde_json::from_str("\"55556666\"").unwrap();
        assert_eq!(back, id);

        assert!(serde_json::from_str::<UserId>("\"5555\"").is_err());
    }

    #[test]
    fn public_key_base64_matches_standard_encoding() {
        let key = PublicKeyBytes::new([7u8; 32]);
        let encoded = key.to_base64();
        assert!(encoded.ends_with('='));
        assert_eq!(PublicKeyBytes::from_base64(&encoded).unwrap(), key);
    }

    #[test]
    fn public_key_accepts_quoted_body() {
        let key = PublicKeyBytes::new([9u8; 32]);
        let body = format!("\"{}\"\n", key.to_base64());
        assert_eq!(PublicKeyBytes::from_base64(&body).unwrap(), key);
    }

    #[test]
    fn public_key_rejects_wrong_length() {
        let short = STANDARD.encode([1u8; 16]);
        let err = PublicKeyBytes::from_base64(&short).unwrap_err();
        assert!(matches!(
            err,
            WireError::InvalidKeyLength {
                expected: 32,
                actual: 16
            }
        ));
    }

    #[test]
    fn public_key_rejects_garbage() {
        assert!(matches!(
            PublicKeyBytes::from_base64("not base64!!"),
            Err(WireError::InvalidBase64(_))
        ));
    }

    #[test]
    fn fingerprint_is_stable_and_grouped() {
        let key = PublicKeyBytes::new([0u8; 32]);
        let fp = key.fingerprint();
        assert_eq!(fp.len(), 19);
        assert_eq!(fp.matches('-').count(), 3);
        assert_eq!(fp, key.fingerprint());
        assert_ne!(fp, PublicKeyBytes::new([1u8; 32]).fingerprint());
    }

    #[test]
    fn debug_shows_fingerprint_not_key() {
        let key = PublicKeyBytes::new([3u8; 32]);
        let debug = format!("{:?}", key);
        assert!(debug.contains(&key.fingerprint()));
        assert!(!debug.contains(&key.to_base64()));
    }
}
