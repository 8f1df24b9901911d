//! Client error taxonomy.
//!
//! Subsystem errors fold into [`ClientError`] through `From`, grouped the way
//! they are reported: relay failures, protocol surprises, crypto (security
//! events), trust gates, configuration, and local storage.

use clipportal_types::{UserId, WireError};
use thiserror::Error;

use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::crypto::CryptoError;
use crate::friends::FriendError;
use crate::identity::IdentityError;
use crate::transport::RelayError;

/// Trust-gate outcomes that stop a receive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustError {
    /// Content arrived from someone who is not a friend.
    #[error("content from unknown sender {0} is waiting for approval")]
    UnknownSender(UserId),

    /// Accept or deny was called with nothing pending.
    #[error("no pending friend request")]
    NoPendingRequest,

    /// The request being answered was replaced by one from another sender.
    #[error("the friend request from {expected} was replaced by one from {pending}")]
    RequestChanged {
        /// The sender the answer was meant for.
        expected: UserId,
        /// The sender now waiting.
        pending: UserId,
    },
}

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Relay HTTP error.
    #[error("{0}")]
    Relay(#[from] RelayError),

    /// Malformed or unexpected data from the relay.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Authentication or ciphertext failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Trust gate.
    #[error(transparent)]
    Trust(#[from] TrustError),

    /// Missing configuration or registration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Friend store failure.
    #[error("friend store: {0}")]
    Friends(#[from] FriendError),

    /// Identity storage failure.
    #[error("identity: {0}")]
    Identity(#[from] IdentityError),

    /// Content could not be encoded or decoded.
    #[error("{0}")]
    Codec(CodecError),

    /// The clipboard sink rejected received content.
    #[error("could not deliver received content: {0}")]
    Sink(#[source] std::io::Error),
}

impl From<CodecError> for ClientError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnknownSender(id) => Self::Trust(TrustError::UnknownSender(id)),
            CodecError::Crypto(e) => Self::Crypto(e),
            CodecError::NoUser => Self::Config(ConfigError::NoUser),
            other => Self::Codec(other),
        }
    }
}

impl From<WireError> for ClientError {
    fn from(err: WireError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl ClientError {
    /// Possible tampering or wrong-key use. Never retried automatically.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            Self::Crypto(CryptoError::AuthenticationFailed | CryptoError::MalformedCiphertext { .. })
                | Self::Friends(FriendError::KeyMismatch { .. })
        )
    }

    /// A relay hiccup that may succeed if the user simply tries again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Relay(e) | Self::Friends(FriendError::Lookup(e)) => e.is_transient(),
            _ => false,
        }
    }

    /// Message for the send status line.
    pub fn send_message(&self) -> String {
        match self {
            Self::Relay(RelayError::NotFound)
            | Self::Friends(FriendError::Lookup(RelayError::NotFound)) => {
                "This receiver ID does not exist.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_errors_are_regrouped() {
        let id = UserId::parse("55556666").unwrap();
        assert!(matches!(
            ClientError::from(CodecError::UnknownSender(id.clone())),
            ClientError::Trust(TrustError::UnknownSender(i)) if i == id
        ));
        assert!(matches!(
            ClientError::from(CodecError::Crypto(CryptoError::AuthenticationFailed)),
            ClientError::Crypto(CryptoError::AuthenticationFailed)
        ));
        assert!(matches!(
            ClientError::from(CodecError::NoUser),
            ClientError::Config(ConfigError::NoUser)
        ));
        assert!(matches!(
            ClientError::from(CodecError::EmptyContent),
            ClientError::Codec(CodecError::EmptyContent)
        ));
    }

    #[test]
    fn crypto_failures_are_security_events() {
        assert!(ClientError::from(CryptoError::AuthenticationFailed).is_security_event());
        assert!(ClientError::from(CryptoError::MalformedCiphertext { len: 3 }).is_security_event());
        assert!(!ClientError::from(RelayError::ServerDown).is_security_event());
        assert!(!ClientError::from(TrustError::NoPendingRequest).is_security_event());
    }

    #[test]
    fn only_relay_outages_are_transient() {
        assert!(ClientError::from(RelayError::ServerDown).is_transient());
        assert!(ClientError::from(FriendError::Lookup(RelayError::Network("reset".into()))).is_transient());
        assert!(!ClientError::from(RelayError::NotFound).is_transient());
        assert!(!ClientError::from(CryptoError::AuthenticationFailed).is_transient());
    }

    #[test]
    fn unknown_receiver_has_dedicated_message() {
        assert_eq!(
            ClientError::from(RelayError::NotFound).send_message(),
            "This receiver ID does not exist."
        );
        assert_eq!(
            ClientError::from(RelayError::PayloadTooLarge).send_message(),
            "Too much data."
        );
    }
}
