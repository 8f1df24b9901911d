//! # clipportal-client
//!
//! Client library for Clipboard Portal, an end-to-end encrypted clipboard
//! relay.
//!
//! Two paired devices exchange text or a single file through a relay that
//! only ever sees ciphertext and sender ids.
//!
//! ## Features
//!
//! - **E2E Encryption**: X25519 + HKDF-SHA256 pair keys, ChaCha20-Poly1305
//! - **Trust Gate**: content from unknown senders waits for accept/deny
//! - **Transport Abstraction**: Pluggable relay layer (HTTP + WebSocket, mock)
//! - **Pure State Machine**: Uses clipportal-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use clipportal_client::{ClipboardContent, ClipboardSession, SessionOptions, SessionServices};
//!
//! let session = ClipboardSession::new(services, SessionOptions::default());
//! session.register().await?;
//! session.start_connection().await?;
//!
//! // Send to the configured receiver
//! session.send(&ClipboardContent::text("hello"), Some(&receiver)).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod error;
pub mod friends;
pub mod identity;
pub mod session;
pub mod transfer;
pub mod transport;
pub mod trust;

pub use codec::{ClipboardContent, CodecError, ContentCodec};
pub use config::{ClientConfig, ConfigError};
pub use connection::{ConnectionHandle, ConnectionStatus, RelayConnection};
pub use crypto::{CryptoError, CryptoSession, Identity, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{ClientError, TrustError};
pub use friends::{AddOutcome, Friend, FriendError, FriendStore};
pub use identity::{
    load_existing, load_or_create, FileSecretStore, IdentityError, KeyringStore,
    MemorySecretStore, SecretStore,
};
pub use session::{
    ClipboardSession, ClipboardSink, ReceiveOutcome, SessionEvent, SessionOptions,
    SessionServices, SessionStatus,
};
pub use transfer::TransferClient;
pub use transport::{
    HttpRelay, MockRelay, PushChannel, PushConnector, RelayApi, RelayError, TransportError,
    WsConnector,
};
pub use trust::{Accepted, TrustNegotiator};
