//! Relay transports for Clipboard Portal.
//!
//! Two seams, both pluggable:
//! - [`RelayApi`]: the request/response HTTP surface (register, key lookup,
//!   upload, download)
//! - [`PushConnector`] / [`PushChannel`]: the long-lived push channel
//!
//! Real implementations are [`HttpRelay`] (reqwest) and [`WsConnector`]
//! (tokio-tungstenite). [`MockRelay`] implements both in memory for tests.

mod http;
mod mock;
mod ws;

pub use http::HttpRelay;
pub use mock::MockRelay;
pub use ws::WsConnector;

use async_trait::async_trait;
use clipportal_types::{PublicKeyBytes, SendEnvelope, UserId};
use thiserror::Error;

/// Errors from the relay's HTTP surface.
///
/// Status codes map to typed variants so callers can report them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// Connect failure, timeout, or broken connection.
    #[error("A network error occurred. Please check your connection and try again. ({0})")]
    Network(String),

    /// 400
    #[error("Bad request. Please check the request and try again.")]
    BadRequest,

    /// 403
    #[error("Forbidden. You don't have permission to access this resource.")]
    Forbidden,

    /// 404
    #[error("Resource not found.")]
    NotFound,

    /// 413
    #[error("Too much data.")]
    PayloadTooLarge,

    /// 422
    #[error("The app sent invalid data to the server. Please update the app.")]
    UnprocessableEntity,

    /// 500
    #[error("A server error occurred. Please try again later.")]
    ServerError,

    /// 502
    #[error("The server is offline. Please try again later.")]
    ServerDown,

    /// Any other non-success status.
    #[error("An unknown error occurred (HTTP {0}).")]
    UnexpectedStatus(u16),

    /// The body did not have the expected shape.
    #[error("The server response was not expected. Please update the app. ({0})")]
    BrokenResponse(String),

    /// The request could not be built locally.
    #[error("could not build request: {0}")]
    Request(String),
}

impl RelayError {
    /// Map a non-success HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            413 => Self::PayloadTooLarge,
            422 => Self::UnprocessableEntity,
            500 => Self::ServerError,
            502 => Self::ServerDown,
            other => Self::UnexpectedStatus(other),
        }
    }

    /// Whether retrying later could help.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::ServerError | Self::ServerDown)
    }
}

/// The relay's request/response surface.
#[async_trait]
pub trait RelayApi: Send + Sync {
    /// `POST /users`: register a public key, get a user id.
    async fn register(&self, public_key: &PublicKeyBytes) -> Result<UserId, RelayError>;

    /// `GET /{id}.publickey`: look up a peer's public key.
    async fn fetch_public_key(&self, id: &UserId) -> Result<PublicKeyBytes, RelayError>;

    /// `POST /send/{receiver}`: store a blob for `receiver` and notify them.
    async fn upload(
        &self,
        receiver: &UserId,
        envelope: &SendEnvelope,
        blob: Vec<u8>,
    ) -> Result<(), RelayError>;

    /// `GET /{id}`: fetch the blob currently stored for `id`.
    async fn download(&self, id: &UserId) -> Result<Vec<u8>, RelayError>;
}

/// Push channel errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,
}

/// Opens push channels to the relay.
#[async_trait]
pub trait PushConnector: Send + Sync {
    /// Open a new channel. No greeting is sent yet.
    async fn open(&self) -> Result<Box<dyn PushChannel>, TransportError>;
}

/// One open push channel.
///
/// `next_frame` must be cancel-safe: it is raced against timers.
#[async_trait]
pub trait PushChannel: Send {
    /// Send a text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Send a protocol-level ping.
    async fn ping(&mut self) -> Result<(), TransportError>;

    /// Wait for the next text frame. `None` once the channel is closed.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the channel. Errors are irrelevant at this point.
    async fn close(&mut self);
}
