//! Client configuration.
//!
//! Loaded from an optional TOML file. Every field has a default, so an empty
//! file (or no file) yields a working configuration for the public relay.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Relay endpoints, timeouts and secure-store naming.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// HTTP base URL of the relay.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// WebSocket base URL of the relay (`/ws` is appended).
    #[serde(default = "default_websocket_url")]
    pub websocket_url: String,
    /// Upper bound for each HTTP request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Upper bound for establishing a connection (HTTP and push channel).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Service name of the OS credential store entry.
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,
}

fn default_server_url() -> String {
    "https://clipboardportal.pschwind.de".to_string()
}

fn default_websocket_url() -> String {
    "wss://clipboardportal.pschwind.de".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_keyring_service() -> String {
    "clipboard-portal".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            websocket_url: default_websocket_url(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            keyring_service: default_keyring_service(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Per-request HTTP timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// No outgoing receiver has been set.
    #[error("No receiver ID configured. Set one before sending.")]
    NoReceiverConfigured,
    /// The identity key is not available.
    #[error("No identity key available.")]
    NoIdentity,
    /// This installation has not registered with the relay yet.
    #[error("Not registered with the relay yet.")]
    NoUser,
}
