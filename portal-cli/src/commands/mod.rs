//! CLI command implementations.

pub mod friends;
pub mod init;
pub mod listen;
pub mod receiver;
pub mod send;
pub mod status;

use anyhow::{Context, Result};
use clipportal_client::{
    load_existing, load_or_create, ClientConfig, ConfigError, ContentCodec, CryptoSession, FileSecretStore, FriendStore,
    HttpRelay, Identity, KeyringStore, SecretStore, TransferClient,
};
use std::path::PathBuf;
use std::sync::Arc;

const USER_FILE: &str = "user.json";
const IDENTITY_FILE: &str = "identity.key";
const STAGING_DIR: &str = "incoming";

/// Everything a command needs to build the client services.
#[derive(Debug)]
pub struct App {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Relay endpoints and timeouts.
    pub config: ClientConfig,
    /// Keep the identity key in a file instead of the OS credential store.
    pub file_keystore: bool,
}

impl App {
    /// The configured identity key store.
    pub fn secret_store(&self) -> Box<dyn SecretStore> {
        if self.file_keystore {
            Box::new(FileSecretStore::new(self.data_dir.join(IDENTITY_FILE)))
        } else {
            Box::new(KeyringStore::new(self.config.keyring_service.clone()))
        }
    }

    /// Load the identity, creating it on first use.
    pub fn identity(&self) -> Result<Arc<Identity>> {
        let identity = load_or_create(self.secret_store().as_ref())
            .context("Failed to load identity key")?;
        Ok(Arc::new(identity))
    }

    /// Load the identity if one exists; never creates a key.
    pub fn stored_identity(&self) -> Result<Option<Arc<Identity>>> {
        let identity = load_existing(self.secret_store().as_ref())
            .context("Failed to read identity key")?;
        Ok(identity.map(Arc::new))
    }

    /// Load the identity created by `init`.
    pub fn existing_identity(&self) -> Result<Arc<Identity>> {
        self.stored_identity()?
            .ok_or(ConfigError::NoIdentity)
            .context("Run 'portal-cli init' first")
    }

    /// Open the friend store.
    pub async fn friends(&self) -> Result<Arc<FriendStore>> {
        let store = FriendStore::open(self.data_dir.join(USER_FILE))
            .await
            .context("Failed to open friend store")?;
        Ok(Arc::new(store))
    }

    /// HTTP client for the relay.
    pub fn relay(&self) -> Result<Arc<HttpRelay>> {
        let relay = HttpRelay::new(
            &self.config.server_url,
            self.config.request_timeout(),
            self.config.connect_timeout(),
        )
        .context("Failed to create HTTP client")?;
        Ok(Arc::new(relay))
    }

    /// Where received files are staged before being moved.
    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join(STAGING_DIR)
    }

    /// A transfer client over the real relay.
    pub fn transfer(&self, identity: Arc<Identity>, friends: Arc<FriendStore>) -> Result<TransferClient> {
        let codec = ContentCodec::new(
            CryptoSession::new(identity),
            Arc::clone(&friends),
            self.staging_dir(),
        );
        Ok(TransferClient::new(self.relay()?, codec, friends))
    }
}
