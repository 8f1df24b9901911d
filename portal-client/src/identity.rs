//! Persistent storage for the installation's identity key.
//!
//! The private key lives in a [`SecretStore`]. [`load_or_create`] generates
//! it on first run and writes it exactly once; later runs read it back.

use base64::{engine::general_purpose::STANDARD, Engine};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::{Identity, KEY_SIZE};

/// Account name of the private key entry.
pub const PRIVATE_KEY_ACCOUNT: &str = "private-key";

/// Identity storage errors.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The secure store could not be read or written.
    #[error("secure storage error: {0}")]
    SecureStore(String),

    /// A stored key exists but is unusable.
    #[error("stored identity key is corrupt: {0}")]
    Corrupt(String),

    /// File-backed store I/O failure.
    #[error("identity file {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// A place to keep the private key.
pub trait SecretStore: Send + Sync {
    /// Read the stored key bytes, `None` if nothing was stored yet.
    fn load(&self) -> Result<Option<Zeroizing<Vec<u8>>>, IdentityError>;

    /// Store key bytes.
    fn store(&self, secret: &[u8]) -> Result<(), IdentityError>;
}

/// Load the stored identity without ever creating one.
pub fn load_existing(store: &dyn SecretStore) -> Result<Option<Identity>, IdentityError> {
    let Some(bytes) = store.load()? else {
        return Ok(None);
    };
    let secret: [u8; KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
        IdentityError::Corrupt(format!("expected {} bytes, got {}", KEY_SIZE, bytes.len()))
    })?;
    let identity = Identity::from_secret_bytes(secret);
    tracing::debug!("loaded identity {}", identity.public_key().fingerprint());
    Ok(Some(identity))
}

/// Load the identity, generating and storing one on first run.
pub fn load_or_create(store: &dyn SecretStore) -> Result<Identity, IdentityError> {
    if let Some(identity) = load_existing(store)? {
        return Ok(identity);
    }

    let identity = Identity::generate();
    store.store(identity.secret_bytes().as_slice())?;
    tracing::info!(
        "generated new identity {}",
        identity.public_key().fingerprint()
    );
    Ok(identity)
}

/// OS credential store (Keychain, Credential Manager, kernel keyring).
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    /// Use entries under the given service name.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, IdentityError> {
        keyring::Entry::new(&self.service, PRIVATE_KEY_ACCOUNT)
            .map_err(|e| IdentityError::SecureStore(format!("keychain entry creation: {e}")))
    }
}

impl SecretStore for KeyringStore {
    fn load(&self) -> Result<Option<Zeroizing<Vec<u8>>>, IdentityError> {
        match self.entry()?.get_password() {
            Ok(password) => {
                let password = Zeroizing::new(password);
                STANDARD
                    .decode(password.trim())
                    .map(|bytes| Some(Zeroizing::new(bytes)))
                    .map_err(|e| IdentityError::Corrupt(e.to_string()))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(IdentityError::SecureStore(format!("keychain read: {e}"))),
        }
    }

    fn store(&self, secret: &[u8]) -> Result<(), IdentityError> {
        let encoded = Zeroizing::new(STANDARD.encode(secret));
        self.entry()?
            .set_password(&encoded)
            .map_err(|e| IdentityError::SecureStore(format!("keychain write: {e}")))?;
        tracing::debug!(service = %self.service, "stored identity in platform keychain");
        Ok(())
    }
}

/// Owner-only file, for hosts without a credential store.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    /// Keep the key in `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(&self, source: std::io::Error) -> IdentityError {
        IdentityError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SecretStore for FileSecretStore {
    fn load(&self) -> Result<Option<Zeroizing<Vec<u8>>>, IdentityError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let contents = Zeroizing::new(contents);
                STANDARD
                    .decode(contents.trim())
                    .map(|bytes| Some(Zeroizing::new(bytes)))
                    .map_err(|e| IdentityError::Corrupt(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn store(&self, secret: &[u8]) -> Result<(), IdentityError> {
        let encoded = Zeroizing::new(STANDARD.encode(secret));
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(|e| self.io_error(e))?;
        std::io::Write::write_all(&mut file, encoded.as_bytes()).map_err(|e| self.io_error(e))?;
        file.sync_all().map_err(|e| self.io_error(e))
    }
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    slot: Mutex<Option<Vec<u8>>>,
    writes: AtomicUsize,
}

impl MemorySecretStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `store` was called.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SecretStore for MemorySecretStore {
    fn load(&self) -> Result<Option<Zeroizing<Vec<u8>>>, IdentityError> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| IdentityError::SecureStore("store lock poisoned".into()))?;
        Ok(slot.clone().map(Zeroizing::new))
    }

    fn store(&self, secret: &[u8]) -> Result<(), IdentityError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| IdentityError::SecureStore("store lock poisoned".into()))?;
        *slot = Some(secret.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
