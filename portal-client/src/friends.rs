//! FriendStore - the local trust boundary.
//!
//! Maps friend user ids to their public keys and remembers our own relay
//! id. Persisted as JSON (`{"id": ..., "friends": [{"id", "publicKey"}]}`).
//!
//! Friends are append-only. A friend's key is never replaced: a different
//! key for a known id is rejected with [`FriendError::KeyMismatch`].
//! Every mutation is written to disk before the call returns, under one lock,
//! so concurrent adds cannot lose each other.

use clipportal_types::{PublicKeyBytes, UserId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::transport::{RelayApi, RelayError};

/// FriendStore errors.
#[derive(Debug, Error)]
pub enum FriendError {
    /// A different key is already stored for this id.
    #[error("friend {id} already has a different public key; refusing to replace it")]
    KeyMismatch {
        /// The friend id.
        id: UserId,
    },

    /// Our own user id is already set to something else.
    #[error("this installation is already registered as {existing}")]
    UserAlreadySet {
        /// The stored id.
        existing: UserId,
    },

    /// Key lookup at the relay failed.
    #[error("public key lookup failed: {0}")]
    Lookup(#[from] RelayError),

    /// Reading or writing the store file failed.
    #[error("friend store {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The store file is not valid JSON of the expected shape.
    #[error("friend store {path} is corrupt: {source}")]
    Corrupt {
        /// File path.
        path: PathBuf,
        /// Parse error.
        source: serde_json::Error,
    },
}

/// A peer whose key we trust.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    /// Relay user id.
    pub id: UserId,
    /// X25519 public key.
    #[serde(rename = "publicKey")]
    pub public_key: PublicKeyBytes,
}

impl Friend {
    /// Create a friend record.
    pub fn new(id: UserId, public_key: PublicKeyBytes) -> Self {
        Self { id, public_key }
    }
}

/// Result of [`FriendStore::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Newly stored.
    Added,
    /// Already present with the same key; nothing written.
    AlreadyKnown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserRecord {
    #[serde(default)]
    id: Option<UserId>,
    #[serde(default)]
    friends: Vec<Friend>,
}

/// Durable friend list plus our own user id.
#[derive(Debug)]
pub struct FriendStore {
    path: Option<PathBuf>,
    record: Mutex<UserRecord>,
}

impl FriendStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, FriendError> {
        let path = path.into();
        let record = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| FriendError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => UserRecord::default(),
            Err(source) => return Err(FriendError::Io { path, source }),
        };
        Ok(Self {
            path: Some(path),
            record: Mutex::new(record),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            record: Mutex::new(UserRecord::default()),
        }
    }

    /// Our relay user id, once registered.
    pub async fn user_id(&self) -> Option<UserId> {
        self.record.lock().await.id.clone()
    }

    /// Record our relay user id. Setting the same id again is a no-op.
    pub async fn set_user_id(&self, id: UserId) -> Result<(), FriendError> {
        let mut record = self.record.lock().await;
        match &record.id {
            Some(existing) if *existing == id => return Ok(()),
            Some(existing) => {
                return Err(FriendError::UserAlreadySet {
                    existing: existing.clone(),
                })
            }
            None => {}
        }
        let mut updated = record.clone();
        updated.id = Some(id);
        self.persist(&updated).await?;
        *record = updated;
        Ok(())
    }

    /// Look up a friend.
    pub async fn get(&self, id: &UserId) -> Option<Friend> {
        self.record
            .lock()
            .await
            .friends
            .iter()
            .find(|f| f.id == *id)
            .cloned()
    }

    /// All friends, in the order they were added.
    pub async fn list(&self) -> Vec<Friend> {
        self.record.lock().await.friends.clone()
    }

    /// Store a friend. Durable before returning.
    pub async fn add(&self, friend: Friend) -> Result<AddOutcome, FriendError> {
        let mut record = self.record.lock().await;
        if let Some(existing) = record.friends.iter().find(|f| f.id == friend.id) {
            if existing.public_key == friend.public_key {
                return Ok(AddOutcome::AlreadyKnown);
            }
            tracing::warn!(
                "friend {} presented key {} but {} is stored; rejected",
                friend.id,
                friend.public_key.fingerprint(),
                existing.public_key.fingerprint()
            );
            return Err(FriendError::KeyMismatch { id: friend.id });
        }

        let mut updated = record.clone();
        updated.friends.push(friend.clone());
        self.persist(&updated).await?;
        *record = updated;
        tracing::info!(
            "added friend {} ({})",
            friend.id,
            friend.public_key.fingerprint()
        );
        Ok(AddOutcome::Added)
    }

    /// Look up a friend, fetching and storing their key from the relay if
    /// unknown. Durable before returning.
    pub async fn get_or_fetch(&self, id: &UserId, relay: &dyn RelayApi) -> Result<Friend, FriendError> {
        if let Some(friend) = self.get(id).await {
            return Ok(friend);
        }
        let public_key = relay.fetch_public_key(id).await?;
        let friend = Friend::new(id.clone(), public_key);
        self.add(friend.clone()).await?;
        Ok(friend)
    }

    /// Write the record atomically: temp file, fsync, rename.
    async fn persist(&self, record: &UserRecord) -> Result<(), FriendError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| FriendError::Io {
            path: path.clone(),
            source,
        };

        let json = serde_json::to_vec_pretty(record).map_err(|source| FriendError::Corrupt {
            path: path.clone(),
            source,
        })?;
        let tmp = temp_path(path);
        {
            let mut options = tokio::fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            options.mode(0o600);
            let mut file = options.open(&tmp).await.map_err(io_err)?;
            tokio::io::AsyncWriteExt::write_all(&mut file, &json)
                .await
                .map_err(io_err)?;
            file.sync_all().await.map_err(io_err)?;
        }
        tokio::fs::rename(&tmp, path).await.map_err(io_err)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockRelay;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn key(b: u8) -> PublicKeyBytes {
        PublicKeyBytes::new([b; 32])
    }

    // ===========================================
    // Add / get
    // ===========================================

    #[tokio::test]
    async fn add_then_get() {
        let store = FriendStore::in_memory();
        let friend = Friend::new(uid("33334444"), key(3));

        assert_eq!(store.add(friend.clone()).await.unwrap(), AddOutcome::Added);
        assert_eq!(store.get(&uid("33334444")).await, Some(friend));
        assert_eq!(store.get(&uid("11112222")).await, None);
    }

    #[tokio::test]
    async fn add_same_key_is_idempotent() {
        let store = FriendStore::in_memory();
        let friend = Friend::new(uid("33334444"), key(3));

        store.add(friend.clone()).await.unwrap();
        assert_eq!(store.add(friend).await.unwrap(), AddOutcome::AlreadyKnown);
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn add_different_key_is_rejected_and_original_kept() {
        let store = FriendStore::in_memory();
        store.add(Friend::new(uid("33334444"), key(3))).await.unwrap();

        let err = store
            .add(Friend::new(uid("33334444"), key(9)))
            .await
            .unwrap_err();

        assert!(matches!(err, FriendError::KeyMismatch { id } if id == uid("33334444")));
        assert_eq!(store.get(&uid("33334444")).await.unwrap().public_key, key(3));
    }

    // ===========================================
    // Persistence
    // ===========================================

    #[tokio::test]
    async fn friends_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user.json");

        let store = FriendStore::open(&path).await.unwrap();
        store.set_user_id(uid("11112222")).await.unwrap();
        store.add(Friend::new(uid("33334444"), key(3))).await.unwrap();
        drop(store);

        let reopened = FriendStore::open(&path).await.unwrap();
        assert_eq!(reopened.user_id().await, Some(uid("11112222")));
        assert_eq!(
            reopened.get(&uid("33334444")).await,
            Some(Friend::new(uid("33334444"), key(3)))
        );
    }

    #[tokio::test]
    async fn file_format_uses_base64_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user.json");
        let store = FriendStore::open(&path).await.unwrap();
        store.add(Friend::new(uid("33334444"), key(0))).await.unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(value["id"].is_null());
        assert_eq!(value["friends"][0]["id"], "33334444");
        assert_eq!(
            value["friends"][0]["publicKey"],
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn store_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("user.json");
        let store = FriendStore::open(&path).await.unwrap();
        store.add(Friend::new(uid("33334444"), key(3))).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user.json");
        std::fs::write(&path, b"{not json").unwrap();

        assert!(matches!(
            FriendStore::open(&path).await,
            Err(FriendError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_adds_are_all_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user.json");
        let store = Arc::new(FriendStore::open(&path).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..20u8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let id = UserId::parse(&format!("{:08}", i)).unwrap();
                store.add(Friend::new(id, key(i + 1))).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let reopened = FriendStore::open(&path).await.unwrap();
        assert_eq!(reopened.list().await.len(), 20);
    }

    // ===========================================
    // User id
    // ===========================================

    #[tokio::test]
    async fn user_id_is_set_once() {
        let store = FriendStore::in_memory();
        store.set_user_id(uid("11112222")).await.unwrap();
        store.set_user_id(uid("11112222")).await.unwrap();

        assert!(matches!(
            store.set_user_id(uid("99998888")).await,
            Err(FriendError::UserAlreadySet { .. })
        ));
    }

    // ===========================================
    // get_or_fetch
    // ===========================================

    #[tokio::test]
    async fn get_or_fetch_stores_fetched_key() {
        let relay = MockRelay::new();
        relay.add_user(&uid("33334444"), key(3));
        let store = FriendStore::in_memory();

        let friend = store.get_or_fetch(&uid("33334444"), &relay).await.unwrap();

        assert_eq!(friend.public_key, key(3));
        assert_eq!(store.get(&uid("33334444")).await, Some(friend));
    }

    #[tokio::test]
    async fn get_or_fetch_prefers_stored_key() {
        let relay = MockRelay::new();
        relay.add_user(&uid("33334444"), key(9));
        let store = FriendStore::in_memory();
        store.add(Friend::new(uid("33334444"), key(3))).await.unwrap();

        let friend = store.get_or_fetch(&uid("33334444"), &relay).await.unwrap();
        assert_eq!(friend.public_key, key(3));
    }

    #[tokio::test]
    async fn get_or_fetch_unknown_user_fails() {
        let relay = MockRelay::new();
        let store = FriendStore::in_memory();

        let err = store
            .get_or_fetch(&uid("33334444"), &relay)
            .await
            .unwrap_err();
        assert!(matches!(err, FriendError::Lookup(RelayError::NotFound)));
        assert!(store.list().await.is_empty());
    }
}
