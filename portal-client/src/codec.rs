//! ContentCodec - clipboard payloads and their sealed metadata.
//!
//! A transfer is two independently sealed pieces:
//! - the metadata (`{"type", "filename"}`), carried in the [`SendEnvelope`]
//!   pushed to the receiver
//! - the content blob (UTF-8 text or raw file bytes), stored at the relay
//!
//! Opening the metadata never needs the blob, and the other way round.
//! Reading metadata is also where the trust boundary sits: a sender that is
//! not in the [`FriendStore`] yields [`CodecError::UnknownSender`].

use clipportal_core::{candidate_names, sanitize_filename};
use clipportal_types::{ContentKind, ContentMetadata, SendEnvelope, UserId, WireError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::crypto::{CryptoError, CryptoSession};
use crate::friends::{Friend, FriendStore};

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The sender is not a friend. A trust gate, not a failure.
    #[error("content from unknown sender {0}")]
    UnknownSender(UserId),

    /// Bytes do not match the declared content type.
    #[error("could not decode received content: {0}")]
    Decode(String),

    /// Sealing or opening failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Metadata (de)serialization failed.
    #[error("metadata error: {0}")]
    Wire(#[from] WireError),

    /// Reading a file to send, or staging a received one, failed.
    #[error("{path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The remote filename is unusable.
    #[error("invalid filename {0:?}")]
    InvalidFilename(String),

    /// Nothing to send.
    #[error("no sendable clipboard content")]
    EmptyContent,

    /// No local user id to put in the envelope.
    #[error("not registered with the relay yet")]
    NoUser,
}

/// Clipboard content held for one send or receive.
#[derive(Clone, PartialEq, Eq)]
pub enum ClipboardContent {
    /// Plain text.
    Text(String),
    /// A single file on local disk.
    File {
        /// Where the bytes live.
        path: PathBuf,
        /// Name presented to the peer.
        filename: String,
    },
}

impl ClipboardContent {
    /// Text content.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// File content, named after the last component of `path`.
    pub fn file(path: impl Into<PathBuf>) -> Result<Self, CodecError> {
        let path = path.into();
        let raw = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let filename = sanitize_filename(&raw).ok_or(CodecError::InvalidFilename(raw))?;
        Ok(Self::File { path, filename })
    }

    /// Text or file.
    pub fn kind(&self) -> ContentKind {
        match self {
            Self::Text(_) => ContentKind::Text,
            Self::File { .. } => ContentKind::File,
        }
    }

    /// The filename, for files.
    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::Text(_) => None,
            Self::File { filename, .. } => Some(filename),
        }
    }

    /// The metadata describing this content.
    pub fn metadata(&self) -> ContentMetadata {
        match self {
            Self::Text(_) => ContentMetadata::text(),
            Self::File { filename, .. } => ContentMetadata::file(filename.clone()),
        }
    }
}

// Clipboard text is user data; keep it out of logs
impl std::fmt::Debug for ClipboardContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => write!(f, "Text([{} bytes REDACTED])", text.len()),
            Self::File { path, filename } => f
                .debug_struct("File")
                .field("path", path)
                .field("filename", filename)
                .finish(),
        }
    }
}

/// Encodes, seals and opens clipboard transfers.
#[derive(Debug, Clone)]
pub struct ContentCodec {
    crypto: CryptoSession,
    friends: Arc<FriendStore>,
    staging_dir: PathBuf,
}

impl ContentCodec {
    /// Create a codec. Received files are written into `staging_dir`.
    pub fn new(crypto: CryptoSession, friends: Arc<FriendStore>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            crypto,
            friends,
            staging_dir: staging_dir.into(),
        }
    }

    /// Where received files land.
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Content to bytes: UTF-8 for text, raw bytes for a file.
    pub async fn encode(&self, content: &ClipboardContent) -> Result<Vec<u8>, CodecError> {
        match content {
            ClipboardContent::Text(text) if text.is_empty() => Err(CodecError::EmptyContent),
            ClipboardContent::Text(text) => Ok(text.as_bytes().to_vec()),
            ClipboardContent::File { path, .. } => {
                tokio::fs::read(path).await.map_err(|source| CodecError::Io {
                    path: path.clone(),
                    source,
                })
            }
        }
    }

    /// Bytes to content under the declared metadata.
    ///
    /// Files are written to a fresh, collision-free name in the staging
    /// directory; the returned content points there.
    pub async fn decode(&self, bytes: Vec<u8>, metadata: &ContentMetadata) -> Result<ClipboardContent, CodecError> {
        match metadata.kind {
            ContentKind::Text => String::from_utf8(bytes)
                .map(ClipboardContent::Text)
                .map_err(|e| CodecError::Decode(format!("text is not valid UTF-8: {}", e))),
            ContentKind::File => {
                let raw = metadata
                    .filename
                    .as_deref()
                    .ok_or_else(|| CodecError::Decode("file metadata without a filename".into()))?;
                let filename = sanitize_filename(raw)
                    .ok_or_else(|| CodecError::InvalidFilename(raw.to_string()))?;

                tokio::fs::create_dir_all(&self.staging_dir)
                    .await
                    .map_err(|source| CodecError::Io {
                        path: self.staging_dir.clone(),
                        source,
                    })?;
                let (path, file) = create_unique_file(&self.staging_dir, &filename).await?;
                if let Err(source) = write_staged(file, &bytes).await {
                    remove_staged(&path).await;
                    return Err(CodecError::Io { path, source });
                }
                tracing::debug!("staged {} bytes at {}", bytes.len(), path.display());
                Ok(ClipboardContent::File { path, filename })
            }
        }
    }

    /// Seal the metadata for `receiver` and wrap it with our user id.
    pub async fn build_metadata(&self, content: &ClipboardContent, receiver: &Friend) -> Result<SendEnvelope, CodecError> {
        let sender = self.friends.user_id().await.ok_or(CodecError::NoUser)?;
        let plain = content.metadata().to_bytes()?;
        let sealed = self.crypto.seal(&plain, &receiver.public_key)?;
        Ok(SendEnvelope::new(sender, sealed))
    }

    /// Encode and seal the content blob for `receiver`.
    pub async fn seal_content(&self, content: &ClipboardContent, receiver: &Friend) -> Result<Vec<u8>, CodecError> {
        let bytes = self.encode(content).await?;
        Ok(self.crypto.seal(&bytes, &receiver.public_key)?)
    }

    /// Resolve the claimed sender of an envelope to a friend.
    pub async fn sender(&self, envelope: &SendEnvelope) -> Result<Friend, CodecError> {
        self.friends
            .get(&envelope.sender_id)
            .await
            .ok_or_else(|| CodecError::UnknownSender(envelope.sender_id.clone()))
    }

    /// Open an envelope's metadata with the key of its claimed sender.
    pub async fn read_metadata(&self, envelope: &SendEnvelope) -> Result<ContentMetadata, CodecError> {
        let friend = self.sender(envelope).await?;
        self.open_metadata(envelope, &friend)
    }

    /// Open an envelope's metadata with a known friend's key.
    pub fn open_metadata(&self, envelope: &SendEnvelope, friend: &Friend) -> Result<ContentMetadata, CodecError> {
        let plain = self.crypto.open(&envelope.encrypted_metadata, &friend.public_key)?;
        Ok(ContentMetadata::from_bytes(&plain)?)
    }

    /// Open a downloaded blob from `friend` and decode it.
    pub async fn open_content(
        &self,
        blob: &[u8],
        metadata: &ContentMetadata,
        friend: &Friend,
    ) -> Result<ClipboardContent, CodecError> {
        let plain = self.crypto.open(blob, &friend.public_key)?;
        self.decode(plain, metadata).await
    }
}

async fn write_staged(mut file: tokio::fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await
}

/// Delete a staged file that will never reach the sink. Already gone is fine.
pub(crate) async fn remove_staged(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("discarded staged file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("could not remove staged file {}: {}", path.display(), e),
    }
}

/// Create `filename` in `dir`, or the first free `name-N.ext` variant.
pub async fn create_unique_file(dir: &Path, filename: &str) -> Result<(PathBuf, tokio::fs::File), CodecError> {
    for candidate in candidate_names(filename) {
        let path = dir.join(&candidate);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(source) => return Err(CodecError::Io { path, source }),
        }
    }
    Err(CodecError::InvalidFilename(filename.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Identity;
    use clipportal_types::PublicKeyBytes;
    use tempfile::tempdir;

    struct Side {
        codec: ContentCodec,
        friend: Friend,
    }

    /// Two codecs that know each other, with their own staging dirs.
    async fn pair(staging: &Path) -> (Side, Side) {
        let a_id = Arc::new(Identity::generate());
        let b_id = Arc::new(Identity::generate());
        let a_friend = Friend::new(UserId::parse("11112222").unwrap(), a_id.public_key());
        let b_friend = Friend::new(UserId::parse("33334444").unwrap(), b_id.public_key());

        let a_store = Arc::new(FriendStore::in_memory());
        a_store.set_user_id(a_friend.id.clone()).await.unwrap();
        a_store.add(b_friend.clone()).await.unwrap();

        let b_store = Arc::new(FriendStore::in_memory());
        b_store.set_user_id(b_friend.id.clone()).await.unwrap();
        b_store.add(a_friend.clone()).await.unwrap();

        (
            Side {
                codec: ContentCodec::new(CryptoSession::new(a_id), a_store, staging.join("a")),
                friend: a_friend,
            },
            Side {
                codec: ContentCodec::new(CryptoSession::new(b_id), b_store, staging.join("b")),
                friend: b_friend,
            },
        )
    }

    // ===========================================
    // Encode / decode
    // ===========================================

    #[tokio::test]
    async fn text_encodes_as_utf8() {
        let dir = tempdir().unwrap();
        let (a, _) = pair(dir.path()).await;
        let bytes = a.codec.encode(&ClipboardContent::text("grüße")).await.unwrap();
        assert_eq!(bytes, "grüße".as_bytes());
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let dir = tempdir().unwrap();
        let (a, _) = pair(dir.path()).await;
        assert!(matches!(
            a.codec.encode(&ClipboardContent::text("")).await,
            Err(CodecError::EmptyContent)
        ));
    }

    #[tokio::test]
    async fn invalid_utf8_is_decode_error() {
        let dir = tempdir().unwrap();
        let (a, _) = pair(dir.path()).await;
        let err = a
            .codec
            .decode(vec![0xff, 0xfe], &ContentMetadata::text())
            .await
            .unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[tokio::test]
    async fn file_is_staged_without_clobbering() {
        let dir = tempdir().unwrap();
        let (a, _) = pair(dir.path()).await;
        let meta = ContentMetadata::file("report.pdf");

        let first = a.codec.decode(b"one".to_vec(), &meta).await.unwrap();
        let second = a.codec.decode(b"two".to_vec(), &meta).await.unwrap();

        let (ClipboardContent::File { path: p1, .. }, ClipboardContent::File { path: p2, .. }) =
            (first, second)
        else {
            panic!("expected files");
        };
        assert_eq!(p1.file_name().unwrap(), "report.pdf");
        assert_eq!(p2.file_name().unwrap(), "report-2.pdf");
        assert_eq!(std::fs::read(&p1).unwrap(), b"one");
        assert_eq!(std::fs::read(&p2).unwrap(), b"two");
    }

    #[tokio::test]
    async fn remote_path_components_are_stripped() {
        let dir = tempdir().unwrap();
        let (a, _) = pair(dir.path()).await;

        let content = a
            .codec
            .decode(b"x".to_vec(), &ContentMetadata::file("../../evil.sh"))
            .await
            .unwrap();
        let ClipboardContent::File { path, filename } = content else {
            panic!("expected file");
        };
        assert_eq!(filename, "evil.sh");
        assert_eq!(path.parent().unwrap(), a.codec.staging_dir());
    }

    #[tokio::test]
    async fn unusable_filenames_are_rejected() {
        let dir = tempdir().unwrap();
        let (a, _) = pair(dir.path()).await;

        for bad in ["..", "a/", ""] {
            let err = a
                .codec
                .decode(b"x".to_vec(), &ContentMetadata::file(bad))
                .await
                .unwrap_err();
            assert!(matches!(err, CodecError::InvalidFilename(_)), "{:?}", bad);
        }

        let missing = ContentMetadata {
            kind: ContentKind::File,
            filename: None,
        };
        assert!(matches!(
            a.codec.decode(b"x".to_vec(), &missing).await,
            Err(CodecError::Decode(_))
        ));
    }

    // ===========================================
    // Metadata
    // ===========================================

    #[tokio::test]
    async fn metadata_round_trips_between_friends() {
        let dir = tempdir().unwrap();
        let (a, b) = pair(dir.path()).await;

        let content = ClipboardContent::File {
            path: dir.path().join("report.pdf"),
            filename: "report.pdf".into(),
        };
        let envelope = a.codec.build_metadata(&content, &b.friend).await.unwrap();

        assert_eq!(envelope.sender_id, a.friend.id);
        assert_eq!(
            b.codec.read_metadata(&envelope).await.unwrap(),
            ContentMetadata::file("report.pdf")
        );
    }

    #[tokio::test]
    async fn metadata_is_not_readable_in_transit() {
        let dir = tempdir().unwrap();
        let (a, b) = pair(dir.path()).await;

        let envelope = a
            .codec
            .build_metadata(&ClipboardContent::text("secret"), &b.friend)
            .await
            .unwrap();
        let json = envelope.to_json().unwrap();

        assert!(!json.contains("\"type\""));
        assert!(!json.contains("text"));
    }

    #[tokio::test]
    async fn unknown_sender_is_gated() {
        let dir = tempdir().unwrap();
        let (_, b) = pair(dir.path()).await;
        let stranger = SendEnvelope::new(UserId::parse("55556666").unwrap(), vec![0; 40]);

        match b.codec.read_metadata(&stranger).await {
            Err(CodecError::UnknownSender(id)) => assert_eq!(id.as_str(), "55556666"),
            other => panic!("expected UnknownSender, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn metadata_from_impostor_fails_authentication() {
        let dir = tempdir().unwrap();
        let (a, b) = pair(dir.path()).await;

        // Someone else claims to be A.
        let impostor = CryptoSession::new(Arc::new(Identity::generate()));
        let sealed = impostor
            .seal(&ContentMetadata::text().to_bytes().unwrap(), &b.friend.public_key)
            .unwrap();
        let forged = SendEnvelope::new(a.friend.id.clone(), sealed);

        assert!(matches!(
            b.codec.read_metadata(&forged).await,
            Err(CodecError::Crypto(CryptoError::AuthenticationFailed))
        ));
    }

    #[tokio::test]
    async fn build_metadata_requires_user_id() {
        let dir = tempdir().unwrap();
        let codec = ContentCodec::new(
            CryptoSession::new(Arc::new(Identity::generate())),
            Arc::new(FriendStore::in_memory()),
            dir.path(),
        );
        let receiver = Friend::new(UserId::parse("33334444").unwrap(), PublicKeyBytes::new([9; 32]));

        assert!(matches!(
            codec.build_metadata(&ClipboardContent::text("hi"), &receiver).await,
            Err(CodecError::NoUser)
        ));
    }

    // ===========================================
    // Content
    // ===========================================

    #[tokio::test]
    async fn file_content_round_trips_exactly() {
        let dir = tempdir().unwrap();
        let (a, b) = pair(dir.path()).await;
        let source = dir.path().join("report.pdf");
        let bytes: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        std::fs::write(&source, &bytes).unwrap();

        let content = ClipboardContent::file(&source).unwrap();
        let blob = a.codec.seal_content(&content, &b.friend).await.unwrap();
        let received = b
            .codec
            .open_content(&blob, &ContentMetadata::file("report.pdf"), &a.friend)
            .await
            .unwrap();

        let ClipboardContent::File { path, filename } = received else {
            panic!("expected file");
        };
        assert_eq!(filename, "report.pdf");
        assert_eq!(std::fs::read(path).unwrap(), bytes);
    }

    #[tokio::test]
    async fn missing_source_file_is_io_error() {
        let dir = tempdir().unwrap();
        let (a, b) = pair(dir.path()).await;
        let content = ClipboardContent::file(dir.path().join("gone.txt")).unwrap();

        assert!(matches!(
            a.codec.seal_content(&content, &b.friend).await,
            Err(CodecError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn remove_staged_deletes_and_tolerates_missing() {
        let dir = tempdir().unwrap();
        let (path, file) = create_unique_file(dir.path(), "report.pdf").await.unwrap();
        drop(file);

        remove_staged(&path).await;
        assert!(!path.exists());
        // Second call is a no-op.
        remove_staged(&path).await;
    }

    #[test]
    fn debug_hides_text() {
        let shown = format!("{:?}", ClipboardContent::text("hunter2"));
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("REDACTED"));
    }
}
