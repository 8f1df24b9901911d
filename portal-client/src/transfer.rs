//! TransferClient - upload and download against the relay's HTTP surface.

use clipportal_types::UserId;
use std::sync::Arc;

use crate::codec::{ClipboardContent, ContentCodec};
use crate::config::ConfigError;
use crate::crypto::Identity;
use crate::error::ClientError;
use crate::friends::{Friend, FriendStore};
use crate::transport::RelayApi;

/// Sends clipboard content to friends and fetches what was sent to us.
#[derive(Clone)]
pub struct TransferClient {
    api: Arc<dyn RelayApi>,
    codec: ContentCodec,
    friends: Arc<FriendStore>,
}

impl TransferClient {
    /// Create a transfer client.
    pub fn new(api: Arc<dyn RelayApi>, codec: ContentCodec, friends: Arc<FriendStore>) -> Self {
        Self { api, codec, friends }
    }

    /// The codec in use.
    pub fn codec(&self) -> &ContentCodec {
        &self.codec
    }

    /// Register our public key and persist the assigned user id.
    ///
    /// Returns the existing id without contacting the relay if we are
    /// already registered.
    pub async fn register(&self, identity: &Identity) -> Result<UserId, ClientError> {
        if let Some(id) = self.friends.user_id().await {
            return Ok(id);
        }
        let id = self.api.register(&identity.public_key()).await?;
        self.friends.set_user_id(id.clone()).await?;
        Ok(id)
    }

    /// Seal `content` for `receiver` and upload it with its envelope.
    pub async fn send(&self, content: &ClipboardContent, receiver: &Friend) -> Result<(), ClientError> {
        let envelope = self.codec.build_metadata(content, receiver).await?;
        let blob = self.codec.seal_content(content, receiver).await?;
        let size = blob.len();
        self.api.upload(&receiver.id, &envelope, blob).await?;
        tracing::info!("sent {} ({} bytes) to {}", content.kind(), size, receiver.id);
        Ok(())
    }

    /// Send to the configured receiver, looking up their key if needed.
    pub async fn send_to(
        &self,
        content: &ClipboardContent,
        receiver: Option<&UserId>,
    ) -> Result<Friend, ClientError> {
        let receiver = receiver.ok_or(ConfigError::NoReceiverConfigured)?;
        let friend = self.friends.get_or_fetch(receiver, self.api.as_ref()).await?;
        self.send(content, &friend).await?;
        Ok(friend)
    }

    /// Download the blob currently stored for us.
    ///
    /// `sender` is who the push event named; the relay slot is addressed by
    /// our own id and holds whatever was written last.
    pub async fn receive(&self, sender: &UserId) -> Result<Vec<u8>, ClientError> {
        let me = self.friends.user_id().await.ok_or(ConfigError::NoUser)?;
        let blob = self.api.download(&me).await?;
        tracing::debug!("downloaded {} bytes announced by {}", blob.len(), sender);
        Ok(blob)
    }
}

impl std::fmt::Debug for TransferClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferClient")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CryptoSession;
    use crate::transport::{MockRelay, RelayError};
    use clipportal_types::ContentMetadata;
    use tempfile::tempdir;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    async fn client(relay: &MockRelay, identity: Arc<Identity>, staging: &std::path::Path) -> TransferClient {
        let friends = Arc::new(FriendStore::in_memory());
        let codec = ContentCodec::new(CryptoSession::new(identity), Arc::clone(&friends), staging);
        TransferClient::new(Arc::new(relay.clone()), codec, friends)
    }

    #[tokio::test]
    async fn register_persists_assigned_id_once() {
        let dir = tempdir().unwrap();
        let relay = MockRelay::new();
        let identity = Arc::new(Identity::generate());
        let client = client(&relay, Arc::clone(&identity), dir.path()).await;

        let first = client.register(&identity).await.unwrap();
        let second = client.register(&identity).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(client.friends.user_id().await, Some(first.clone()));
        assert_eq!(relay.fetch_public_key(&first).await.unwrap(), identity.public_key());
    }

    #[tokio::test]
    async fn send_uploads_envelope_and_blob_for_receiver() {
        let dir = tempdir().unwrap();
        let relay = MockRelay::new();
        let a_identity = Arc::new(Identity::generate());
        let b_identity = Arc::new(Identity::generate());
        let a = client(&relay, Arc::clone(&a_identity), dir.path()).await;
        let b = client(&relay, Arc::clone(&b_identity), dir.path()).await;
        let a_id = a.register(&a_identity).await.unwrap();
        let b_id = b.register(&b_identity).await.unwrap();

        let friend = a
            .send_to(&ClipboardContent::text("hello"), Some(&b_id))
            .await
            .unwrap();
        assert_eq!(friend.public_key, b_identity.public_key());

        let envelope = relay.stored_envelope(&b_id).unwrap();
        assert_eq!(envelope.sender_id, a_id);

        // B reads it with A's key.
        let a_friend = Friend::new(a_id.clone(), a_identity.public_key());
        b.friends.add(a_friend.clone()).await.unwrap();
        let metadata = b.codec.read_metadata(&envelope).await.unwrap();
        assert_eq!(metadata, ContentMetadata::text());

        let blob = b.receive(&a_id).await.unwrap();
        let content = b.codec.open_content(&blob, &metadata, &a_friend).await.unwrap();
        assert_eq!(content, ClipboardContent::text("hello"));
    }

    #[tokio::test]
    async fn send_without_receiver_is_config_error() {
        let dir = tempdir().unwrap();
        let relay = MockRelay::new();
        let identity = Arc::new(Identity::generate());
        let client = client(&relay, Arc::clone(&identity), dir.path()).await;
        client.register(&identity).await.unwrap();

        let err = client
            .send_to(&ClipboardContent::text("hi"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(ConfigError::NoReceiverConfigured)));
    }

    #[tokio::test]
    async fn send_to_unknown_receiver_is_not_found() {
        let dir = tempdir().unwrap();
        let relay = MockRelay::new();
        let identity = Arc::new(Identity::generate());
        let client = client(&relay, Arc::clone(&identity), dir.path()).await;
        client.register(&identity).await.unwrap();

        let err = client
            .send_to(&ClipboardContent::text("hi"), Some(&uid("99999999")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Friends(crate::friends::FriendError::Lookup(RelayError::NotFound))
        ));
        assert_eq!(err.send_message(), "This receiver ID does not exist.");
    }

    #[tokio::test]
    async fn upload_status_is_mapped() {
        let dir = tempdir().unwrap();
        let relay = MockRelay::new();
        let identity = Arc::new(Identity::generate());
        let client = client(&relay, Arc::clone(&identity), dir.path()).await;
        client.register(&identity).await.unwrap();
        let receiver = Friend::new(uid("33334444"), Identity::generate().public_key());
        relay.add_user(&receiver.id, receiver.public_key);

        relay.fail_next_upload(413);
        let err = client
            .send(&ClipboardContent::text("big"), &receiver)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Relay(RelayError::PayloadTooLarge)));

        relay.fail_next_upload(404);
        let err = client
            .send(&ClipboardContent::text("big"), &receiver)
            .await
            .unwrap_err();
        assert_eq!(err.send_message(), "This receiver ID does not exist.");
    }

    #[tokio::test]
    async fn receive_requires_registration() {
        let dir = tempdir().unwrap();
        let relay = MockRelay::new();
        let client = client(&relay, Arc::new(Identity::generate()), dir.path()).await;

        assert!(matches!(
            client.receive(&uid("11112222")).await,
            Err(ClientError::Config(ConfigError::NoUser))
        ));
    }
}
