//! In-memory relay for testing.
//!
//! Behaves like the real relay's wire contract: one blob slot per user id
//! (last write wins), `new` events pushed to every greeted channel of the
//! receiver, `forbidden` for unknown ids. Failures can be injected.

use async_trait::async_trait;
use clipportal_types::{Greeting, PublicKeyBytes, PushEvent, SendEnvelope, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use super::{PushChannel, PushConnector, RelayApi, RelayError, TransportError};

/// Mock relay for testing.
///
/// Cloning shares state, so a test can keep a handle while the client owns
/// another.
#[derive(Debug, Default, Clone)]
pub struct MockRelay {
    inner: Arc<Mutex<MockRelayInner>>,
}

#[derive(Debug, Default)]
struct MockRelayInner {
    next_id: u32,
    users: HashMap<UserId, PublicKeyBytes>,
    slots: HashMap<UserId, (SendEnvelope, Vec<u8>)>,
    subscribers: HashMap<u64, Subscriber>,
    next_channel: u64,
    open_channels: usize,
    connect_attempts: usize,
    pings: usize,
    uploads: Vec<(UserId, SendEnvelope)>,
    downloads: usize,
    fail_next_connect: Option<String>,
    fail_next_upload: Option<u16>,
    fail_next_download: Option<RelayError>,
    refuse_connections: bool,
}

#[derive(Debug)]
struct Subscriber {
    user: Option<UserId>,
    tx: mpsc::UnboundedSender<MockFrame>,
}

#[derive(Debug)]
enum MockFrame {
    Text(String),
    Close,
}

impl MockRelay {
    /// Create an empty relay.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockRelayInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make a user with a known id exist.
    pub fn add_user(&self, id: &UserId, public_key: PublicKeyBytes) {
        self.lock().users.insert(id.clone(), public_key);
    }

    /// The blob currently stored for `id`.
    pub fn stored_blob(&self, id: &UserId) -> Option<Vec<u8>> {
        self.lock().slots.get(id).map(|(_, blob)| blob.clone())
    }

    /// The envelope currently stored for `id`.
    pub fn stored_envelope(&self, id: &UserId) -> Option<SendEnvelope> {
        self.lock().slots.get(id).map(|(env, _)| env.clone())
    }

    /// Replace the stored blob (simulates tampering in transit or at rest).
    pub fn overwrite_blob(&self, id: &UserId, blob: Vec<u8>) {
        if let Some(slot) = self.lock().slots.get_mut(id) {
            slot.1 = blob;
        }
    }

    /// Every upload as `(receiver, envelope)`.
    pub fn uploads(&self) -> Vec<(UserId, SendEnvelope)> {
        self.lock().uploads.clone()
    }

    /// Number of completed downloads.
    pub fn download_count(&self) -> usize {
        self.lock().downloads
    }

    /// Number of `open()` calls, including failed ones.
    pub fn connect_attempts(&self) -> usize {
        self.lock().connect_attempts
    }

    /// Channels currently open.
    pub fn open_channels(&self) -> usize {
        self.lock().open_channels
    }

    /// Channels greeted as `id`.
    pub fn subscribers_for(&self, id: &UserId) -> usize {
        self.lock()
            .subscribers
            .values()
            .filter(|s| s.user.as_ref() == Some(id))
            .count()
    }

    /// Pings received across all channels.
    pub fn ping_count(&self) -> usize {
        self.lock().pings
    }

    /// Cause the next `open()` to fail.
    pub fn fail_next_connect(&self, error: &str) {
        self.lock().fail_next_connect = Some(error.to_string());
    }

    /// Refuse every `open()` until cleared.
    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    /// Cause the next upload to fail with an HTTP status.
    pub fn fail_next_upload(&self, status: u16) {
        self.lock().fail_next_upload = Some(status);
    }

    /// Cause the next download to fail.
    pub fn fail_next_download(&self, error: RelayError) {
        self.lock().fail_next_download = Some(error);
    }

    /// Close every open channel from the relay side.
    pub fn drop_all_channels(&self) {
        let mut inner = self.lock();
        for (_, sub) in inner.subscribers.drain() {
            let _ = sub.tx.send(MockFrame::Close);
        }
    }

    /// Send a raw text frame to every channel greeted as `id`.
    pub fn push_raw(&self, id: &UserId, text: &str) {
        let inner = self.lock();
        for sub in inner.subscribers.values() {
            if sub.user.as_ref() == Some(id) {
                let _ = sub.tx.send(MockFrame::Text(text.to_string()));
            }
        }
    }
}

#[async_trait]
impl RelayApi for MockRelay {
    async fn register(&self, public_key: &PublicKeyBytes) -> Result<UserId, RelayError> {
        let mut inner = self.lock();
        loop {
            inner.next_id += 1;
            let id = UserId::parse(&format!("{:08}", inner.next_id))
                .map_err(|e| RelayError::BrokenResponse(e.to_string()))?;
            if !inner.users.contains_key(&id) {
                inner.users.insert(id.clone(), *public_key);
                return Ok(id);
            }
        }
    }

    async fn fetch_public_key(&self, id: &UserId) -> Result<PublicKeyBytes, RelayError> {
        self.lock()
            .users
            .get(id)
            .copied()
            .ok_or(RelayError::NotFound)
    }

    async fn upload(
        &self,
        receiver: &UserId,
        envelope: &SendEnvelope,
        blob: Vec<u8>,
    ) -> Result<(), RelayError> {
        let mut inner = self.lock();
        if let Some(status) = inner.fail_next_upload.take() {
            return Err(RelayError::from_status(status));
        }
        if !inner.users.contains_key(receiver) {
            return Err(RelayError::NotFound);
        }

        inner
            .slots
            .insert(receiver.clone(), (envelope.clone(), blob));
        inner.uploads.push((receiver.clone(), envelope.clone()));

        let frame = PushEvent::New(envelope.clone())
            .to_json()
            .map_err(|e| RelayError::Request(e.to_string()))?;
        for sub in inner.subscribers.values() {
            if sub.user.as_ref() == Some(receiver) {
                let _ = sub.tx.send(MockFrame::Text(frame.clone()));
            }
        }
        Ok(())
    }

    async fn download(&self, id: &UserId) -> Result<Vec<u8>, RelayError> {
        let mut inner = self.lock();
        if let Some(error) = inner.fail_next_download.take() {
            return Err(error);
        }
        let blob = inner
            .slots
            .get(id)
            .map(|(_, blob)| blob.clone())
            .ok_or(RelayError::NotFound)?;
        inner.downloads += 1;
        Ok(blob)
    }
}

#[async_trait]
impl PushConnector for MockRelay {
    async fn open(&self) -> Result<Box<dyn PushChannel>, TransportError> {
        let mut inner = self.lock();
        inner.connect_attempts += 1;

        if let Some(error) = inner.fail_next_connect.take() {
            return Err(TransportError::ConnectionFailed(error));
        }
        if inner.refuse_connections {
            return Err(TransportError::ConnectionFailed("connection refused".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = inner.next_channel;
        inner.next_channel += 1;
        inner.open_channels += 1;
        inner.subscribers.insert(id, Subscriber { user: None, tx });

        Ok(Box::new(MockChannel {
            relay: self.clone(),
            id,
            rx,
            open: true,
        }))
    }
}

struct MockChannel {
    relay: MockRelay,
    id: u64,
    rx: mpsc::UnboundedReceiver<MockFrame>,
    open: bool,
}

impl MockChannel {
    fn release(&mut self) {
        if self.open {
            self.open = false;
            let mut inner = self.relay.lock();
            inner.subscribers.remove(&self.id);
            inner.open_channels = inner.open_channels.saturating_sub(1);
        }
    }
}

#[async_trait]
impl PushChannel for MockChannel {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::ConnectionClosed);
        }
        let greeting: Greeting = serde_json::from_str(&text)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let mut inner = self.relay.lock();
        let known = inner.users.contains_key(&greeting.id);
        let Some(sub) = inner.subscribers.get_mut(&self.id) else {
            return Err(TransportError::ConnectionClosed);
        };
        if known {
            sub.user = Some(greeting.id);
        } else {
            let frame = PushEvent::Forbidden
                .to_json()
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
            let _ = sub.tx.send(MockFrame::Text(frame));
            let _ = sub.tx.send(MockFrame::Close);
        }
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::ConnectionClosed);
        }
        self.relay.lock().pings += 1;
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        match self.rx.recv().await {
            Some(MockFrame::Text(text)) => Some(Ok(text)),
            Some(MockFrame::Close) | None => None,
        }
    }

    async fn close(&mut self) {
        self.release();
    }
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn key(b: u8) -> PublicKeyBytes {
        PublicKeyBytes::new([b; 32])
    }

    // ===========================================
    // HTTP surface
    // ===========================================

    #[tokio::test]
    async fn register_assigns_zero_filled_ids() {
        let relay = MockRelay::new();
        let first = relay.register(&key(1)).await.unwrap();
        let second = relay.register(&key(2)).await.unwrap();

        assert_eq!(first.as_str(), "00000001");
        assert_eq!(second.as_str(), "00000002");
        assert_eq!(relay.fetch_public_key(&second).await.unwrap(), key(2));
    }

    #[tokio::test]
    async fn unknown_key_lookup_is_not_found() {
        let relay = MockRelay::new();
        assert_eq!(
            relay.fetch_public_key(&uid("99999999")).await,
            Err(RelayError::NotFound)
        );
    }

    #[tokio::test]
    async fn upload_to_unknown_receiver_is_not_found() {
        let relay = MockRelay::new();
        let env = SendEnvelope::new(uid("11112222"), vec![1]);
        assert_eq!(
            relay.upload(&uid("33334444"), &env, vec![0]).await,
            Err(RelayError::NotFound)
        );
    }

    #[tokio::test]
    async fn slot_is_last_write_wins() {
        let relay = MockRelay::new();
        relay.add_user(&uid("33334444"), key(3));
        let env = SendEnvelope::new(uid("11112222"), vec![1]);

        relay.upload(&uid("33334444"), &env, vec![1]).await.unwrap();
        relay.upload(&uid("33334444"), &env, vec![2]).await.unwrap();

        assert_eq!(relay.download(&uid("33334444")).await.unwrap(), vec![2]);
        assert_eq!(relay.uploads().len(), 2);
    }

    #[tokio::test]
    async fn injected_upload_failure_maps_status() {
        let relay = MockRelay::new();
        relay.add_user(&uid("33334444"), key(3));
        relay.fail_next_upload(413);
        let env = SendEnvelope::new(uid("11112222"), vec![1]);

        assert_eq!(
            relay.upload(&uid("33334444"), &env, vec![0]).await,
            Err(RelayError::PayloadTooLarge)
        );
        assert!(relay.upload(&uid("33334444"), &env, vec![0]).await.is_ok());
    }

    // ===========================================
    // Push channel
    // ===========================================

    #[tokio::test]
    async fn greeted_channel_receives_new_events() {
        let relay = MockRelay::new();
        relay.add_user(&uid("33334444"), key(3));
        let mut channel = relay.open().await.unwrap();
        channel
            .send_text(r#"{"id":"33334444"}"#.to_string())
            .await
            .unwrap();

        let env = SendEnvelope::new(uid("11112222"), vec![5]);
        relay.upload(&uid("33334444"), &env, vec![0]).await.unwrap();

        let frame = channel.next_frame().await.unwrap().unwrap();
        assert_eq!(PushEvent::parse(&frame).unwrap(), PushEvent::New(env));
    }

    #[tokio::test]
    async fn unknown_greeting_is_forbidden_then_closed() {
        let relay = MockRelay::new();
        let mut channel = relay.open().await.unwrap();
        channel
            .send_text(r#"{"id":"55556666"}"#.to_string())
            .await
            .unwrap();

        let frame = channel.next_frame().await.unwrap().unwrap();
        assert_eq!(PushEvent::parse(&frame).unwrap(), PushEvent::Forbidden);
        assert!(channel.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn open_channel_count_tracks_close_and_drop() {
        let relay = MockRelay::new();
        let mut a = relay.open().await.unwrap();
        let b = relay.open().await.unwrap();
        assert_eq!(relay.open_channels(), 2);

        a.close().await;
        assert_eq!(relay.open_channels(), 1);
        drop(b);
        assert_eq!(relay.open_channels(), 0);
        assert_eq!(relay.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn drop_all_channels_ends_streams() {
        let relay = MockRelay::new();
        let mut channel = relay.open().await.unwrap();
        relay.drop_all_channels();
        assert!(channel.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn injected_connect_failure() {
        let relay = MockRelay::new();
        relay.fail_next_connect("boom");
        assert!(relay.open().await.is_err());
        assert!(relay.open().await.is_ok());
    }
}
