//! ClipboardSession - one local user's clipboard relay session.
//!
//! Owns the services (identity, friends, transfer, trust, push connection)
//! and runs the receive pipeline for every `new` event:
//!
//! ```text
//! envelope → sender known? ──no──→ TrustNegotiator (prompt, no clipboard write)
//!               │ yes
//!               ↓
//!        open metadata → download → open + decode → ClipboardSink
//! ```
//!
//! Send, receive and connection problems are tracked independently; a
//! success on one clears only its own error.

use async_trait::async_trait;
use clipportal_core::{Direction, HistoryEntry, PendingTrustRequest, TransferHistory, DEFAULT_HISTORY_CAPACITY};
use clipportal_types::{ContentKind, SendEnvelope, UserId};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, mpsc, watch};

use crate::codec::{remove_staged, ClipboardContent, CodecError, ContentCodec};
use crate::config::ConfigError;
use crate::connection::{ConnectionHandle, ConnectionStatus, RelayConnection};
use crate::crypto::{CryptoSession, Identity};
use crate::error::ClientError;
use crate::friends::{Friend, FriendStore};
use crate::transfer::TransferClient;
use crate::transport::{PushConnector, RelayApi};
use crate::trust::{Accepted, TrustNegotiator};

/// Where received content goes (the local clipboard, a directory, stdout).
#[async_trait]
pub trait ClipboardSink: Send + Sync {
    /// Deliver content received from `from`.
    async fn write(&self, content: ClipboardContent, from: &Friend) -> std::io::Result<()>;
}

/// Notifications for UI and CLI consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The push channel status changed.
    StatusChanged(ConnectionStatus),
    /// Content from an unknown sender is waiting for accept or deny.
    TrustRequested {
        /// The unknown sender.
        sender: UserId,
        /// Fingerprint of the sender's key, if the lookup succeeded.
        fingerprint: Option<String>,
    },
    /// Content was delivered to the sink.
    ContentReceived {
        /// Sender.
        from: UserId,
        /// Text or file.
        kind: ContentKind,
        /// Filename for files.
        filename: Option<String>,
    },
    /// A receive failed.
    ReceiveFailed {
        /// Claimed sender.
        from: UserId,
        /// Human-readable cause.
        error: String,
        /// Possible tampering.
        security: bool,
    },
}

/// What happened to one announced envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Content was delivered.
    Delivered {
        /// Sender.
        from: UserId,
        /// Text or file.
        kind: ContentKind,
    },
    /// The sender is unknown; a trust request is pending.
    AwaitingTrust {
        /// The unknown sender.
        sender: UserId,
    },
}

/// Combined status of all three channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    /// Push channel.
    pub connection: ConnectionStatus,
    /// Last send failure.
    pub last_send_error: Option<String>,
    /// Last receive failure.
    pub last_receive_error: Option<String>,
}

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Bound for opening the push channel.
    pub connect_timeout: Duration,
    /// Entries kept in the transfer history.
    pub history_capacity: usize,
    /// Directory for received files before they reach the sink.
    pub staging_dir: PathBuf,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            staging_dir: std::env::temp_dir().join("clipboard-portal"),
        }
    }
}

/// The collaborators a session is built from.
pub struct SessionServices {
    /// Our keypair.
    pub identity: Arc<Identity>,
    /// Friends and our user id.
    pub friends: Arc<FriendStore>,
    /// Relay HTTP surface.
    pub api: Arc<dyn RelayApi>,
    /// Relay push channel.
    pub connector: Arc<dyn PushConnector>,
    /// Destination of received content.
    pub sink: Arc<dyn ClipboardSink>,
}

const EVENT_CAPACITY: usize = 64;

/// A running clipboard session. Cheap to clone.
#[derive(Clone)]
pub struct ClipboardSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    identity: Arc<Identity>,
    friends: Arc<FriendStore>,
    transfer: TransferClient,
    trust: TrustNegotiator,
    connector: Arc<dyn PushConnector>,
    sink: Arc<dyn ClipboardSink>,
    connect_timeout: Duration,
    connection: tokio::sync::Mutex<Option<ConnectionHandle>>,
    errors: Mutex<ErrorSlots>,
    history: Mutex<TransferHistory>,
    events: broadcast::Sender<SessionEvent>,
}

#[derive(Debug, Default)]
struct ErrorSlots {
    send: Option<String>,
    receive: Option<String>,
}

impl ClipboardSession {
    /// Assemble a session. Nothing connects until [`start_connection`](Self::start_connection).
    pub fn new(services: SessionServices, options: SessionOptions) -> Self {
        let crypto = CryptoSession::new(Arc::clone(&services.identity));
        let codec = ContentCodec::new(crypto, Arc::clone(&services.friends), options.staging_dir);
        let transfer = TransferClient::new(
            Arc::clone(&services.api),
            codec,
            Arc::clone(&services.friends),
        );
        let trust = TrustNegotiator::new(Arc::clone(&services.friends), services.api);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(SessionInner {
                identity: services.identity,
                friends: services.friends,
                transfer,
                trust,
                connector: services.connector,
                sink: services.sink,
                connect_timeout: options.connect_timeout,
                connection: tokio::sync::Mutex::new(None),
                errors: Mutex::new(ErrorSlots::default()),
                history: Mutex::new(TransferHistory::new(options.history_capacity)),
                events,
            }),
        }
    }

    /// Our identity.
    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    /// The friend store.
    pub fn friends(&self) -> &Arc<FriendStore> {
        &self.inner.friends
    }

    /// Our relay user id, once registered.
    pub async fn user_id(&self) -> Option<UserId> {
        self.inner.friends.user_id().await
    }

    /// Register with the relay unless already registered.
    pub async fn register(&self) -> Result<UserId, ClientError> {
        self.inner.transfer.register(&self.inner.identity).await
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    // ===========================================
    // Send
    // ===========================================

    /// Send content to `receiver` (the configured outgoing receiver).
    pub async fn send(
        &self,
        content: &ClipboardContent,
        receiver: Option<&UserId>,
    ) -> Result<Friend, ClientError> {
        match self.inner.transfer.send_to(content, receiver).await {
            Ok(friend) => {
                self.errors().send = None;
                self.record(
                    Direction::Sent,
                    friend.id.clone(),
                    content.kind(),
                    content.filename().map(str::to_string),
                );
                Ok(friend)
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::info!("send failed, relay unavailable: {}", e);
                } else {
                    tracing::warn!("send failed: {}", e);
                }
                self.errors().send = Some(e.send_message());
                Err(e)
            }
        }
    }

    // ===========================================
    // Receive
    // ===========================================

    /// Run the receive pipeline for one announced envelope.
    ///
    /// Failures are recorded as the last receive error and broadcast before
    /// being returned.
    pub async fn receive_envelope(&self, envelope: SendEnvelope) -> Result<ReceiveOutcome, ClientError> {
        let sender = envelope.sender_id.clone();
        match self.run_pipeline(envelope).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let security = e.is_security_event();
                if security {
                    tracing::warn!("content from {} failed verification: {}", sender, e);
                } else {
                    tracing::warn!("receive from {} failed: {}", sender, e);
                }
                self.errors().receive = Some(e.to_string());
                self.emit(SessionEvent::ReceiveFailed {
                    from: sender,
                    error: e.to_string(),
                    security,
                });
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, envelope: SendEnvelope) -> Result<ReceiveOutcome, ClientError> {
        let codec = self.inner.transfer.codec();
        let friend = match codec.sender(&envelope).await {
            Ok(friend) => friend,
            Err(CodecError::UnknownSender(sender)) => {
                self.gate(envelope).await;
                return Ok(ReceiveOutcome::AwaitingTrust { sender });
            }
            Err(e) => return Err(e.into()),
        };

        // The relay slot now holds this friend's content, not the pending request's.
        self.inner.trust.supersede_pending().await;

        let metadata = codec.open_metadata(&envelope, &friend)?;
        let blob = self.inner.transfer.receive(&friend.id).await?;
        let content = codec.open_content(&blob, &metadata, &friend).await?;
        let kind = content.kind();
        let filename = content.filename().map(str::to_string);
        let staged = match &content {
            ClipboardContent::File { path, .. } => Some(path.clone()),
            ClipboardContent::Text(_) => None,
        };

        if let Err(e) = self.inner.sink.write(content, &friend).await {
            if let Some(path) = staged {
                remove_staged(&path).await;
            }
            return Err(ClientError::Sink(e));
        }
        self.record(Direction::Received, friend.id.clone(), kind, filename.clone());

        tracing::info!("received {} from {}", kind, friend.id);
        self.errors().receive = None;
        self.emit(SessionEvent::ContentReceived {
            from: friend.id.clone(),
            kind,
            filename,
        });
        Ok(ReceiveOutcome::Delivered {
            from: friend.id,
            kind,
        })
    }

    /// Park an envelope from an unknown sender and announce the request.
    async fn gate(&self, envelope: SendEnvelope) {
        let sender = envelope.sender_id.clone();
        self.inner.trust.offer(envelope).await;
        let fingerprint = self
            .inner
            .trust
            .lookup_key(&sender)
            .await
            .map(|key| key.fingerprint());
        self.emit(SessionEvent::TrustRequested { sender, fingerprint });
    }

    // ===========================================
    // Trust
    // ===========================================

    /// The pending trust request, if any.
    pub async fn pending_trust(&self) -> Option<PendingTrustRequest> {
        self.inner.trust.pending().await
    }

    /// Accept `sender`, the requester the user was shown, and resume their
    /// suspended receive.
    ///
    /// Fails without storing anything if the request was replaced by another
    /// sender. The friend is durable before the resume starts. A failed
    /// resume is reported like any other receive failure and does not undo
    /// the accept.
    pub async fn accept_pending(&self, sender: &UserId) -> Result<Accepted, ClientError> {
        let accepted = self.inner.trust.accept(sender).await?;
        if let Some(envelope) = accepted.resume.clone() {
            // Already recorded and broadcast.
            let _ = self.receive_envelope(envelope).await;
        }
        Ok(accepted)
    }

    /// Deny `sender`'s pending request.
    pub async fn deny_pending(&self, sender: &UserId) -> Result<UserId, ClientError> {
        self.inner.trust.deny(sender).await
    }

    // ===========================================
    // Connection
    // ===========================================

    /// Start the push connection, replacing any existing one.
    ///
    /// The previous connection is fully stopped (channel closed, timers
    /// cancelled) before the new one opens.
    pub async fn start_connection(&self) -> Result<(), ClientError> {
        let user_id = self.user_id().await.ok_or(ConfigError::NoUser)?;

        let mut slot = self.inner.connection.lock().await;
        if let Some(previous) = slot.take() {
            tracing::debug!("superseding connection for {}", previous.user_id());
            previous.shutdown().await;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = RelayConnection::spawn(
            Arc::clone(&self.inner.connector),
            user_id,
            self.inner.connect_timeout,
            tx,
        );
        tokio::spawn(pump(Arc::downgrade(&self.inner), rx, handle.watch_status()));
        *slot = Some(handle);
        Ok(())
    }

    /// Stop the push connection, if running.
    pub async fn stop_connection(&self) {
        if let Some(handle) = self.inner.connection.lock().await.take() {
            handle.shutdown().await;
        }
    }

    /// A receiver notified on every push channel status change.
    pub async fn watch_connection(&self) -> Option<watch::Receiver<ConnectionStatus>> {
        self.inner
            .connection
            .lock()
            .await
            .as_ref()
            .map(ConnectionHandle::watch_status)
    }

    // ===========================================
    // Status
    // ===========================================

    /// Current status of connection, send and receive.
    pub async fn status(&self) -> SessionStatus {
        let connection = self
            .inner
            .connection
            .lock()
            .await
            .as_ref()
            .map(ConnectionHandle::status)
            .unwrap_or_default();
        let errors = self.errors();
        SessionStatus {
            connection,
            last_send_error: errors.send.clone(),
            last_receive_error: errors.receive.clone(),
        }
    }

    /// Transfer history, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.lock_history().entries().cloned().collect()
    }

    fn record(&self, direction: Direction, peer: UserId, kind: ContentKind, filename: Option<String>) {
        self.lock_history().record(HistoryEntry {
            direction,
            peer,
            kind,
            filename,
            at: SystemTime::now(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn errors(&self) -> MutexGuard<'_, ErrorSlots> {
        self.inner.errors.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_history(&self) -> MutexGuard<'_, TransferHistory> {
        self.inner.history.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for ClipboardSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipboardSession")
            .field("identity", &self.inner.identity)
            .finish_non_exhaustive()
    }
}

/// Route a connection's envelopes and status changes into the session.
///
/// Holds only a weak reference so a dropped session is not kept alive by
/// its own connection. Each envelope gets its own task, so a slow download
/// never delays the next event.
async fn pump(
    session: Weak<SessionInner>,
    mut envelopes: mpsc::UnboundedReceiver<SendEnvelope>,
    mut status: watch::Receiver<ConnectionStatus>,
) {
    let mut status_open = true;
    loop {
        tokio::select! {
            envelope = envelopes.recv() => {
                let Some(envelope) = envelope else { break };
                let Some(inner) = session.upgrade() else { break };
                let session = ClipboardSession { inner };
                tokio::spawn(async move {
                    let _ = session.receive_envelope(envelope).await;
                });
            }
            changed = status.changed(), if status_open => {
                if changed.is_err() {
                    status_open = false;
                    continue;
                }
                let current = status.borrow_and_update().clone();
                let Some(inner) = session.upgrade() else { break };
                let _ = inner.events.send(SessionEvent::StatusChanged(current));
            }
        }
    }
}
