//! TrustNegotiator - the accept/deny side of the trust gate.
//!
//! Wraps the single-slot [`TrustGate`] with the I/O needed to resolve a
//! request: looking up the sender's key and storing them as a friend.
//! Accepting hands back the suspended envelope so the caller can re-run the
//! receive pipeline; nothing here captures closures.

use clipportal_core::{OfferOutcome, PendingTrustRequest, TrustGate};
use clipportal_types::{PublicKeyBytes, SendEnvelope, UserId};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{ClientError, TrustError};
use crate::friends::{Friend, FriendStore};
use crate::transport::RelayApi;

/// Result of [`TrustNegotiator::accept`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    /// The new friend, already durable.
    pub friend: Friend,
    /// The envelope to resume, unless its content was overwritten meanwhile.
    pub resume: Option<SendEnvelope>,
}

/// Holds at most one pending request and resolves it.
pub struct TrustNegotiator {
    gate: Mutex<TrustGate>,
    friends: Arc<FriendStore>,
    api: Arc<dyn RelayApi>,
}

impl TrustNegotiator {
    /// Create a negotiator with an empty slot.
    pub fn new(friends: Arc<FriendStore>, api: Arc<dyn RelayApi>) -> Self {
        Self {
            gate: Mutex::new(TrustGate::new()),
            friends,
            api,
        }
    }

    /// Suspend a receive from an unknown sender.
    pub async fn offer(&self, envelope: SendEnvelope) -> OfferOutcome {
        let sender = envelope.sender_id.clone();
        let outcome = self.gate.lock().await.offer(envelope);
        match &outcome {
            OfferOutcome::Opened => tracing::info!("friend request from {}", sender),
            OfferOutcome::Refreshed => tracing::debug!("friend request from {} refreshed", sender),
            OfferOutcome::Replaced { previous } => {
                tracing::info!("friend request from {} replaces {}", sender, previous)
            }
        }
        outcome
    }

    /// Look up the pending sender's key for display, and remember it.
    ///
    /// Lookup failures are not fatal; accept retries the lookup.
    pub async fn lookup_key(&self, sender: &UserId) -> Option<PublicKeyBytes> {
        match self.api.fetch_public_key(sender).await {
            Ok(key) => {
                self.gate.lock().await.attach_key(sender, key);
                Some(key)
            }
            Err(e) => {
                tracing::debug!("key lookup for {} failed: {}", sender, e);
                None
            }
        }
    }

    /// Mark the pending request as stale: the relay slot was overwritten.
    pub async fn supersede_pending(&self) -> bool {
        let marked = self.gate.lock().await.mark_superseded();
        if marked {
            tracing::debug!("pending friend request superseded by newer content");
        }
        marked
    }

    /// A copy of the pending request, if any.
    pub async fn pending(&self) -> Option<PendingTrustRequest> {
        self.gate.lock().await.pending().cloned()
    }

    /// Trust `expected`, the sender the user was shown.
    ///
    /// Fails with [`TrustError::RequestChanged`] if the slot now holds
    /// someone else; nothing is stored in that case. The friend is durable
    /// before this returns. On failure the request stays pending so the user
    /// can retry or deny.
    pub async fn accept(&self, expected: &UserId) -> Result<Accepted, ClientError> {
        let request = self.pending_for(expected).await?;

        let public_key = match request.public_key {
            Some(key) => key,
            None => self.api.fetch_public_key(expected).await?,
        };
        let friend = Friend::new(expected.clone(), public_key);
        self.friends.add(friend.clone()).await?;

        // The slot may have moved on while we were fetching.
        let resume = match self.gate.lock().await.resolve(expected) {
            Some(req) if !req.superseded => Some(req.envelope),
            Some(_) => {
                tracing::info!("accepted {}; their content was overwritten before download", expected);
                None
            }
            None => None,
        };
        Ok(Accepted { friend, resume })
    }

    /// Drop the request from `expected`. Returns the denied sender.
    pub async fn deny(&self, expected: &UserId) -> Result<UserId, ClientError> {
        let mut gate = self.gate.lock().await;
        let request = match gate.resolve(expected) {
            Some(request) => request,
            None => return Err(mismatch(expected, gate.pending()).into()),
        };
        tracing::info!("denied friend request from {}", request.sender_id());
        Ok(request.envelope.sender_id)
    }

    async fn pending_for(&self, expected: &UserId) -> Result<PendingTrustRequest, TrustError> {
        let gate = self.gate.lock().await;
        match gate.pending() {
            Some(request) if request.sender_id() == expected => Ok(request.clone()),
            other => Err(mismatch(expected, other)),
        }
    }
}

fn mismatch(expected: &UserId, pending: Option<&PendingTrustRequest>) -> TrustError {
    match pending {
        None => TrustError::NoPendingRequest,
        Some(request) => {
            tracing::warn!(
                "friend request from {} was replaced by {} before it was answered",
                expected,
                request.sender_id()
            );
            TrustError::RequestChanged {
                expected: expected.clone(),
                pending: request.sender_id().clone(),
            }
        }
    }
}

impl std::fmt::Debug for TrustNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustNegotiator").finish_non_exhaustive()
    }
}
