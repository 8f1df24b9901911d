//! Single-slot trust gate for content from unknown senders.
//!
//! At most one request is pending. A request from a different unknown sender
//! replaces the current one: the relay keeps only the latest blob per
//! receiver, so the older request's content is gone anyway. A later `new`
//! event from a known friend marks the pending request as superseded for the
//! same reason.

use clipportal_types::{PublicKeyBytes, SendEnvelope, UserId};

/// A suspended receive waiting for the user to accept or deny the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTrustRequest {
    /// Everything needed to re-run the receive pipeline.
    pub envelope: SendEnvelope,
    /// Key looked up for the sender, if the lookup already happened.
    pub public_key: Option<PublicKeyBytes>,
    /// The relay slot has since been overwritten by another sender.
    pub superseded: bool,
}

impl PendingTrustRequest {
    /// Create a request from the envelope that triggered it.
    pub fn new(envelope: SendEnvelope) -> Self {
        Self {
            envelope,
            public_key: None,
            superseded: false,
        }
    }

    /// The unknown sender.
    pub fn sender_id(&self) -> &UserId {
        &self.envelope.sender_id
    }
}

/// What happened when a request was offered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferOutcome {
    /// The slot was empty; a prompt should be shown.
    Opened,
    /// A request from another sender was dropped in favour of this one.
    Replaced {
        /// The sender whose request was dropped.
        previous: UserId,
    },
    /// The same sender sent again; the envelope was refreshed.
    Refreshed,
}

/// The pending-request slot.
#[derive(Debug, Default)]
pub struct TrustGate {
    pending: Option<PendingTrustRequest>,
}

impl TrustGate {
    /// Create an empty gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a request into the slot.
    pub fn offer(&mut self, envelope: SendEnvelope) -> OfferOutcome {
        match self.pending.take() {
            None => {
                self.pending = Some(PendingTrustRequest::new(envelope));
                OfferOutcome::Opened
            }
            Some(mut current) if current.envelope.sender_id == envelope.sender_id => {
                current.envelope = envelope;
                current.superseded = false;
                self.pending = Some(current);
                OfferOutcome::Refreshed
            }
            Some(previous) => {
                self.pending = Some(PendingTrustRequest::new(envelope));
                OfferOutcome::Replaced {
                    previous: previous.envelope.sender_id,
                }
            }
        }
    }

    /// The current request, if any.
    pub fn pending(&self) -> Option<&PendingTrustRequest> {
        self.pending.as_ref()
    }

    /// Record the sender's looked-up key, if the request is still for them.
    pub fn attach_key(&mut self, sender: &UserId, key: PublicKeyBytes) -> bool {
        match self.pending.as_mut() {
            Some(req) if req.sender_id() == sender => {
                req.public_key = Some(key);
                true
            }
            _ => false,
        }
    }

    /// Mark the pending request's content as overwritten.
    ///
    /// Returns true if there was a request to mark.
    pub fn mark_superseded(&mut self) -> bool {
        match self.pending.as_mut() {
            Some(req) => {
                req.superseded = true;
                true
            }
            None => false,
        }
    }

    /// Remove the request if it is still the one for `sender`.
    pub fn resolve(&mut self, sender: &UserId) -> Option<PendingTrustRequest> {
        if self.pending.as_ref().map(|r| r.sender_id()) == Some(sender) {
            self.pending.take()
        } else {
            None
        }
    }

    /// Remove whatever request is pending.
    pub fn take(&mut self) -> Option<PendingTrustRequest> {
        self.pending.take()
    }

    /// Check if a request is pending.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(sender: &str, tag: u8) -> SendEnvelope {
        SendEnvelope::new(UserId::parse(sender).unwrap(), vec![tag])
    }

    #[test]
    fn first_offer_opens_prompt() {
        let mut gate = TrustGate::new();
        assert_eq!(gate.offer(envelope("55556666", 1)), OfferOutcome::Opened);
        assert_eq!(gate.pending().unwrap().sender_id().as_str(), "55556666");
    }

    #[test]
    fn other_sender_replaces_pending() {
        let mut gate = TrustGate::new();
        gate.offer(envelope("55556666", 1));

        let outcome = gate.offer(envelope("77778888", 2));

        assert_eq!(
            outcome,
            OfferOutcome::Replaced {
                previous: UserId::parse("55556666").unwrap()
            }
        );
        assert_eq!(gate.pending().unwrap().sender_id().as_str(), "77778888");
    }

    #[test]
    fn same_sender_refreshes_envelope_and_keeps_key() {
        let mut gate = TrustGate::new();
        gate.offer(envelope("55556666", 1));
        let sender = UserId::parse("55556666").unwrap();
        assert!(gate.attach_key(&sender, PublicKeyBytes::new([4; 32])));
        gate.mark_superseded();

        assert_eq!(gate.offer(envelope("55556666", 2)), OfferOutcome::Refreshed);

        let pending = gate.pending().unwrap();
        assert_eq!(pending.envelope.encrypted_metadata, vec![2]);
        assert_eq!(pending.public_key, Some(PublicKeyBytes::new([4; 32])));
        assert!(!pending.superseded);
    }

    #[test]
    fn attach_key_ignores_other_sender() {
        let mut gate = TrustGate::new();
        gate.offer(envelope("55556666", 1));
        let other = UserId::parse("12345678").unwrap();

        assert!(!gate.attach_key(&other, PublicKeyBytes::new([4; 32])));
        assert!(gate.pending().unwrap().public_key.is_none());
    }

    #[test]
    fn mark_superseded_requires_pending() {
        let mut gate = TrustGate::new();
        assert!(!gate.mark_superseded());

        gate.offer(envelope("55556666", 1));
        assert!(gate.mark_superseded());
        assert!(gate.pending().unwrap().superseded);
    }

    #[test]
    fn resolve_only_removes_matching_sender() {
        let mut gate = TrustGate::new();
        gate.offer(envelope("55556666", 1));

        assert!(gate
            .resolve(&UserId::parse("77778888").unwrap())
            .is_none());
        assert!(gate.is_pending());

        let resolved = gate.resolve(&UserId::parse("55556666").unwrap());
        assert!(resolved.is_some());
        assert!(!gate.is_pending());
    }

    #[test]
    fn take_clears_slot() {
        let mut gate = TrustGate::new();
        gate.offer(envelope("55556666", 1));
        assert!(gate.take().is_some());
        assert!(gate.take().is_none());
    }
}
