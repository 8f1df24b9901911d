//! Push channel state machine for Clipboard Portal.
//!
//! This module provides a pure, side-effect-free state machine for the
//! relay push channel lifecycle. The state machine takes events as input and
//! produces a new state plus a list of actions to execute.
//!
//! The actual I/O (opening the channel, sending the greeting, pinging) is
//! performed by clipportal-client, not by this module.
//!
//! Timing is fixed: a keepalive ping every [`KEEPALIVE_INTERVAL`] while
//! authenticated, and a reconnect attempt [`RECONNECT_DELAY`] after every
//! loss. There is no backoff growth and no retry limit.

use clipportal_types::SendEnvelope;
use std::fmt;
use std::time::Duration;

/// Interval between keepalive pings while authenticated.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Delay before reconnecting after any disconnect.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No channel. Initial state, and where every failure lands.
    #[default]
    Disconnected,
    /// Channel open in progress.
    Connecting,
    /// Channel open, greeting not yet sent.
    Connected,
    /// Greeting sent; receiving push events.
    Authenticated,
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller is responsible
    /// for executing the returned actions and feeding back their outcomes.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // Stop wins from any state
            (state, Event::StopRequested) => {
                let mut actions = Vec::new();
                if state == Self::Authenticated {
                    actions.push(Action::StopKeepalive);
                }
                if state != Self::Disconnected {
                    actions.push(Action::CloseChannel);
                }
                actions.push(Action::CancelReconnect);
                actions.push(Action::EmitEvent(ConnectionEvent::Stopped));
                (Self::Disconnected, actions)
            }

            // From Disconnected
            (Self::Disconnected, Event::StartRequested) => (
                Self::Connecting,
                vec![Action::CancelReconnect, Action::OpenChannel],
            ),
            (Self::Disconnected, Event::ReconnectTimer) => {
                (Self::Connecting, vec![Action::OpenChannel])
            }

            // From Connecting
            (Self::Connecting, Event::ChannelOpened) => {
                (Self::Connected, vec![Action::SendGreeting])
            }
            (Self::Connecting, Event::ConnectFailed { reason }) => lost(vec![], reason),

            // From Connected
            (Self::Connected, Event::GreetingSent) => (
                Self::Authenticated,
                vec![
                    Action::StartKeepalive {
                        interval: KEEPALIVE_INTERVAL,
                    },
                    Action::EmitEvent(ConnectionEvent::Authenticated),
                ],
            ),
            (Self::Connected, Event::ChannelLost { reason }) => {
                lost(vec![Action::CloseChannel], reason)
            }

            // From Authenticated
            (Self::Authenticated, Event::KeepaliveTick) => {
                (Self::Authenticated, vec![Action::SendPing])
            }
            (Self::Authenticated, Event::FrameReceived { frame }) => match frame {
                ReceivedFrame::New(envelope) => (
                    Self::Authenticated,
                    vec![Action::ProcessEnvelope { envelope }],
                ),
                ReceivedFrame::Malformed { detail } => (
                    Self::Authenticated,
                    vec![Action::EmitEvent(ConnectionEvent::ProtocolError { detail })],
                ),
                ReceivedFrame::Forbidden => lost(
                    vec![Action::StopKeepalive, Action::CloseChannel],
                    DisconnectReason::Rejected,
                ),
            },
            (Self::Authenticated, Event::ChannelLost { reason }) => lost(
                vec![Action::StopKeepalive, Action::CloseChannel],
                reason,
            ),

            // Stale timers and late outcomes - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if currently authenticated and receiving events.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

/// Common tail of every failure transition.
fn lost(mut actions: Vec<Action>, reason: DisconnectReason) -> (ConnectionState, Vec<Action>) {
    actions.push(Action::EmitEvent(ConnectionEvent::Disconnected { reason }));
    actions.push(Action::ScheduleReconnect {
        delay: RECONNECT_DELAY,
    });
    (ConnectionState::Disconnected, actions)
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
        };
        f.write_str(name)
    }
}

/// Events that can occur in the push channel lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Owner asked to start the channel.
    StartRequested,
    /// Transport connection succeeded.
    ChannelOpened,
    /// Transport connection failed.
    ConnectFailed {
        /// Why the attempt failed.
        reason: DisconnectReason,
    },
    /// The greeting frame was written.
    GreetingSent,
    /// A frame arrived from the relay.
    FrameReceived {
        /// The interpreted frame.
        frame: ReceivedFrame,
    },
    /// The keepalive interval elapsed.
    KeepaliveTick,
    /// An open channel was closed or broke.
    ChannelLost {
        /// Why the channel went away.
        reason: DisconnectReason,
    },
    /// The reconnect delay elapsed.
    ReconnectTimer,
    /// Owner asked to tear the channel down.
    StopRequested,
}

/// A server frame, already parsed by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivedFrame {
    /// New content is waiting.
    New(SendEnvelope),
    /// The relay refused our greeting.
    Forbidden,
    /// A frame we could not interpret.
    Malformed {
        /// Parser error text.
        detail: String,
    },
}

/// Why the channel went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The relay sent an authentication rejection.
    Rejected,
    /// The relay closed the channel.
    Closed,
    /// Network-level failure.
    Transport(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => f.write_str("the relay rejected this user id"),
            Self::Closed => f.write_str("the relay closed the connection"),
            Self::Transport(detail) => write!(f, "connection error: {}", detail),
        }
    }
}

/// Actions to be executed by the client runtime.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open the push channel.
    OpenChannel,
    /// Send the greeting carrying the local user id.
    SendGreeting,
    /// Start the keepalive timer.
    StartKeepalive {
        /// Ping interval.
        interval: Duration,
    },
    /// Stop the keepalive timer.
    StopKeepalive,
    /// Send a protocol-level ping.
    SendPing,
    /// Hand an envelope to the receive pipeline.
    ProcessEnvelope {
        /// The envelope from the `new` event.
        envelope: SendEnvelope,
    },
    /// Close the channel.
    CloseChannel,
    /// Arm the reconnect timer.
    ScheduleReconnect {
        /// Delay before reconnecting.
        delay: Duration,
    },
    /// Disarm the reconnect timer.
    CancelReconnect,
    /// Emit an event to the application.
    EmitEvent(ConnectionEvent),
}

/// Events emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Greeting sent; push events will flow.
    Authenticated,
    /// The channel went away; a reconnect is scheduled.
    Disconnected {
        /// Why.
        reason: DisconnectReason,
    },
    /// A frame could not be understood. Not fatal.
    ProtocolError {
        /// Parser error text.
        detail: String,
    },
    /// The owner stopped the connection.
    Stopped,
}
