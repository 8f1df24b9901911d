//! # clipportal-core
//!
//! Pure logic for Clipboard Portal (no I/O, instant tests).
//!
//! This crate implements the state machines and bookkeeping for the
//! clipboard relay client without any network or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (push channel, HTTP, disk) is performed by `clipportal-client`,
//! which interprets the actions produced by these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod filename;
pub mod history;
pub mod state;
pub mod trust;

pub use filename::{candidate_names, sanitize_filename};
pub use history::{Direction, HistoryEntry, TransferHistory, DEFAULT_HISTORY_CAPACITY};
pub use state::{
    Action, ConnectionEvent, ConnectionState, DisconnectReason, Event, ReceivedFrame,
    KEEPALIVE_INTERVAL, RECONNECT_DELAY,
};
pub use trust::{OfferOutcome, PendingTrustRequest, TrustGate};
