//! # clipportal-types
//!
//! Wire format types for the Clipboard Portal relay protocol.
//!
//! This crate provides the foundational types used across all clipportal crates:
//! - [`UserId`], [`PublicKeyBytes`] - Identity types as the relay sees them
//! - [`SendEnvelope`], [`ContentMetadata`] - What travels with every transfer
//! - [`Greeting`], [`PushEvent`] - Push channel frames
//! - [`UserCreateRequest`], [`UserCreateResponse`] - Registration DTOs
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod ids;
mod messages;

pub use envelope::{ContentKind, ContentMetadata, SendEnvelope};
pub use error::WireError;
pub use ids::{PublicKeyBytes, UserId, PUBLIC_KEY_SIZE, USER_ID_LEN};
pub use messages::{Greeting, PushEvent, UserCreateRequest, UserCreateResponse};
