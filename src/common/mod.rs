//! Shared types, errors, and utilities.

pub mod error;
pub mod platform;
pub mod retry;
pub mod types;

pub use error::{RelayError, RelayResult};
pub use types::{ChatKind, ChatMessage, ChannelKind, ChannelRecord, SenderKey, WebhookIdentity, WebhookPayload};
