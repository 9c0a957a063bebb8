//! Discord integration: client lifetime, event handling, channel topology,
//! and webhook dispatch.

pub mod bot;
pub mod commands;
pub mod connection;
pub mod directory;
pub mod handler;
pub mod webhook;

pub use bot::{build_http, DiscordBot};
pub use commands::GameCommandHandler;
pub use connection::{CacheEnumerator, DiscordConnection};
pub use directory::ChannelDirectory;
pub use handler::RelayHandler;
pub use webhook::WebhookGateway;
