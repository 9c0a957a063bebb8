//! Boundary to the game chat client.
//!
//! The relay never touches game memory itself; it consumes `ChatMessage`
//! events emitted by the host's chat hook and writes chat lines back through
//! `GameChatSink`. Both directions are carried over channels so the host can
//! wire in its own client.

pub mod avatar;
pub mod sanitize;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::common::error::{RelayError, RelayResult};
use crate::common::types::ChatMessage;

/// Sink for chat lines going into the game client.
#[async_trait]
pub trait GameChatSink: Send + Sync {
    /// Deliver one chat line (already formatted as a game command) to the
    /// game client. Fails with a delivery error when the client is gone.
    async fn send_to_game(&self, content: &str) -> RelayResult<()>;
}

/// Handler for prefix commands arriving from Discord.
///
/// Dispatching a command replaces normal relay handling for that message.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Returns true when the command was recognized and acted on.
    async fn handle(&self, sender: &str, content: &str) -> bool;
}

/// Channel-backed sink handing chat lines to the embedding host.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl GameChatSink for ChannelSink {
    async fn send_to_game(&self, content: &str) -> RelayResult<()> {
        self.tx
            .send(content.to_string())
            .map_err(|_| RelayError::Delivery {
                message: "game client channel closed".to_string(),
            })
    }
}

/// Channels connecting the relay to the game client.
///
/// `chat_tx` is handed to the game chat hook; `game_rx` is drained by the
/// host and written into the game client's chat box.
pub struct GameChannels {
    /// Sender for game -> Discord chat events.
    pub chat_tx: mpsc::UnboundedSender<ChatMessage>,
    /// Receiver for game -> Discord chat events (pipeline pump listens).
    pub chat_rx: mpsc::UnboundedReceiver<ChatMessage>,
    /// Sink the pipeline writes Discord -> game lines into.
    pub sink: ChannelSink,
    /// Receiver for Discord -> game lines (host's game client listens).
    pub game_rx: mpsc::UnboundedReceiver<String>,
}

impl GameChannels {
    pub fn new() -> Self {
        let (chat_tx, chat_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        debug!("game channel bundle created");
        Self {
            chat_tx,
            chat_rx,
            sink: ChannelSink { tx: game_tx },
            game_rx,
        }
    }
}

impl Default for GameChannels {
    fn default() -> Self {
        Self::new()
    }
}
