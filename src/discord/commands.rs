//! Prefix-command dispatch.
//!
//! Discord users can run whitelisted game slash commands through the relay
//! ("!em waves" becomes "/em waves" in game). Anything not on the whitelist
//! is refused; the prefix match itself already consumed the message.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::game::{CommandHandler, GameChatSink};

pub struct GameCommandHandler {
    sink: Arc<dyn GameChatSink>,
    whitelist: Vec<String>,
}

impl GameCommandHandler {
    pub fn new(sink: Arc<dyn GameChatSink>, whitelist: Vec<String>) -> Self {
        Self { sink, whitelist }
    }
}

#[async_trait]
impl CommandHandler for GameCommandHandler {
    async fn handle(&self, sender: &str, content: &str) -> bool {
        let mut parts = content.splitn(2, ' ');
        let command = parts.next().unwrap_or("").to_lowercase();
        if command.is_empty() {
            return false;
        }

        if !self
            .whitelist
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&command))
        {
            debug!(sender, command, "command not whitelisted");
            return false;
        }

        let args = parts.next().unwrap_or("").trim();
        let line = if args.is_empty() {
            format!("/{}", command)
        } else {
            format!("/{} {}", command, args)
        };

        match self.sink.send_to_game(&line).await {
            Ok(()) => {
                info!(sender, command, "dispatched game command");
                true
            }
            Err(e) => {
                warn!(sender, command, "failed to dispatch game command: {}", e);
                false
            }
        }
    }
}
