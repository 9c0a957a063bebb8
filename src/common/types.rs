//! Shared types used across the application.

use std::fmt;

use serenity::model::id::{ChannelId, MessageId, WebhookId};

/// Game chat channel kind.
///
/// Covers the chat routes the relay can bridge; linkshells and cross-world
/// linkshells carry their slot number (1-8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatKind {
    Say,
    Shout,
    Yell,
    Tell,
    Party,
    Alliance,
    FreeCompany,
    NoviceNetwork,
    Emote,
    Echo,
    Linkshell(u8),
    CrossLinkshell(u8),
}

impl ChatKind {
    /// Parse a chat kind from its config key ("say", "fc", "ls3", "cwls2", ...).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.to_lowercase();
        let kind = match s.as_str() {
            "say" | "s" => Self::Say,
            "shout" | "sh" => Self::Shout,
            "yell" | "y" => Self::Yell,
            "tell" | "t" => Self::Tell,
            "party" | "p" => Self::Party,
            "alliance" | "a" => Self::Alliance,
            "freecompany" | "fc" => Self::FreeCompany,
            "novice" | "nn" => Self::NoviceNetwork,
            "emote" | "em" => Self::Emote,
            "echo" => Self::Echo,
            _ => {
                if let Some(n) = s.strip_prefix("cwls").and_then(|n| n.parse::<u8>().ok()) {
                    if (1..=8).contains(&n) {
                        return Some(Self::CrossLinkshell(n));
                    }
                    return None;
                }
                if let Some(n) = s.strip_prefix("ls").and_then(|n| n.parse::<u8>().ok()) {
                    if (1..=8).contains(&n) {
                        return Some(Self::Linkshell(n));
                    }
                    return None;
                }
                return None;
            }
        };
        Some(kind)
    }

    /// The slash command used to speak on this channel in game.
    pub fn game_command(&self) -> String {
        match self {
            Self::Say => "/s".to_string(),
            Self::Shout => "/sh".to_string(),
            Self::Yell => "/y".to_string(),
            Self::Tell => "/tell".to_string(),
            Self::Party => "/p".to_string(),
            Self::Alliance => "/a".to_string(),
            Self::FreeCompany => "/fc".to_string(),
            Self::NoviceNetwork => "/n".to_string(),
            Self::Emote => "/em".to_string(),
            Self::Echo => "/echo".to_string(),
            Self::Linkshell(n) => format!("/l{}", n),
            Self::CrossLinkshell(n) => format!("/cwl{}", n),
        }
    }
}

impl fmt::Display for ChatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linkshell(n) => write!(f, "ls{}", n),
            Self::CrossLinkshell(n) => write!(f, "cwls{}", n),
            other => {
                let s = match other {
                    Self::Say => "say",
                    Self::Shout => "shout",
                    Self::Yell => "yell",
                    Self::Tell => "tell",
                    Self::Party => "party",
                    Self::Alliance => "alliance",
                    Self::FreeCompany => "freecompany",
                    Self::NoviceNetwork => "novice",
                    Self::Emote => "emote",
                    Self::Echo => "echo",
                    _ => unreachable!(),
                };
                f.write_str(s)
            }
        }
    }
}

/// A chat message emitted by the game chat source.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub chat_kind: ChatKind,
    pub sender_name: String,
    pub sender_world: String,
    pub content: String,
    /// Other party of a tell, as "Name@World".
    pub correspondent: Option<String>,
}

/// Compound sender identity ("Name@World").
///
/// Keys the burst buffers and the penalty box; worldless senders
/// (system messages) key on the bare name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SenderKey(String);

impl SenderKey {
    pub fn new(name: &str, world: &str) -> Self {
        if world.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{}@{}", name, world))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SenderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of a Discord destination channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Forum,
    Thread,
}

/// A destination channel or thread known to the channel directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    /// Parent forum/text channel for threads.
    pub parent_id: Option<ChannelId>,
}

impl ChannelRecord {
    /// A plain text-channel record for an id the directory has not seen.
    pub fn unresolved(id: ChannelId) -> Self {
        Self {
            id,
            name: String::new(),
            kind: ChannelKind::Text,
            parent_id: None,
        }
    }
}

/// A cached webhook usable to post under a custom display name.
#[derive(Debug, Clone)]
pub struct WebhookIdentity {
    pub channel_id: ChannelId,
    pub webhook_id: WebhookId,
    pub token: String,
    pub name: String,
}

/// Content of a single webhook send.
#[derive(Debug, Clone)]
pub struct WebhookPayload {
    pub content: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Message received from Discord, reduced to what the pipeline needs.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author: String,
    pub content: String,
}
