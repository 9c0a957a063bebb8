//! Configuration type definitions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub discord: DiscordConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub mappings: MappingsConfig,
}

/// Discord bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<u64>,
}

/// Relay behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Prefix that marks a Discord message as a bot command ("!" etc.).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_prefix: Option<String>,
    /// Whether prefix commands are dispatched at all.
    #[serde(default)]
    pub enable_commands: bool,
    /// Game commands Discord users may run through the prefix.
    #[serde(default)]
    pub command_whitelist: Vec<String>,
    /// Global switch for the advertisement filter.
    #[serde(default = "default_true")]
    pub enable_ad_filter: bool,
    /// Destination when a chat kind has no mapping of its own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_channel: Option<u64>,
    /// Display name of the relay's webhooks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_name: Option<String>,
    /// Base URL for generated fallback avatars.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_fallback_base: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            command_prefix: None,
            enable_commands: false,
            command_whitelist: Vec::new(),
            enable_ad_filter: true,
            default_channel: None,
            webhook_name: None,
            avatar_fallback_base: None,
        }
    }
}

/// Advertisement scoring policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Phrases that exempt a message from scoring entirely.
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Regex patterns worth +2 each.
    #[serde(default)]
    pub high_patterns: Vec<String>,
    /// Keywords; three or more distinct hits are worth a flat +2.
    #[serde(default)]
    pub high_keywords: Vec<String>,
    /// Regex patterns worth +1 each.
    #[serde(default)]
    pub medium_patterns: Vec<String>,
    /// Keywords; two or more distinct hits are worth a flat +1.
    #[serde(default)]
    pub medium_keywords: Vec<String>,
    /// Score at which a message counts as an advertisement.
    #[serde(default = "default_threshold")]
    pub threshold: i32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            whitelist: Vec::new(),
            high_patterns: Vec::new(),
            high_keywords: Vec::new(),
            medium_patterns: Vec::new(),
            medium_keywords: Vec::new(),
            threshold: default_threshold(),
        }
    }
}

/// Channel mappings in both directions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingsConfig {
    /// Static chat-kind -> Discord channel id ("say", "fc", "ls1", ...).
    #[serde(default)]
    pub chat_kinds: HashMap<String, u64>,
    /// Dynamic label -> Discord channel id; inbound messages on the channel
    /// are spoken with "/<label>" in game.
    #[serde(default)]
    pub labels: HashMap<String, u64>,
    /// Correspondent ("Name@World") -> forum thread id. Mutated at runtime
    /// when tell conversations create threads.
    #[serde(default)]
    pub threads: HashMap<String, u64>,
    /// Channel ids exempt from the advertisement filter.
    #[serde(default)]
    pub unfiltered: Vec<u64>,
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> i32 {
    3
}
