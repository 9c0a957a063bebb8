//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `FERRYMAN_DISCORD_TOKEN` - Discord bot token
//! - `FERRYMAN_DISCORD_GUILD_ID` - Discord guild id
//! - `FERRYMAN_CONFIG` - path to the config file

use std::env;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "FERRYMAN";

/// Apply environment variable overrides to a config.
///
/// Lets the token live outside the config file.
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(token) = env::var(format!("{}_DISCORD_TOKEN", ENV_PREFIX)) {
        config.discord.token = token;
    }

    if let Ok(guild_id) = env::var(format!("{}_DISCORD_GUILD_ID", ENV_PREFIX)) {
        if let Ok(id) = guild_id.parse() {
            config.discord.guild_id = Some(id);
        }
    }

    config
}

/// Get the config file path from environment or use default.
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "ferryman.json".to_string())
}
