//! Configuration loading and validation.

pub mod env;
pub mod store;
pub mod types;

use std::path::Path;

use crate::common::error::{ConfigError, ConfigResult};
use crate::common::types::ChatKind;
use types::Config;

/// Load configuration from a JSON file, apply env overrides, and validate.
pub fn load_and_validate(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let path = path.as_ref();

    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.display().to_string(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&raw).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;

    let config = env::apply_env_overrides(config);
    validate(&config)?;
    Ok(config)
}

/// Reject configurations that cannot possibly run.
fn validate(config: &Config) -> ConfigResult<()> {
    if config.discord.token.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            message: "discord.token is empty (set it in the config file or FERRYMAN_DISCORD_TOKEN)"
                .to_string(),
        });
    }

    if config.filter.threshold < 1 {
        return Err(ConfigError::ValidationError {
            message: format!(
                "filter.threshold must be at least 1, got {}",
                config.filter.threshold
            ),
        });
    }

    for (kind, id) in &config.mappings.chat_kinds {
        if ChatKind::parse(kind).is_none() {
            return Err(ConfigError::ValidationError {
                message: format!("mappings.chat_kinds has unknown chat kind '{}'", kind),
            });
        }
        if *id == 0 {
            return Err(ConfigError::ValidationError {
                message: format!("mappings.chat_kinds['{}'] is zero", kind),
            });
        }
    }

    for (label, id) in &config.mappings.labels {
        if label.trim().is_empty() || *id == 0 {
            return Err(ConfigError::ValidationError {
                message: "mappings.labels entries need a non-empty label and non-zero id"
                    .to_string(),
            });
        }
    }

    Ok(())
}
