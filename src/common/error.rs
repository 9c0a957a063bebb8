//! Error types for the application.

use thiserror::Error;

/// Relay-side error taxonomy.
///
/// Transport failures are split into transient (retried with backoff) and
/// permanent (aborted immediately). Neither is ever raised across the relay
/// boundary on an expected failure path; callers see sentinel results.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("transient transport failure: {message}")]
    TransientTransport { message: String },

    #[error("transport failure: {message}")]
    PermanentTransport { message: String },

    #[error("consistency error: {message}")]
    Consistency { message: String },

    #[error("game delivery failed: {message}")]
    Delivery { message: String },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RelayError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientTransport {
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::PermanentTransport {
            message: message.into(),
        }
    }

    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Whether the retry policy should try this operation again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientTransport { .. })
    }
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

/// Result type alias for relay operations.
pub type RelayResult<T> = std::result::Result<T, RelayError>;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
