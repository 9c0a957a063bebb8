//! Persisted correspondent-thread mappings.
//!
//! The relay mutates exactly one piece of configuration at runtime: the
//! correspondent -> forum-thread map, extended whenever a first tell from a
//! new correspondent creates a thread. `ConfigStore` is the seam the router
//! saves through; the JSON implementation rewrites the whole config file.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::common::error::{ConfigError, RelayError, RelayResult};
use crate::config::types::Config;

/// Runtime-mutable mapping storage.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Thread id recorded for a correspondent, if any.
    async fn thread_for(&self, correspondent: &str) -> Option<u64>;

    /// Reverse lookup: correspondent owning a thread id, if any.
    async fn correspondent_for(&self, thread_id: u64) -> Option<String>;

    /// Record a new correspondent -> thread mapping and persist it.
    async fn record_thread(&self, correspondent: &str, thread_id: u64) -> RelayResult<()>;
}

/// File-backed store rewriting the config as pretty JSON on every mutation.
pub struct JsonConfigStore {
    path: PathBuf,
    config: RwLock<Config>,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            path: path.into(),
            config: RwLock::new(config),
        }
    }

    fn save(&self, config: &Config) -> RelayResult<()> {
        let rendered = serde_json::to_string_pretty(config).map_err(|e| {
            RelayError::Config(ConfigError::ParseError {
                message: e.to_string(),
            })
        })?;
        std::fs::write(&self.path, rendered).map_err(|e| {
            RelayError::Config(ConfigError::IoError {
                path: self.path.display().to_string(),
                source: e,
            })
        })
    }
}

#[async_trait]
impl ConfigStore for JsonConfigStore {
    async fn thread_for(&self, correspondent: &str) -> Option<u64> {
        self.config
            .read()
            .await
            .mappings
            .threads
            .get(correspondent)
            .copied()
    }

    async fn correspondent_for(&self, thread_id: u64) -> Option<String> {
        self.config
            .read()
            .await
            .mappings
            .threads
            .iter()
            .find(|(_, id)| **id == thread_id)
            .map(|(key, _)| key.clone())
    }

    async fn record_thread(&self, correspondent: &str, thread_id: u64) -> RelayResult<()> {
        let mut config = self.config.write().await;
        config
            .mappings
            .threads
            .insert(correspondent.to_string(), thread_id);
        self.save(&config)?;
        info!(correspondent, thread_id, "persisted conversation thread mapping");
        Ok(())
    }
}

/// In-memory store for tests and embedding hosts without a config file.
#[derive(Default)]
pub struct MemoryConfigStore {
    threads: RwLock<HashMap<String, u64>>,
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn thread_for(&self, correspondent: &str) -> Option<u64> {
        self.threads.read().await.get(correspondent).copied()
    }

    async fn correspondent_for(&self, thread_id: u64) -> Option<String> {
        self.threads
            .read()
            .await
            .iter()
            .find(|(_, id)| **id == thread_id)
            .map(|(key, _)| key.clone())
    }

    async fn record_thread(&self, correspondent: &str, thread_id: u64) -> RelayResult<()> {
        self.threads
            .write()
            .await
            .insert(correspondent.to_string(), thread_id);
        Ok(())
    }
}
