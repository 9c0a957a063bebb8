//! Mutable relay state: dedup set, per-sender buffers, penalty box, metrics.
//!
//! All of this is owned by the single `RelayPipeline` instance; nothing here
//! is global. Per-sender state lives behind its own mutex so the moderation
//! gate serializes decisions for one sender without cross-sender contention.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serenity::model::id::MessageId;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

use crate::common::types::{ChannelRecord, SenderKey};

/// Rolling window over which a sender's messages form one burst.
pub const BURST_WINDOW: Duration = Duration::from_secs(5);
/// How long a flagged sender stays suppressed.
pub const PENALTY_WINDOW: Duration = Duration::from_secs(10);
/// Age past which processed ids may be pruned.
pub const DEDUP_TTL: Duration = Duration::from_secs(600);
/// Set size that triggers pruning.
pub const DEDUP_PRUNE_THRESHOLD: usize = 1000;

/// Guard against forwarding the same platform message twice.
#[derive(Default)]
pub struct ProcessedIds {
    seen: Mutex<HashMap<MessageId, Instant>>,
}

impl ProcessedIds {
    /// Record a message id; returns false when it was already seen.
    ///
    /// Entries older than ten minutes are pruned once the set grows past a
    /// thousand entries.
    pub async fn first_sighting(&self, id: MessageId) -> bool {
        let mut seen = self.seen.lock().await;
        if seen.contains_key(&id) {
            return false;
        }

        let now = Instant::now();
        seen.insert(id, now);
        if seen.len() > DEDUP_PRUNE_THRESHOLD {
            seen.retain(|_, at| now.duration_since(*at) <= DEDUP_TTL);
        }
        true
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.seen.lock().await.len()
    }
}

/// One delivered (or pending) message in a sender's burst buffer.
#[derive(Debug, Clone)]
pub struct BufferedSend {
    pub content: String,
    pub at: Instant,
    /// Destination and platform id once the webhook send succeeded; used for
    /// retroactive deletion.
    pub sent: Option<(ChannelRecord, MessageId)>,
}

/// Moderation state for a single sender.
#[derive(Debug, Default)]
pub struct SenderState {
    pub buffer: Vec<BufferedSend>,
    pub penalized_until: Option<Instant>,
}

impl SenderState {
    /// Drop buffer entries that fell out of the rolling window.
    pub fn prune_buffer(&mut self, now: Instant) {
        self.buffer
            .retain(|entry| now.duration_since(entry.at) <= BURST_WINDOW);
    }

    /// Buffered contents joined with a single space, for burst re-scoring.
    /// No whitespace normalization is applied; the concatenation is literal.
    pub fn burst_with(&self, content: &str) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut joined = self
            .buffer
            .iter()
            .map(|entry| entry.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        joined.push(' ');
        joined.push_str(content);
        Some(joined)
    }
}

/// Keyed-mutex arena over sender moderation state.
#[derive(Default)]
pub struct SenderArena {
    inner: Mutex<HashMap<SenderKey, Arc<Mutex<SenderState>>>>,
}

impl SenderArena {
    /// Handle to a sender's state, created on first use.
    pub async fn entry(&self, key: &SenderKey) -> Arc<Mutex<SenderState>> {
        let mut map = self.inner.lock().await;
        map.entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(SenderState::default())))
            .clone()
    }
}

/// Delivery counters for the process lifetime.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    pub delivered: AtomicU64,
    pub suppressed: AtomicU64,
    pub flagged: AtomicU64,
    pub duplicates: AtomicU64,
}

impl RelayMetrics {
    pub fn log_summary(&self) {
        info!(
            delivered = self.delivered.load(Ordering::Relaxed),
            suppressed = self.suppressed.load(Ordering::Relaxed),
            flagged = self.flagged.load(Ordering::Relaxed),
            duplicates = self.duplicates.load(Ordering::Relaxed),
            "relay counters"
        );
    }
}
