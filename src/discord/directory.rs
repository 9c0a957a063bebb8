//! Event-driven cache of destination channels and threads.
//!
//! The directory holds an immutable snapshot of the channel topology and
//! replaces it wholesale on every topology-change event. Readers borrow the
//! current snapshot through a watch channel, so the event-handling path
//! never blocks on them and nobody observes a half-built snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serenity::model::id::ChannelId;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::common::platform::ChannelEnumerator;
use crate::common::types::{ChannelKind, ChannelRecord};

/// One atomically-replaced view of the channel topology.
#[derive(Debug, Default)]
pub struct DirectorySnapshot {
    pub channels: Vec<ChannelRecord>,
}

/// Always-fresh channel/thread cache.
pub struct ChannelDirectory {
    snapshot: watch::Sender<Arc<DirectorySnapshot>>,
    enumerator: Mutex<Option<Arc<dyn ChannelEnumerator>>>,
}

impl ChannelDirectory {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(DirectorySnapshot::default()));
        Self {
            snapshot,
            enumerator: Mutex::new(None),
        }
    }

    /// Attach the topology source. The caller refreshes afterwards; binding
    /// alone does not enumerate.
    pub fn bind(&self, enumerator: Arc<dyn ChannelEnumerator>) {
        *self.enumerator.lock().expect("enumerator lock poisoned") = Some(enumerator);
    }

    /// Detach and clear cached state. Safe to call repeatedly or before
    /// `bind`.
    pub fn unbind(&self) {
        *self.enumerator.lock().expect("enumerator lock poisoned") = None;
        self.snapshot
            .send_replace(Arc::new(DirectorySnapshot::default()));
    }

    /// Rebuild the snapshot from the bound source.
    ///
    /// Enumeration failure keeps the prior snapshot; callers keep reading
    /// slightly stale topology instead of seeing an error.
    pub async fn refresh(&self) {
        let enumerator = self
            .enumerator
            .lock()
            .expect("enumerator lock poisoned")
            .clone();
        let Some(enumerator) = enumerator else {
            debug!("directory refresh skipped, no topology source bound");
            return;
        };

        match enumerator.enumerate().await {
            Ok(channels) => {
                debug!(count = channels.len(), "channel directory rebuilt");
                self.snapshot
                    .send_replace(Arc::new(DirectorySnapshot { channels }));
            }
            Err(e) => {
                warn!("channel enumeration failed, keeping prior snapshot: {}", e);
            }
        }
    }

    /// Force a synchronous rebuild.
    pub async fn invalidate(&self) {
        self.refresh().await;
    }

    /// Current snapshot; cheap to take, never blocks writers.
    pub fn snapshot(&self) -> Arc<DirectorySnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn text_channels(&self) -> Vec<ChannelRecord> {
        self.channels_of_kind(ChannelKind::Text)
    }

    pub fn forum_channels(&self) -> Vec<ChannelRecord> {
        self.channels_of_kind(ChannelKind::Forum)
    }

    fn channels_of_kind(&self, kind: ChannelKind) -> Vec<ChannelRecord> {
        self.snapshot()
            .channels
            .iter()
            .filter(|ch| ch.kind == kind)
            .cloned()
            .collect()
    }

    /// Threads belonging to a forum. Unknown forums yield an empty map.
    pub fn threads_for_forum(&self, forum_id: ChannelId) -> HashMap<ChannelId, String> {
        self.snapshot()
            .channels
            .iter()
            .filter(|ch| ch.kind == ChannelKind::Thread && ch.parent_id == Some(forum_id))
            .map(|ch| (ch.id, ch.name.clone()))
            .collect()
    }

    /// Look up a channel or thread by id in the latest snapshot.
    pub fn find(&self, id: ChannelId) -> Option<ChannelRecord> {
        self.snapshot()
            .channels
            .iter()
            .find(|ch| ch.id == id)
            .cloned()
    }
}

impl Default for ChannelDirectory {
    fn default() -> Self {
        Self::new()
    }
}
