//! Destination resolution for outbound messages.
//!
//! Static chat-kind mappings come first; forum destinations with a known
//! correspondent resolve to a per-conversation thread, created lazily on
//! first contact and persisted through the config store.

use std::collections::HashMap;
use std::sync::Arc;

use serenity::model::id::ChannelId;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::common::platform::PlatformConnection;
use crate::common::types::{ChannelKind, ChannelRecord, ChatKind};
use crate::config::store::ConfigStore;
use crate::discord::directory::ChannelDirectory;

pub struct ConversationRouter {
    type_routes: HashMap<ChatKind, ChannelId>,
    default_channel: Option<ChannelId>,
    directory: Arc<ChannelDirectory>,
    connection: Arc<dyn PlatformConnection>,
    store: Arc<dyn ConfigStore>,
    /// Serializes first-contact thread creation so sequential sends to a new
    /// correspondent create exactly one thread.
    thread_create_lock: Mutex<()>,
}

impl ConversationRouter {
    pub fn new(
        type_routes: HashMap<ChatKind, ChannelId>,
        default_channel: Option<ChannelId>,
        directory: Arc<ChannelDirectory>,
        connection: Arc<dyn PlatformConnection>,
        store: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            type_routes,
            default_channel,
            directory,
            connection,
            store,
            thread_create_lock: Mutex::new(()),
        }
    }

    /// Resolve a chat event to its destination channel or thread.
    ///
    /// Returns `None` when no mapping and no default exist, or when a
    /// required thread could not be created; the caller drops the event
    /// silently either way.
    pub async fn resolve_destination(
        &self,
        kind: ChatKind,
        correspondent: Option<&str>,
    ) -> Option<ChannelRecord> {
        let channel_id = match self.type_routes.get(&kind).copied() {
            Some(id) => id,
            None => match self.default_channel {
                Some(id) => id,
                None => {
                    debug!(%kind, "no destination mapping, dropping event");
                    return None;
                }
            },
        };

        let record = self
            .directory
            .find(channel_id)
            .unwrap_or_else(|| ChannelRecord::unresolved(channel_id));

        if record.kind == ChannelKind::Forum {
            if let Some(correspondent) = correspondent {
                return self.thread_destination(&record, correspondent).await;
            }
        }

        Some(record)
    }

    /// Resolve or lazily create the conversation thread for a correspondent
    /// under a forum destination.
    pub async fn thread_destination(
        &self,
        forum: &ChannelRecord,
        correspondent: &str,
    ) -> Option<ChannelRecord> {
        if let Some(thread_id) = self.store.thread_for(correspondent).await {
            return Some(self.thread_record(forum, correspondent, thread_id));
        }

        let _guard = self.thread_create_lock.lock().await;

        // A concurrent first-send may have created it while we waited.
        if let Some(thread_id) = self.store.thread_for(correspondent).await {
            return Some(self.thread_record(forum, correspondent, thread_id));
        }

        let initial = format!("Conversation with {}", correspondent);
        match self
            .connection
            .create_thread(forum.id, correspondent, &initial)
            .await
        {
            Ok(thread) => {
                info!(
                    forum_id = %forum.id,
                    thread_id = %thread.id,
                    correspondent,
                    "created conversation thread"
                );
                if let Err(e) = self.store.record_thread(correspondent, thread.id.get()).await {
                    warn!(correspondent, "failed to persist thread mapping: {}", e);
                }
                Some(thread)
            }
            Err(e) => {
                warn!(
                    forum_id = %forum.id,
                    correspondent,
                    "failed to create conversation thread: {}",
                    e
                );
                None
            }
        }
    }

    fn thread_record(
        &self,
        forum: &ChannelRecord,
        correspondent: &str,
        thread_id: u64,
    ) -> ChannelRecord {
        ChannelRecord {
            id: ChannelId::new(thread_id),
            name: correspondent.to_string(),
            kind: ChannelKind::Thread,
            parent_id: Some(forum.id),
        }
    }
}
