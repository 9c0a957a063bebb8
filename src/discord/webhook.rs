//! Webhook identity management and retried dispatch.
//!
//! One webhook per destination channel, cached for the process lifetime and
//! reused for every thread under that channel. Send, edit, and delete all
//! run under the shared transport retry policy; exhaustion surfaces as a
//! sentinel failure, never as an error across the relay boundary.

use std::collections::HashMap;
use std::sync::Arc;

use serenity::model::id::{ChannelId, MessageId};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::common::error::{RelayError, RelayResult};
use crate::common::platform::PlatformConnection;
use crate::common::retry::retry_transport;
use crate::common::types::{ChannelKind, ChannelRecord, WebhookIdentity, WebhookPayload};
use crate::discord::directory::ChannelDirectory;

/// Display name of relay-owned webhooks; existing ones are reused by name.
pub const DEFAULT_WEBHOOK_NAME: &str = "Ferryman Relay";

struct ResolvedTarget {
    identity: WebhookIdentity,
    thread_id: Option<ChannelId>,
}

pub struct WebhookGateway {
    connection: Arc<dyn PlatformConnection>,
    directory: Arc<ChannelDirectory>,
    /// Identity cache keyed by resolved (non-thread) channel id.
    identities: Mutex<HashMap<ChannelId, WebhookIdentity>>,
    webhook_name: String,
}

impl WebhookGateway {
    pub fn new(
        connection: Arc<dyn PlatformConnection>,
        directory: Arc<ChannelDirectory>,
        webhook_name: Option<String>,
    ) -> Self {
        Self {
            connection,
            directory,
            identities: Mutex::new(HashMap::new()),
            webhook_name: webhook_name.unwrap_or_else(|| DEFAULT_WEBHOOK_NAME.to_string()),
        }
    }

    /// Send a payload to a channel or thread. Returns `None` on failure;
    /// callers must treat that as non-delivery.
    pub async fn send(&self, channel: &ChannelRecord, payload: &WebhookPayload) -> Option<MessageId> {
        let target = match self.resolve_target(channel).await {
            Ok(target) => target,
            Err(e) => {
                error!(channel_id = %channel.id, "webhook identity unavailable: {}", e);
                return None;
            }
        };

        let result = retry_transport("webhook send", || async {
            self.connection
                .execute_webhook(&target.identity, target.thread_id, payload)
                .await
        })
        .await;

        match result {
            Ok(message_id) => Some(message_id),
            Err(e) => {
                error!(channel_id = %channel.id, "webhook send failed: {}", e);
                None
            }
        }
    }

    /// Edit a previously sent webhook message. Returns false on failure.
    pub async fn edit(
        &self,
        channel: &ChannelRecord,
        message_id: MessageId,
        content: &str,
    ) -> bool {
        let target = match self.resolve_target(channel).await {
            Ok(target) => target,
            Err(e) => {
                error!(channel_id = %channel.id, "webhook identity unavailable: {}", e);
                return false;
            }
        };

        let result = retry_transport("webhook edit", || async {
            self.connection
                .edit_webhook_message(&target.identity, target.thread_id, message_id, content)
                .await
        })
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                error!(
                    channel_id = %channel.id,
                    message_id = %message_id,
                    "webhook edit failed: {}",
                    e
                );
                false
            }
        }
    }

    /// Delete a previously sent webhook message. Returns false on failure.
    pub async fn delete(&self, channel: &ChannelRecord, message_id: MessageId) -> bool {
        let target = match self.resolve_target(channel).await {
            Ok(target) => target,
            Err(e) => {
                error!(channel_id = %channel.id, "webhook identity unavailable: {}", e);
                return false;
            }
        };

        let result = retry_transport("webhook delete", || async {
            self.connection
                .delete_webhook_message(&target.identity, target.thread_id, message_id)
                .await
        })
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                error!(
                    channel_id = %channel.id,
                    message_id = %message_id,
                    "webhook delete failed: {}",
                    e
                );
                false
            }
        }
    }

    /// Drop all cached identities (on disconnect).
    pub async fn clear_cache(&self) {
        let mut identities = self.identities.lock().await;
        if !identities.is_empty() {
            debug!(count = identities.len(), "clearing webhook identity cache");
        }
        identities.clear();
    }

    /// Resolve a destination to the webhook identity of its (parent)
    /// channel plus the thread target parameter, if any.
    async fn resolve_target(&self, channel: &ChannelRecord) -> RelayResult<ResolvedTarget> {
        let (resolved_id, thread_id) = if channel.kind == ChannelKind::Thread {
            let parent = channel.parent_id.or_else(|| {
                self.directory
                    .find(channel.id)
                    .and_then(|record| record.parent_id)
            });
            match parent {
                Some(parent) => (parent, Some(channel.id)),
                None => {
                    return Err(RelayError::consistency(format!(
                        "thread {} has no resolvable parent channel",
                        channel.id
                    )))
                }
            }
        } else {
            (channel.id, None)
        };

        let identity = self.identity_for(resolved_id).await?;
        Ok(ResolvedTarget {
            identity,
            thread_id,
        })
    }

    /// Look up or create the webhook identity for a resolved channel.
    async fn identity_for(&self, channel_id: ChannelId) -> RelayResult<WebhookIdentity> {
        if let Some(identity) = self.identities.lock().await.get(&channel_id) {
            return Ok(identity.clone());
        }

        let existing = self.connection.list_webhooks(channel_id).await?;
        let identity = match existing
            .into_iter()
            .find(|hook| hook.name == self.webhook_name)
        {
            Some(found) => {
                debug!(channel_id = %channel_id, "reusing existing webhook");
                found
            }
            None => {
                let created = self
                    .connection
                    .create_webhook(channel_id, &self.webhook_name)
                    .await?;
                info!(channel_id = %channel_id, "created relay webhook");
                created
            }
        };

        // Inserted only after the network call completed, so an abandoned
        // call never leaves a half-built entry behind.
        self.identities
            .lock()
            .await
            .insert(channel_id, identity.clone());
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;
    use serenity::model::id::WebhookId;

    use super::*;

    #[derive(Default)]
    struct FakeConnection {
        list_calls: AtomicU64,
        create_calls: AtomicU64,
        execute_calls: AtomicU64,
        delete_calls: AtomicU64,
        /// Number of leading execute attempts that fail transiently.
        transient_failures: AtomicU64,
        /// When set, execute fails permanently.
        permanent: AtomicU64,
        /// Webhook name reported by list_webhooks (empty = none).
        existing_name: std::sync::Mutex<Option<String>>,
    }

    impl FakeConnection {
        fn identity(channel_id: ChannelId, name: &str) -> WebhookIdentity {
            WebhookIdentity {
                channel_id,
                webhook_id: WebhookId::new(900),
                token: "token".to_string(),
                name: name.to_string(),
            }
        }
    }

    #[async_trait]
    impl PlatformConnection for FakeConnection {
        async fn create_thread(
            &self,
            _forum_id: ChannelId,
            _title: &str,
            _initial_content: &str,
        ) -> RelayResult<ChannelRecord> {
            Err(RelayError::permanent("not used"))
        }

        async fn delete_message(
            &self,
            _channel_id: ChannelId,
            _message_id: MessageId,
        ) -> RelayResult<()> {
            Ok(())
        }

        async fn list_webhooks(&self, channel_id: ChannelId) -> RelayResult<Vec<WebhookIdentity>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .existing_name
                .lock()
                .unwrap()
                .as_deref()
                .map(|name| vec![Self::identity(channel_id, name)])
                .unwrap_or_default())
        }

        async fn create_webhook(
            &self,
            channel_id: ChannelId,
            name: &str,
        ) -> RelayResult<WebhookIdentity> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::identity(channel_id, name))
        }

        async fn execute_webhook(
            &self,
            _identity: &WebhookIdentity,
            _thread_id: Option<ChannelId>,
            _payload: &WebhookPayload,
        ) -> RelayResult<MessageId> {
            let n = self.execute_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.permanent.load(Ordering::SeqCst) != 0 {
                return Err(RelayError::permanent("missing access"));
            }
            if n <= self.transient_failures.load(Ordering::SeqCst) {
                return Err(RelayError::transient("gateway timeout"));
            }
            Ok(MessageId::new(5000 + n))
        }

        async fn edit_webhook_message(
            &self,
            _identity: &WebhookIdentity,
            _thread_id: Option<ChannelId>,
            _message_id: MessageId,
            _content: &str,
        ) -> RelayResult<()> {
            Ok(())
        }

        async fn delete_webhook_message(
            &self,
            _identity: &WebhookIdentity,
            _thread_id: Option<ChannelId>,
            _message_id: MessageId,
        ) -> RelayResult<()> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn text_channel(id: u64) -> ChannelRecord {
        ChannelRecord {
            id: ChannelId::new(id),
            name: "chat".to_string(),
            kind: ChannelKind::Text,
            parent_id: None,
        }
    }

    fn thread_channel(id: u64, parent: u64) -> ChannelRecord {
        ChannelRecord {
            id: ChannelId::new(id),
            name: "Aeryn@Gilgamesh".to_string(),
            kind: ChannelKind::Thread,
            parent_id: Some(ChannelId::new(parent)),
        }
    }

    fn gateway(connection: Arc<FakeConnection>) -> WebhookGateway {
        WebhookGateway::new(connection, Arc::new(ChannelDirectory::new()), None)
    }

    #[tokio::test]
    async fn test_identity_created_once_and_cached() {
        let connection = Arc::new(FakeConnection::default());
        let gateway = gateway(connection.clone());
        let channel = text_channel(1);

        let payload = WebhookPayload {
            content: "hi".to_string(),
            username: "Aeryn@Gilgamesh".to_string(),
            avatar_url: None,
        };

        assert!(gateway.send(&channel, &payload).await.is_some());
        assert!(gateway.send(&channel, &payload).await.is_some());

        assert_eq!(connection.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(connection.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_existing_webhook_reused_by_name() {
        let connection = Arc::new(FakeConnection::default());
        *connection.existing_name.lock().unwrap() = Some(DEFAULT_WEBHOOK_NAME.to_string());
        let gateway = gateway(connection.clone());

        let payload = WebhookPayload {
            content: "hi".to_string(),
            username: "Aeryn@Gilgamesh".to_string(),
            avatar_url: None,
        };
        assert!(gateway.send(&text_channel(1), &payload).await.is_some());
        assert_eq!(connection.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_thread_and_parent_share_cache_slot() {
        let connection = Arc::new(FakeConnection::default());
        let gateway = gateway(connection.clone());

        let payload = WebhookPayload {
            content: "hi".to_string(),
            username: "Aeryn@Gilgamesh".to_string(),
            avatar_url: None,
        };

        assert!(gateway.send(&thread_channel(11, 1), &payload).await.is_some());
        assert!(gateway.send(&text_channel(1), &payload).await.is_some());

        // Both resolved to channel 1; a single identity serves both.
        assert_eq!(connection.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(connection.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unresolved_thread_parent_is_fatal_for_the_call() {
        let connection = Arc::new(FakeConnection::default());
        let gateway = gateway(connection.clone());

        let mut orphan = thread_channel(11, 1);
        orphan.parent_id = None;

        let payload = WebhookPayload {
            content: "hi".to_string(),
            username: "Aeryn@Gilgamesh".to_string(),
            avatar_url: None,
        };
        assert!(gateway.send(&orphan, &payload).await.is_none());
        assert_eq!(connection.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let connection = Arc::new(FakeConnection::default());
        connection.transient_failures.store(2, Ordering::SeqCst);
        let gateway = gateway(connection.clone());

        let payload = WebhookPayload {
            content: "hi".to_string(),
            username: "Aeryn@Gilgamesh".to_string(),
            avatar_url: None,
        };
        let id = gateway.send(&text_channel(1), &payload).await;
        assert!(id.is_some());
        assert_eq!(connection.execute_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_returns_sentinel_without_retry() {
        let connection = Arc::new(FakeConnection::default());
        connection.permanent.store(1, Ordering::SeqCst);
        let gateway = gateway(connection.clone());

        let payload = WebhookPayload {
            content: "hi".to_string(),
            username: "Aeryn@Gilgamesh".to_string(),
            avatar_url: None,
        };
        assert!(gateway.send(&text_channel(1), &payload).await.is_none());
        assert_eq!(connection.execute_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_relisting() {
        let connection = Arc::new(FakeConnection::default());
        let gateway = gateway(connection.clone());

        let payload = WebhookPayload {
            content: "hi".to_string(),
            username: "Aeryn@Gilgamesh".to_string(),
            avatar_url: None,
        };
        assert!(gateway.send(&text_channel(1), &payload).await.is_some());
        gateway.clear_cache().await;
        assert!(gateway.send(&text_channel(1), &payload).await.is_some());
        assert_eq!(connection.list_calls.load(Ordering::SeqCst), 2);
    }
}
