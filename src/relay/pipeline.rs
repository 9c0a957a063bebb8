//! The relay orchestrator.
//!
//! One pipeline instance per process owns all mutable relay state: the
//! processed-id set, the per-sender burst buffers and penalty box, and the
//! delivery counters. Inbound Discord messages are deduplicated, matched to
//! a game chat route, forwarded, and their originals deleted to prevent echo
//! loops. Outbound game messages run through destination resolution, avatar
//! lookup, sanitization, and the moderation gate before the webhook send.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use serenity::model::id::ChannelId;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::common::platform::PlatformConnection;
use crate::common::types::{
    ChannelKind, ChannelRecord, ChatKind, ChatMessage, InboundMessage, SenderKey, WebhookPayload,
};
use crate::config::store::ConfigStore;
use crate::discord::webhook::WebhookGateway;
use crate::game::sanitize::sanitize;
use crate::game::{avatar::AvatarResolver, CommandHandler, GameChatSink};
use crate::relay::router::ConversationRouter;
use crate::relay::scorer::AdScorer;
use crate::relay::state::{BufferedSend, ProcessedIds, RelayMetrics, SenderArena, PENALTY_WINDOW};

/// Everything the pipeline is wired up with at startup.
pub struct PipelineDeps {
    pub router: Arc<ConversationRouter>,
    pub gateway: Arc<WebhookGateway>,
    pub connection: Arc<dyn PlatformConnection>,
    pub store: Arc<dyn ConfigStore>,
    pub game_sink: Arc<dyn GameChatSink>,
    pub avatar: Arc<dyn AvatarResolver>,
    pub scorer: AdScorer,
    /// Set when prefix commands are enabled.
    pub command_handler: Option<Arc<dyn CommandHandler>>,
    pub command_prefix: Option<String>,
    pub enable_ad_filter: bool,
    /// Channels (and forums owning threads) exempt from the ad filter.
    pub unfiltered: HashSet<ChannelId>,
    /// Inbound: dynamic label channels, spoken as "/<label>" in game.
    pub label_routes: HashMap<ChannelId, String>,
    /// Inbound: channels bound to a static chat kind.
    pub kind_routes: HashMap<ChannelId, ChatKind>,
}

pub struct RelayPipeline {
    deps: PipelineDeps,
    processed: ProcessedIds,
    senders: SenderArena,
    pub metrics: RelayMetrics,
}

impl RelayPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self {
            deps,
            processed: ProcessedIds::default(),
            senders: SenderArena::default(),
            metrics: RelayMetrics::default(),
        }
    }

    /// Handle one Discord message heading toward game chat.
    pub async fn handle_inbound(&self, message: InboundMessage) {
        if !self.processed.first_sighting(message.id).await {
            self.metrics.duplicates.fetch_add(1, Ordering::Relaxed);
            debug!(message_id = %message.id, "dropping duplicate message");
            return;
        }

        if let (Some(prefix), Some(handler)) = (
            self.deps.command_prefix.as_deref(),
            self.deps.command_handler.as_ref(),
        ) {
            if let Some(rest) = message.content.strip_prefix(prefix) {
                if !handler.handle(&message.author, rest.trim()).await {
                    debug!(author = %message.author, "unrecognized command");
                }
                return;
            }
        }

        // Route priority: dynamic labels, static chat kinds, then
        // correspondent threads.
        let line = if let Some(label) = self.deps.label_routes.get(&message.channel_id) {
            Some(format!("/{} {}", label, message.content))
        } else if let Some(kind) = self.deps.kind_routes.get(&message.channel_id) {
            Some(format!("{} {}", kind.game_command(), message.content))
        } else if let Some(correspondent) = self
            .deps
            .store
            .correspondent_for(message.channel_id.get())
            .await
        {
            Some(format!("/tell {} {}", correspondent, message.content))
        } else {
            None
        };

        let Some(line) = line else {
            debug!(channel_id = %message.channel_id, "inbound channel has no game route");
            return;
        };

        if let Err(e) = self.deps.game_sink.send_to_game(&line).await {
            warn!(channel_id = %message.channel_id, "failed to forward to game: {}", e);
            return;
        }

        // Delete the original so the relayed line does not echo back.
        if let Err(e) = self
            .deps
            .connection
            .delete_message(message.channel_id, message.id)
            .await
        {
            debug!(message_id = %message.id, "echo-suppression delete failed: {}", e);
        }
    }

    /// Relay one game chat message to its Discord destination.
    pub async fn handle_outbound(&self, message: ChatMessage) {
        self.send_to(None, message).await;
    }

    /// Relay a game message to a caller-chosen destination, or resolve one
    /// when `channel` is `None`. All failure paths are silent toward chat.
    pub async fn send_to(&self, channel: Option<ChannelRecord>, message: ChatMessage) {
        let destination = match channel {
            Some(record) => match self.thread_for_forum(record, &message).await {
                Some(record) => record,
                None => return,
            },
            None => {
                match self
                    .deps
                    .router
                    .resolve_destination(message.chat_kind, message.correspondent.as_deref())
                    .await
                {
                    Some(record) => record,
                    None => return,
                }
            }
        };

        let content = sanitize(&message.content);
        if content.trim().is_empty() {
            debug!(sender = %message.sender_name, "dropping blank outbound message");
            return;
        }

        let avatar_url = self
            .deps
            .avatar
            .avatar_url(&message.sender_name, &message.sender_world)
            .await;
        // A malformed avatar URL drops the avatar, never the message.
        let avatar_url = match url::Url::parse(&avatar_url) {
            Ok(_) => Some(avatar_url),
            Err(e) => {
                debug!(sender = %message.sender_name, "dropping malformed avatar url: {}", e);
                None
            }
        };

        let sender_key = SenderKey::new(&message.sender_name, &message.sender_world);
        let payload = WebhookPayload {
            content: content.clone(),
            username: sender_key.to_string(),
            avatar_url,
        };

        if !self.filter_applies(&destination) {
            if self.deps.gateway.send(&destination, &payload).await.is_some() {
                self.metrics.delivered.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }

        // The gate, the send, and the buffer append run under the sender's
        // lock so burst decisions for one sender are strictly ordered.
        let entry = self.senders.entry(&sender_key).await;
        let mut state = entry.lock().await;
        let now = Instant::now();

        if let Some(until) = state.penalized_until {
            if now < until {
                self.metrics.suppressed.fetch_add(1, Ordering::Relaxed);
                debug!(sender = %sender_key, "sender in penalty box, suppressing");
                return;
            }
            state.penalized_until = None;
        }

        state.prune_buffer(now);

        // Single message first; the concatenated burst only when it passes.
        let flagged = self.deps.scorer.is_advertisement(&content)
            || state
                .burst_with(&content)
                .map(|joined| self.deps.scorer.is_advertisement(&joined))
                .unwrap_or(false);

        if flagged {
            state.penalized_until = Some(now + PENALTY_WINDOW);
            self.metrics.flagged.fetch_add(1, Ordering::Relaxed);
            self.metrics.suppressed.fetch_add(1, Ordering::Relaxed);
            info!(
                sender = %sender_key,
                channel_id = %destination.id,
                "advertisement flagged, penalizing sender"
            );

            // Retroactively pull the earlier messages of the burst.
            for buffered in state.buffer.drain(..) {
                if let Some((record, message_id)) = buffered.sent {
                    if !self.deps.gateway.delete(&record, message_id).await {
                        debug!(message_id = %message_id, "retroactive delete failed");
                    }
                }
            }
            return;
        }

        let sent = self
            .deps
            .gateway
            .send(&destination, &payload)
            .await
            .map(|message_id| (destination.clone(), message_id));
        if sent.is_some() {
            self.metrics.delivered.fetch_add(1, Ordering::Relaxed);
        }
        state.buffer.push(BufferedSend {
            content,
            at: now,
            sent,
        });
    }

    /// Per-conversation thread under an explicitly chosen forum destination.
    async fn thread_for_forum(
        &self,
        record: ChannelRecord,
        message: &ChatMessage,
    ) -> Option<ChannelRecord> {
        if record.kind == ChannelKind::Forum {
            if let Some(correspondent) = message.correspondent.as_deref() {
                return self
                    .deps
                    .router
                    .thread_destination(&record, correspondent)
                    .await;
            }
        }
        Some(record)
    }

    fn filter_applies(&self, destination: &ChannelRecord) -> bool {
        if !self.deps.enable_ad_filter {
            return false;
        }
        if self.deps.unfiltered.contains(&destination.id) {
            return false;
        }
        // A thread inherits its parent's exemption.
        if let Some(parent) = destination.parent_id {
            if self.deps.unfiltered.contains(&parent) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serenity::model::id::MessageId;

    use super::*;
    use crate::common::error::{RelayError, RelayResult};
    use crate::common::platform::ChannelEnumerator;
    use crate::common::types::WebhookIdentity;
    use crate::config::store::MemoryConfigStore;
    use crate::config::types::FilterConfig;
    use crate::discord::directory::ChannelDirectory;
    use crate::relay::state::{BURST_WINDOW, PENALTY_WINDOW};

    #[derive(Default)]
    struct FakeConnection {
        executed: StdMutex<Vec<String>>,
        next_message_id: AtomicU64,
        deleted_messages: StdMutex<Vec<MessageId>>,
        deleted_webhook_messages: StdMutex<Vec<MessageId>>,
    }

    impl FakeConnection {
        fn executed_count(&self) -> usize {
            self.executed.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PlatformConnection for FakeConnection {
        async fn create_thread(
            &self,
            forum_id: ChannelId,
            title: &str,
            _initial_content: &str,
        ) -> RelayResult<ChannelRecord> {
            Ok(ChannelRecord {
                id: ChannelId::new(7000),
                name: title.to_string(),
                kind: ChannelKind::Thread,
                parent_id: Some(forum_id),
            })
        }

        async fn delete_message(
            &self,
            _channel_id: ChannelId,
            message_id: MessageId,
        ) -> RelayResult<()> {
            self.deleted_messages.lock().unwrap().push(message_id);
            Ok(())
        }

        async fn list_webhooks(&self, _channel_id: ChannelId) -> RelayResult<Vec<WebhookIdentity>> {
            Ok(Vec::new())
        }

        async fn create_webhook(
            &self,
            channel_id: ChannelId,
            name: &str,
        ) -> RelayResult<WebhookIdentity> {
            Ok(WebhookIdentity {
                channel_id,
                webhook_id: serenity::model::id::WebhookId::new(900),
                token: "token".to_string(),
                name: name.to_string(),
            })
        }

        async fn execute_webhook(
            &self,
            _identity: &WebhookIdentity,
            _thread_id: Option<ChannelId>,
            payload: &WebhookPayload,
        ) -> RelayResult<MessageId> {
            self.executed.lock().unwrap().push(payload.content.clone());
            let n = self.next_message_id.fetch_add(1, Ordering::SeqCst);
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
            message_id: MessageId,
        ) -> RelayResult<()> {
            self.deleted_webhook_messages
                .lock()
                .unwrap()
                .push(message_id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSink {
        lines: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl GameChatSink for FakeSink {
        async fn send_to_game(&self, content: &str) -> RelayResult<()> {
            self.lines.lock().unwrap().push(content.to_string());
            Ok(())
        }
    }

    struct FakeCommands {
        calls: AtomicU64,
    }

    #[async_trait]
    impl CommandHandler for FakeCommands {
        async fn handle(&self, _sender: &str, _content: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    struct BadAvatars;

    #[async_trait]
    impl AvatarResolver for BadAvatars {
        async fn avatar_url(&self, _name: &str, _world: &str) -> String {
            "not a url".to_string()
        }
    }

    struct StaticTopology(Vec<ChannelRecord>);

    #[async_trait]
    impl ChannelEnumerator for StaticTopology {
        async fn enumerate(&self) -> RelayResult<Vec<ChannelRecord>> {
            Ok(self.0.clone())
        }
    }

    fn text(id: u64) -> ChannelRecord {
        ChannelRecord {
            id: ChannelId::new(id),
            name: "chat".to_string(),
            kind: ChannelKind::Text,
            parent_id: None,
        }
    }

    fn policy() -> FilterConfig {
        FilterConfig {
            whitelist: Vec::new(),
            high_patterns: Vec::new(),
            high_keywords: vec!["gil".into(), "cheap".into(), "delivery".into()],
            medium_patterns: Vec::new(),
            medium_keywords: vec!["fast".into(), "stock".into()],
            threshold: 3,
        }
    }

    struct Harness {
        pipeline: RelayPipeline,
        connection: Arc<FakeConnection>,
        sink: Arc<FakeSink>,
        store: Arc<MemoryConfigStore>,
    }

    async fn harness(customize: impl FnOnce(&mut PipelineDeps)) -> Harness {
        let connection: Arc<FakeConnection> = Arc::new(FakeConnection::default());
        let directory = Arc::new(ChannelDirectory::new());
        directory.bind(Arc::new(StaticTopology(vec![text(1), text(2)])));
        directory.refresh().await;

        let store: Arc<MemoryConfigStore> = Arc::new(MemoryConfigStore::default());
        let sink: Arc<FakeSink> = Arc::new(FakeSink::default());
        let gateway = Arc::new(WebhookGateway::new(
            connection.clone(),
            directory.clone(),
            None,
        ));
        let router = Arc::new(ConversationRouter::new(
            HashMap::from([(ChatKind::Say, ChannelId::new(1))]),
            None,
            directory,
            connection.clone(),
            store.clone(),
        ));

        let mut deps = PipelineDeps {
            router,
            gateway,
            connection: connection.clone(),
            store: store.clone(),
            game_sink: sink.clone(),
            avatar: Arc::new(crate::game::avatar::FallbackAvatarResolver::default()),
            scorer: AdScorer::from_policy(&policy()),
            command_handler: None,
            command_prefix: None,
            enable_ad_filter: true,
            unfiltered: HashSet::new(),
            label_routes: HashMap::new(),
            kind_routes: HashMap::from([(ChannelId::new(1), ChatKind::Say)]),
        };
        customize(&mut deps);

        Harness {
            pipeline: RelayPipeline::new(deps),
            connection,
            sink,
            store,
        }
    }

    fn say(content: &str) -> ChatMessage {
        ChatMessage {
            chat_kind: ChatKind::Say,
            sender_name: "Aeryn".to_string(),
            sender_world: "Gilgamesh".to_string(),
            content: content.to_string(),
            correspondent: None,
        }
    }

    fn inbound(id: u64, channel: u64, content: &str) -> InboundMessage {
        InboundMessage {
            id: MessageId::new(id),
            channel_id: ChannelId::new(channel),
            author: "discord_user".to_string(),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_outbound_delivers_and_counts() {
        let h = harness(|_| {}).await;
        h.pipeline.handle_outbound(say("hello there")).await;

        assert_eq!(h.connection.executed_count(), 1);
        assert_eq!(h.pipeline.metrics.delivered.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_blank_content_aborts_before_gate_and_send() {
        let h = harness(|_| {}).await;
        h.pipeline.handle_outbound(say("   \t ")).await;

        assert_eq!(h.connection.executed_count(), 0);
        assert_eq!(h.pipeline.metrics.suppressed.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_glyph_content_is_sanitized_before_send() {
        let h = harness(|_| {}).await;
        h.pipeline
            .handle_outbound(say("\u{E061}\u{E062}\u{E063}"))
            .await;

        assert_eq!(h.connection.executed.lock().unwrap()[0], "ABC");
    }

    #[tokio::test(start_paused = true)]
    async fn test_penalty_box_suppresses_then_releases() {
        let h = harness(|_| {}).await;

        // Three high keywords plus two medium keywords flag immediately.
        h.pipeline
            .handle_outbound(say("gil cheap delivery fast stock"))
            .await;
        assert_eq!(h.connection.executed_count(), 0);
        assert_eq!(h.pipeline.metrics.flagged.load(Ordering::Relaxed), 1);

        // Clean messages stay suppressed inside the window.
        tokio::time::advance(Duration::from_secs(5)).await;
        h.pipeline.handle_outbound(say("how is everyone")).await;
        assert_eq!(h.connection.executed_count(), 0);
        assert_eq!(h.pipeline.metrics.suppressed.load(Ordering::Relaxed), 2);

        // Strictly after the window, delivery resumes.
        tokio::time::advance(PENALTY_WINDOW).await;
        h.pipeline.handle_outbound(say("how is everyone")).await;
        assert_eq!(h.connection.executed_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_concatenation_triggers_retroactive_deletion() {
        let h = harness(|_| {}).await;

        // Individually each message scores below threshold.
        h.pipeline.handle_outbound(say("gil here")).await;
        h.pipeline.handle_outbound(say("cheap fast")).await;
        assert_eq!(h.connection.executed_count(), 2);

        // The concatenated burst reaches threshold: three high keywords
        // plus two medium keywords.
        h.pipeline.handle_outbound(say("delivery stock")).await;
        assert_eq!(h.connection.executed_count(), 2);
        assert_eq!(
            h.connection.deleted_webhook_messages.lock().unwrap().len(),
            2
        );
        assert_eq!(h.pipeline.metrics.flagged.load(Ordering::Relaxed), 1);

        // And the sender landed in the penalty box.
        h.pipeline.handle_outbound(say("clean message")).await;
        assert_eq!(h.connection.executed_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_buffer_entries_leave_the_burst() {
        let h = harness(|_| {}).await;

        h.pipeline.handle_outbound(say("gil here")).await;
        tokio::time::advance(BURST_WINDOW + Duration::from_secs(1)).await;

        // With the first message out of the window, the rest of the burst
        // scores only two high keywords and stays below threshold.
        h.pipeline.handle_outbound(say("cheap fast")).await;
        h.pipeline.handle_outbound(say("delivery stock")).await;
        assert_eq!(h.connection.executed_count(), 3);
        assert_eq!(h.pipeline.metrics.flagged.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_unfiltered_channel_bypasses_gate() {
        let h = harness(|deps| {
            deps.unfiltered.insert(ChannelId::new(1));
        })
        .await;

        h.pipeline
            .handle_outbound(say("gil cheap delivery fast stock"))
            .await;
        assert_eq!(h.connection.executed_count(), 1);
        assert_eq!(h.pipeline.metrics.flagged.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_filter_disabled_globally() {
        let h = harness(|deps| {
            deps.enable_ad_filter = false;
        })
        .await;

        h.pipeline
            .handle_outbound(say("gil cheap delivery fast stock"))
            .await;
        assert_eq!(h.connection.executed_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_avatar_is_dropped_not_the_message() {
        let h = harness(|deps| {
            deps.avatar = Arc::new(BadAvatars);
        })
        .await;

        h.pipeline.handle_outbound(say("hello")).await;
        assert_eq!(h.connection.executed_count(), 1);
    }

    #[tokio::test]
    async fn test_inbound_dedup_forwards_once() {
        let h = harness(|_| {}).await;

        h.pipeline.handle_inbound(inbound(100, 1, "hello")).await;
        h.pipeline.handle_inbound(inbound(100, 1, "hello")).await;

        assert_eq!(h.sink.lines.lock().unwrap().len(), 1);
        assert_eq!(h.pipeline.metrics.duplicates.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_inbound_kind_route_formats_game_command() {
        let h = harness(|_| {}).await;

        h.pipeline.handle_inbound(inbound(100, 1, "hello")).await;
        assert_eq!(h.sink.lines.lock().unwrap()[0], "/s hello");

        // The original was deleted to prevent an echo loop.
        assert_eq!(
            h.connection.deleted_messages.lock().unwrap().as_slice(),
            &[MessageId::new(100)]
        );
    }

    #[tokio::test]
    async fn test_inbound_label_beats_kind() {
        let h = harness(|deps| {
            deps.label_routes
                .insert(ChannelId::new(1), "trade".to_string());
        })
        .await;

        h.pipeline.handle_inbound(inbound(100, 1, "selling ore")).await;
        assert_eq!(h.sink.lines.lock().unwrap()[0], "/trade selling ore");
    }

    #[tokio::test]
    async fn test_inbound_thread_routes_to_tell() {
        let h = harness(|_| {}).await;
        h.store.record_thread("Aeryn@Gilgamesh", 55).await.unwrap();

        h.pipeline.handle_inbound(inbound(100, 55, "hi")).await;
        assert_eq!(
            h.sink.lines.lock().unwrap()[0],
            "/tell Aeryn@Gilgamesh hi"
        );
    }

    #[tokio::test]
    async fn test_inbound_unrouted_channel_is_ignored() {
        let h = harness(|_| {}).await;

        h.pipeline.handle_inbound(inbound(100, 99, "hello")).await;
        assert!(h.sink.lines.lock().unwrap().is_empty());
        assert!(h.connection.deleted_messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_command_prefix_replaces_relay_handling() {
        let commands = Arc::new(FakeCommands {
            calls: AtomicU64::new(0),
        });
        let h = harness(|deps| {
            deps.command_prefix = Some("!".to_string());
            deps.command_handler = Some(commands.clone());
        })
        .await;

        h.pipeline.handle_inbound(inbound(100, 1, "!status")).await;
        assert_eq!(commands.calls.load(Ordering::SeqCst), 1);
        assert!(h.sink.lines.lock().unwrap().is_empty());
    }
}
