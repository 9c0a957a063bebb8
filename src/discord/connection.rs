//! Serenity-backed implementation of the platform traits.
//!
//! Maps serenity's error surface onto the transient/permanent split the
//! retry policy expects: rate limits, timeouts, and server errors retry;
//! auth and missing-resource responses abort.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serenity::builder::{CreateForumPost, CreateMessage, CreateWebhook};
use serenity::cache::Cache;
use serenity::http::{Http, HttpError};
use serenity::model::channel::ChannelType;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use tracing::debug;

use crate::common::error::{RelayError, RelayResult};
use crate::common::platform::{ChannelEnumerator, PlatformConnection};
use crate::common::types::{ChannelKind, ChannelRecord, WebhookIdentity, WebhookPayload};

/// Statuses worth another attempt.
fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn classify(operation: &str, error: serenity::Error) -> RelayError {
    let message = format!("{}: {}", operation, error);
    match &error {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
            if is_transient_status(response.status_code) {
                RelayError::transient(message)
            } else {
                RelayError::permanent(message)
            }
        }
        // Connection-level failures and gateway hiccups are worth retrying.
        _ => RelayError::transient(message),
    }
}

pub struct DiscordConnection {
    http: Arc<Http>,
}

impl DiscordConnection {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    fn payload_map(payload: &WebhookPayload) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("content".to_string(), payload.content.clone().into());
        map.insert("username".to_string(), payload.username.clone().into());
        if let Some(avatar_url) = &payload.avatar_url {
            map.insert("avatar_url".to_string(), avatar_url.clone().into());
        }
        serde_json::Value::Object(map)
    }
}

#[async_trait]
impl PlatformConnection for DiscordConnection {
    async fn create_thread(
        &self,
        forum_id: ChannelId,
        title: &str,
        initial_content: &str,
    ) -> RelayResult<ChannelRecord> {
        let post = CreateForumPost::new(title, CreateMessage::new().content(initial_content));
        let thread = forum_id
            .create_forum_post(&self.http, post)
            .await
            .map_err(|e| classify("create forum post", e))?;
        Ok(ChannelRecord {
            id: thread.id,
            name: thread.name.to_string(),
            kind: ChannelKind::Thread,
            parent_id: thread.parent_id,
        })
    }

    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> RelayResult<()> {
        self.http
            .delete_message(channel_id, message_id, None)
            .await
            .map_err(|e| classify("delete message", e))
    }

    async fn list_webhooks(&self, channel_id: ChannelId) -> RelayResult<Vec<WebhookIdentity>> {
        let hooks = self
            .http
            .get_channel_webhooks(channel_id)
            .await
            .map_err(|e| classify("list webhooks", e))?;
        // Webhooks without a token belong to other applications.
        Ok(hooks
            .into_iter()
            .filter_map(|hook| {
                let token = hook.token?;
                Some(WebhookIdentity {
                    channel_id,
                    webhook_id: hook.id,
                    token: token.expose_secret().to_string(),
                    name: hook.name.map(|n| n.to_string()).unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn create_webhook(
        &self,
        channel_id: ChannelId,
        name: &str,
    ) -> RelayResult<WebhookIdentity> {
        let hook = channel_id
            .create_webhook(&self.http, CreateWebhook::new(name))
            .await
            .map_err(|e| classify("create webhook", e))?;
        let token = hook.token.ok_or_else(|| {
            RelayError::consistency(format!("created webhook on {} has no token", channel_id))
        })?;
        Ok(WebhookIdentity {
            channel_id,
            webhook_id: hook.id,
            token: token.expose_secret().to_string(),
            name: name.to_string(),
        })
    }

    async fn execute_webhook(
        &self,
        identity: &WebhookIdentity,
        thread_id: Option<ChannelId>,
        payload: &WebhookPayload,
    ) -> RelayResult<MessageId> {
        let map = Self::payload_map(payload);
        let message = self
            .http
            .execute_webhook(
                identity.webhook_id,
                thread_id,
                &identity.token,
                true,
                Vec::new(),
                &map,
            )
            .await
            .map_err(|e| classify("execute webhook", e))?;
        message.map(|m| m.id).ok_or_else(|| {
            RelayError::consistency("webhook execution returned no message".to_string())
        })
    }

    async fn edit_webhook_message(
        &self,
        identity: &WebhookIdentity,
        thread_id: Option<ChannelId>,
        message_id: MessageId,
        content: &str,
    ) -> RelayResult<()> {
        let map = serde_json::json!({ "content": content });
        self.http
            .edit_webhook_message(
                identity.webhook_id,
                thread_id,
                &identity.token,
                message_id,
                &map,
                Vec::new(),
            )
            .await
            .map(|_| ())
            .map_err(|e| classify("edit webhook message", e))
    }

    async fn delete_webhook_message(
        &self,
        identity: &WebhookIdentity,
        thread_id: Option<ChannelId>,
        message_id: MessageId,
    ) -> RelayResult<()> {
        self.http
            .delete_webhook_message(identity.webhook_id, thread_id, &identity.token, message_id)
            .await
            .map_err(|e| classify("delete webhook message", e))
    }
}

/// Topology source backed by serenity's gateway cache.
pub struct CacheEnumerator {
    cache: Arc<Cache>,
    guild_id: Option<GuildId>,
}

impl CacheEnumerator {
    pub fn new(cache: Arc<Cache>, guild_id: Option<GuildId>) -> Self {
        Self { cache, guild_id }
    }

    fn channel_kind(kind: ChannelType) -> Option<ChannelKind> {
        match kind {
            ChannelType::Text | ChannelType::News => Some(ChannelKind::Text),
            ChannelType::Forum => Some(ChannelKind::Forum),
            _ => None,
        }
    }
}

#[async_trait]
impl ChannelEnumerator for CacheEnumerator {
    async fn enumerate(&self) -> RelayResult<Vec<ChannelRecord>> {
        let mut records = Vec::new();

        for guild_id in self.cache.guilds() {
            if let Some(wanted) = self.guild_id {
                if guild_id != wanted {
                    continue;
                }
            }
            let Some(guild) = self.cache.guild(guild_id) else {
                continue;
            };

            for channel in guild.channels.values() {
                if let Some(kind) = Self::channel_kind(channel.kind) {
                    records.push(ChannelRecord {
                        id: channel.id,
                        name: channel.name.to_string(),
                        kind,
                        parent_id: None,
                    });
                }
            }

            for thread in guild.threads.iter() {
                records.push(ChannelRecord {
                    id: thread.id,
                    name: thread.name.to_string(),
                    kind: ChannelKind::Thread,
                    parent_id: thread.parent_id,
                });
            }
        }

        debug!(count = records.len(), "enumerated cached channels");
        Ok(records)
    }
}
