//! Messaging-platform boundary traits.
//!
//! The relay core talks to Discord only through these traits; the serenity
//! implementation lives in `discord::connection`. Tests substitute fakes.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, MessageId};

use crate::common::error::RelayResult;
use crate::common::types::{ChannelRecord, WebhookIdentity, WebhookPayload};

/// Raw platform operations the relay needs.
///
/// Implementations map their own error types onto the transient/permanent
/// split in `RelayError`; retrying is the caller's concern.
#[async_trait]
pub trait PlatformConnection: Send + Sync {
    /// Create a thread in a forum channel with an initial post.
    async fn create_thread(
        &self,
        forum_id: ChannelId,
        title: &str,
        initial_content: &str,
    ) -> RelayResult<ChannelRecord>;

    /// Delete a regular channel message.
    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId)
        -> RelayResult<()>;

    /// List the webhooks usable on a channel.
    async fn list_webhooks(&self, channel_id: ChannelId) -> RelayResult<Vec<WebhookIdentity>>;

    /// Create a webhook on a channel.
    async fn create_webhook(
        &self,
        channel_id: ChannelId,
        name: &str,
    ) -> RelayResult<WebhookIdentity>;

    /// Execute a webhook send, optionally targeting a thread of the
    /// webhook's channel. Returns the id of the created message.
    async fn execute_webhook(
        &self,
        identity: &WebhookIdentity,
        thread_id: Option<ChannelId>,
        payload: &WebhookPayload,
    ) -> RelayResult<MessageId>;

    /// Edit a message previously sent through the webhook.
    async fn edit_webhook_message(
        &self,
        identity: &WebhookIdentity,
        thread_id: Option<ChannelId>,
        message_id: MessageId,
        content: &str,
    ) -> RelayResult<()>;

    /// Delete a message previously sent through the webhook.
    async fn delete_webhook_message(
        &self,
        identity: &WebhookIdentity,
        thread_id: Option<ChannelId>,
        message_id: MessageId,
    ) -> RelayResult<()>;
}

/// Source of the channel/thread topology for the channel directory.
#[async_trait]
pub trait ChannelEnumerator: Send + Sync {
    async fn enumerate(&self) -> RelayResult<Vec<ChannelRecord>>;
}
