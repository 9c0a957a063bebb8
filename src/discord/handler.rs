//! Gateway event handler.
//!
//! Binds the channel directory to the gateway cache once the session is
//! ready, refreshes it on every topology change, and feeds guild messages
//! into the relay pipeline.

use std::sync::Arc;

use serenity::async_trait;
use serenity::model::channel::{GuildChannel, Message, PartialGuildChannel, Reaction};
use serenity::model::gateway::Ready;
use serenity::model::guild::Guild;
use serenity::model::id::GuildId;
use serenity::prelude::*;
use tracing::{debug, info};

use crate::common::types::InboundMessage;
use crate::discord::connection::CacheEnumerator;
use crate::discord::directory::ChannelDirectory;
use crate::relay::RelayPipeline;

#[derive(Clone)]
pub struct RelayHandler {
    pipeline: Arc<RelayPipeline>,
    directory: Arc<ChannelDirectory>,
    guild_id: Option<GuildId>,
}

impl RelayHandler {
    pub fn new(
        pipeline: Arc<RelayPipeline>,
        directory: Arc<ChannelDirectory>,
        guild_id: Option<GuildId>,
    ) -> Self {
        Self {
            pipeline,
            directory,
            guild_id,
        }
    }

    fn watches_guild(&self, guild_id: GuildId) -> bool {
        self.guild_id.map(|wanted| wanted == guild_id).unwrap_or(true)
    }
}

#[async_trait]
impl EventHandler for RelayHandler {
    async fn ready(&self, context: Context, ready: Ready) {
        info!("Discord bot connected as {}", ready.user.name);
        self.directory.bind(Arc::new(CacheEnumerator::new(
            context.cache.clone(),
            self.guild_id,
        )));
        self.directory.refresh().await;
    }

    async fn guild_create(&self, _context: Context, guild: Guild, _is_new: Option<bool>) {
        if self.watches_guild(guild.id) {
            debug!(guild_id = %guild.id, "guild data received");
            self.directory.refresh().await;
        }
    }

    async fn channel_create(&self, _context: Context, channel: GuildChannel) {
        if self.watches_guild(channel.guild_id) {
            self.directory.refresh().await;
        }
    }

    async fn channel_update(&self, _context: Context, _old: Option<GuildChannel>, new: GuildChannel) {
        if self.watches_guild(new.guild_id) {
            self.directory.refresh().await;
        }
    }

    async fn channel_delete(
        &self,
        _context: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        if self.watches_guild(channel.guild_id) {
            self.directory.refresh().await;
        }
    }

    async fn thread_create(&self, _context: Context, thread: GuildChannel) {
        if self.watches_guild(thread.guild_id) {
            self.directory.refresh().await;
        }
    }

    async fn thread_update(&self, _context: Context, _old: Option<GuildChannel>, new: GuildChannel) {
        if self.watches_guild(new.guild_id) {
            self.directory.refresh().await;
        }
    }

    async fn thread_delete(
        &self,
        _context: Context,
        thread: PartialGuildChannel,
        _full_thread_data: Option<GuildChannel>,
    ) {
        if self.watches_guild(thread.guild_id) {
            self.directory.refresh().await;
        }
    }

    async fn message(&self, context: Context, message: Message) {
        // Our own webhook sends come back as webhook messages; skipping all
        // bot and webhook authors also stops cross-bot loops.
        if message.author.bot || message.webhook_id.is_some() {
            return;
        }
        if message.author.id == context.cache.current_user().id {
            return;
        }
        let Some(guild_id) = message.guild_id else {
            return;
        };
        if !self.watches_guild(guild_id) {
            return;
        }

        let author = message
            .member
            .as_ref()
            .and_then(|member| member.nick.as_ref().map(|nick| nick.to_string()))
            .unwrap_or_else(|| message.author.name.to_string());

        let mut content = message.content.to_string();
        for attachment in &message.attachments {
            if !content.is_empty() {
                content.push(' ');
            }
            content.push_str(&attachment.url);
        }
        if content.is_empty() {
            return;
        }

        self.pipeline
            .handle_inbound(InboundMessage {
                id: message.id,
                channel_id: message.channel_id,
                author,
                content,
            })
            .await;
    }

    async fn reaction_add(&self, _context: Context, reaction: Reaction) {
        debug!(
            channel_id = %reaction.channel_id,
            message_id = %reaction.message_id,
            "reaction added"
        );
    }
}
