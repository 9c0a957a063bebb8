//! Ferryman - Discord chat relay for FFXIV
//!
//! Relays game chat to Discord through per-channel webhooks, with an
//! advertisement filter, per-correspondent forum threads for tells, and a
//! reverse path speaking Discord messages back into game chat.

mod common;
mod config;
mod discord;
mod game;
mod relay;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use serenity::model::id::{ChannelId, GuildId};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use common::types::ChatKind;
use config::store::JsonConfigStore;
use config::{env::get_config_path, load_and_validate};
use discord::{
    ChannelDirectory, DiscordBot, DiscordConnection, GameCommandHandler, RelayHandler,
    WebhookGateway,
};
use game::avatar::FallbackAvatarResolver;
use game::{CommandHandler, GameChannels};
use relay::pipeline::PipelineDeps;
use relay::{AdScorer, ConversationRouter, RelayPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Ferryman v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!(
            "Please ensure {} exists and is properly formatted.",
            config_path
        );
        e
    })?;

    info!("Configuration loaded successfully");
    info!("  Chat mappings: {}", config.mappings.chat_kinds.len());
    info!("  Label mappings: {}", config.mappings.labels.len());
    info!(
        "  Advertisement filter: {}",
        if config.relay.enable_ad_filter {
            "enabled"
        } else {
            "disabled"
        }
    );

    // ============================================================
    // Wire up the relay
    // ============================================================

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http = discord::build_http(&config.discord.token)?;
    let connection = Arc::new(DiscordConnection::new(http));
    let directory = Arc::new(ChannelDirectory::new());
    let gateway = Arc::new(WebhookGateway::new(
        connection.clone(),
        directory.clone(),
        config.relay.webhook_name.clone(),
    ));
    let store = Arc::new(JsonConfigStore::new(&config_path, config.clone()));

    let mut type_routes = HashMap::new();
    let mut kind_routes = HashMap::new();
    for (key, channel_id) in &config.mappings.chat_kinds {
        match ChatKind::parse(key) {
            Some(kind) => {
                type_routes.insert(kind, ChannelId::new(*channel_id));
                kind_routes.insert(ChannelId::new(*channel_id), kind);
            }
            None => warn!(key, "skipping unknown chat kind mapping"),
        }
    }
    let label_routes: HashMap<ChannelId, String> = config
        .mappings
        .labels
        .iter()
        .map(|(label, id)| (ChannelId::new(*id), label.clone()))
        .collect();
    let unfiltered: HashSet<ChannelId> = config
        .mappings
        .unfiltered
        .iter()
        .map(|id| ChannelId::new(*id))
        .collect();

    let router = Arc::new(ConversationRouter::new(
        type_routes,
        config.relay.default_channel.map(ChannelId::new),
        directory.clone(),
        connection.clone(),
        store.clone(),
    ));

    let channels = GameChannels::new();
    let GameChannels {
        chat_tx,
        mut chat_rx,
        sink,
        mut game_rx,
    } = channels;
    let sink = Arc::new(sink);

    let command_handler: Option<Arc<dyn CommandHandler>> =
        if config.relay.enable_commands && config.relay.command_prefix.is_some() {
            Some(Arc::new(GameCommandHandler::new(
                sink.clone(),
                config.relay.command_whitelist.clone(),
            )))
        } else {
            None
        };

    let pipeline = Arc::new(RelayPipeline::new(PipelineDeps {
        router,
        gateway: gateway.clone(),
        connection,
        store,
        game_sink: sink,
        avatar: Arc::new(FallbackAvatarResolver::new(
            config.relay.avatar_fallback_base.clone(),
        )),
        scorer: AdScorer::from_policy(&config.filter),
        command_handler,
        command_prefix: config.relay.command_prefix.clone(),
        enable_ad_filter: config.relay.enable_ad_filter,
        unfiltered,
        label_routes,
        kind_routes,
    }));

    // ============================================================
    // Start the Discord client and the pump tasks
    // ============================================================

    let handler = RelayHandler::new(
        pipeline.clone(),
        directory.clone(),
        config.discord.guild_id.map(GuildId::new),
    );

    info!("Starting Discord bot...");
    let bot = DiscordBot::build(
        config.discord.token.clone(),
        handler,
        directory,
        gateway,
        shutdown_rx.clone(),
    )
    .await?;
    let discord_task = tokio::spawn(async move {
        bot.run().await;
    });

    // Game -> Discord pump. `chat_tx` is the hook the embedding game chat
    // client feeds; it is held here so the channel stays open for the
    // process lifetime.
    let _game_chat_tx = chat_tx;
    let outbound_pump = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            while let Some(message) = chat_rx.recv().await {
                pipeline.handle_outbound(message).await;
            }
            info!("Game -> Discord pump ended");
        })
    };

    // Discord -> game pump. Without an attached game client the lines are
    // surfaced in the log; an embedding host drains this channel instead.
    let inbound_pump = tokio::spawn(async move {
        while let Some(line) = game_rx.recv().await {
            info!(target: "ferryman::game_chat", "{}", line);
        }
        info!("Discord -> game pump ended");
    });

    // ============================================================
    // Run until a shutdown signal or a task failure
    // ============================================================

    let shutdown = tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received - shutting down gracefully...");
            true
        }
        _ = discord_task => false,
        _ = outbound_pump => false,
        _ = inbound_pump => false,
    };

    if shutdown {
        if let Err(e) = shutdown_tx.send(true) {
            warn!("Shutdown channel closed: {}", e);
        }
        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
    }

    pipeline.metrics.log_summary();
    info!("Exiting...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
