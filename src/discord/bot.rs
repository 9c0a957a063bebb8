//! Discord client lifetime.
//!
//! Owns the serenity client, reconnects with jittered backoff when the
//! gateway drops, and shuts the shards down cleanly on the host's signal.
//! Cached topology and webhook identities are cleared on every disconnect
//! so a fresh session never reuses stale handles.

use std::sync::Arc;
use std::time::Duration;

use backon::BackoffBuilder;
use serenity::http::HttpBuilder;
use serenity::prelude::*;
use serenity::Client;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::discord::directory::ChannelDirectory;
use crate::discord::handler::RelayHandler;
use crate::discord::webhook::WebhookGateway;

/// REST client with explicit timeouts, shared by all relay HTTP calls.
pub fn build_http(token: &str) -> anyhow::Result<Arc<serenity::http::Http>> {
    let reqwest_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    Ok(Arc::new(HttpBuilder::new(token).client(reqwest_client).build()))
}

async fn build_client(token: &str, handler: RelayHandler) -> anyhow::Result<Client> {
    let intents =
        GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT | GatewayIntents::GUILDS;

    let reqwest_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    let http = HttpBuilder::new(token).client(reqwest_client).build();

    let client = serenity::client::ClientBuilder::new_with_http(http, intents)
        .event_handler(handler)
        .await?;
    Ok(client)
}

pub struct DiscordBot {
    token: String,
    client: Option<Client>,
    handler: RelayHandler,
    directory: Arc<ChannelDirectory>,
    gateway: Arc<WebhookGateway>,
    shutdown_rx: watch::Receiver<bool>,
}

impl DiscordBot {
    pub async fn build(
        token: String,
        handler: RelayHandler,
        directory: Arc<ChannelDirectory>,
        gateway: Arc<WebhookGateway>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> anyhow::Result<Self> {
        let client = build_client(&token, handler.clone()).await?;
        Ok(Self {
            token,
            client: Some(client),
            handler,
            directory,
            gateway,
            shutdown_rx,
        })
    }

    pub async fn run(mut self) {
        let shard_manager = self.client.as_ref().map(|c| c.shard_manager.clone());
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::select! {
            _ = Self::run_connection(
                &mut self.client,
                &self.token,
                &self.handler,
                &self.directory,
                &self.gateway,
            ) => {},
            _ = async {
                loop {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                if let Some(ref manager) = shard_manager {
                    info!("Initiating graceful Discord shutdown...");
                    manager.shutdown_all().await;
                    info!("Discord shutdown complete");
                }
            } => {}
        }
        info!("Discord task ended");
    }

    async fn run_connection(
        client: &mut Option<Client>,
        token: &str,
        handler: &RelayHandler,
        directory: &ChannelDirectory,
        gateway: &WebhookGateway,
    ) {
        /// 5s initial, 5min max, factor 1.1, with jitter, unlimited retries.
        fn gateway_backoff() -> impl Iterator<Item = Duration> {
            backon::ExponentialBuilder::default()
                .with_min_delay(Duration::from_secs(5))
                .with_max_delay(Duration::from_secs(300))
                .with_factor(1.1)
                .with_jitter()
                .without_max_times()
                .build()
        }

        let mut backoff = gateway_backoff();

        loop {
            info!("Connecting to Discord...");

            let mut active = match client.take() {
                Some(client) => client,
                None => match build_client(token, handler.clone()).await {
                    Ok(client) => {
                        backoff = gateway_backoff();
                        client
                    }
                    Err(e) => {
                        error!("Failed to rebuild Discord client: {}", e);
                        let delay = backoff.next().unwrap_or(Duration::from_secs(300));
                        warn!("Retrying in {:.1}s...", delay.as_secs_f64());
                        sleep(delay).await;
                        continue;
                    }
                },
            };

            // serenity mostly handles gateway reconnections itself; this
            // loop only covers hard client failures.
            match active.start().await {
                Ok(()) => {
                    info!("Discord client disconnected normally");
                    directory.unbind();
                    gateway.clear_cache().await;
                    break;
                }
                Err(e) => {
                    error!("Discord client error: {}", e);
                    directory.unbind();
                    gateway.clear_cache().await;
                    let delay = backoff.next().unwrap_or(Duration::from_secs(300));
                    warn!(
                        "Discord disconnected. Reconnecting in {:.1}s...",
                        delay.as_secs_f64(),
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
