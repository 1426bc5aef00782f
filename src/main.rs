// This is the entry point of the Discord bot.
//
// **Architecture Overview:**
// - `core/` = Moderation logic (platform-agnostic)
// - `infra/` = Implementations of core traits (SQLite, scanning APIs)
// - `discord/` = Discord-specific adapters (commands, events, platform port)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

mod config;

use crate::config::BotConfig;
use crate::core::moderation::{
    ChatPlatform, ModerationPipeline, PermissionGate, QuotaLedger, RestoreReaper,
    ScanOrchestrator, TakedownManager,
};
use crate::discord::moderation::{events, SerenityPlatform};
use crate::discord::{Data, Error};
use crate::infra::moderation::{
    connect_with_retry, AttachmentScannerClient, AzureModeratorClient, GcpVisionClient,
    RetryPolicy, SafeBrowsingClient, SqliteModerationStore,
};
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            events::handle_message(ctx, new_message, data).await?;
        }
        serenity::FullEvent::InteractionCreate {
            interaction: serenity::Interaction::Component(component),
        } => {
            events::handle_component(ctx, component, data).await?;
        }
        serenity::FullEvent::GuildCreate { guild, is_new } => {
            if *is_new == Some(true) {
                if let Err(e) = events::handle_guild_join(ctx, guild).await {
                    tracing::warn!(guild_id = guild.id.get(), "Failed to greet guild: {}", e);
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Build the scanning side, which needs no Discord handle.
fn build_orchestrator(
    config: &BotConfig,
    store: &SqliteModerationStore,
) -> anyhow::Result<ScanOrchestrator<SqliteModerationStore>> {
    let timeout = config.moderation.provider_timeout;
    let ledger = Arc::new(QuotaLedger::new(store.clone()));
    let mut orchestrator = ScanOrchestrator::new(ledger, config.moderation.clone());

    match &config.scanner_token {
        Some(token) => {
            orchestrator = orchestrator
                .with_file_scanner(Arc::new(AttachmentScannerClient::new(token.clone(), timeout)?));
        }
        None => tracing::warn!("SCANNER_TOKEN not set; files will not be malware-scanned"),
    }
    match &config.safe_browsing_key {
        Some(key) => {
            orchestrator = orchestrator
                .with_link_scanner(Arc::new(SafeBrowsingClient::new(key.clone(), timeout)?));
        }
        None => tracing::warn!("SAFE_BROWSING_KEY not set; links will not be reputation-checked"),
    }
    if let Some(key) = &config.gcp_vision_key {
        orchestrator =
            orchestrator.with_content_scanner(Arc::new(GcpVisionClient::new(key.clone(), timeout)?));
    }
    if let (Some(endpoint), Some(key)) = (&config.azure_endpoint, &config.azure_key) {
        orchestrator = orchestrator.with_content_scanner(Arc::new(AzureModeratorClient::new(
            endpoint,
            key.clone(),
            timeout,
        )?));
    }

    Ok(orchestrator)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (for local development)
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = BotConfig::from_env()?;

    let pool = connect_with_retry(&config.database_url, RetryPolicy::default()).await?;
    let store = SqliteModerationStore::new(pool);
    store.migrate().await?;

    let orchestrator = Arc::new(build_orchestrator(&config, &store)?);
    let store = Arc::new(store);

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::DIRECT_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read links in messages
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let token = config.discord_token.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                discord::commands::help::help(),
                discord::commands::quota::quota(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up...");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered");

                let moderation = &config.moderation;
                let platform: Arc<dyn ChatPlatform> = Arc::new(SerenityPlatform::new(
                    ctx.http.clone(),
                    ctx.cache.clone(),
                    config.support_url.clone(),
                ));
                let gate = Arc::new(PermissionGate::new(
                    Arc::clone(&platform),
                    moderation.platform_timeout,
                ));
                let takedown = Arc::new(TakedownManager::new(
                    Arc::clone(&store),
                    Arc::clone(&platform),
                    Arc::clone(&gate),
                    moderation.snapshot_lifetime,
                    moderation.platform_timeout,
                    config.support,
                )
                .with_media_limit(moderation.max_file_bytes));
                let reaper = Arc::new(RestoreReaper::new(
                    Arc::clone(&store),
                    Arc::clone(&platform),
                    Arc::clone(&gate),
                    moderation.platform_timeout,
                    config.support,
                ));
                let pipeline = Arc::new(ModerationPipeline::new(
                    orchestrator,
                    takedown,
                    gate,
                    platform,
                    moderation.platform_timeout,
                ));

                tokio::spawn(Arc::clone(&reaper).run_sweeper(moderation.sweep_interval));
                tracing::info!(
                    sweep_interval_secs = moderation.sweep_interval.as_secs(),
                    "Bot is ready"
                );

                Ok(Data { pipeline, reaper })
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    client.start().await?;
    Ok(())
}
