use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info, warn};

mod apis;
mod audio;
mod bot;
mod config;
mod error;
mod guild;
mod sources;
mod storage;
mod ui;

use crate::bot::BbBot;
use crate::config::Config;
use crate::guild::{BlacklistDocument, BlacklistStore, ReactionRoleDocument, ReactionRoleStore};
use crate::sources::YtDlpResolver;
use crate::storage::JsonCollection;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bb_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🤖 Starting BB.Bot v{}", env!("CARGO_PKG_VERSION"));

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    let config = Config::load()?;
    info!("⚙️ {}", config.summary());

    let resolver = YtDlpResolver::new();
    match resolver.verify().await {
        Ok(version) => info!("🎬 yt-dlp {} available", version),
        Err(e) => warn!("⚠️ yt-dlp is not usable, music commands will fail: {}", e),
    }

    let blacklist_collection =
        JsonCollection::<BlacklistDocument>::open(config.data_dir.join("blacklist.json")).await?;
    let blacklist = BlacklistStore::load(Arc::new(blacklist_collection)).await?;

    let reaction_role_collection =
        JsonCollection::<ReactionRoleDocument>::open(config.data_dir.join("reactionroles.json"))
            .await?;
    let reaction_roles = ReactionRoleStore::load(Arc::new(reaction_role_collection)).await?;

    let http_client = reqwest::Client::builder()
        .user_agent(concat!("bb-bot/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::MESSAGE_CONTENT;

    let token = config.discord_token.clone();
    let data = BbBot::new(
        config,
        blacklist,
        reaction_roles,
        Arc::new(resolver),
        http_client,
    );

    let mut client = Client::builder(&token, intents)
        .framework(bot::framework(data))
        .register_songbird()
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("❌ Could not listen for Ctrl+C: {}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, closing shards...");
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Connecting to Discord");
    if let Err(why) = client.start().await {
        error!("❌ Client stopped with an error: {:?}", why);
    }

    info!("👋 BB.Bot stopped");
    Ok(())
}

/// Exits successfully when the audio tooling is installed.
async fn health_check() -> Result<()> {
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Missing dependencies: yt-dlp and ffmpeg are required");
    }
}
