//! # Bot Module
//!
//! Discord-facing side of BB.Bot.
//!
//! ## Architecture
//!
//! Commands run on the `poise` framework. [`BbBot`] is the framework's user
//! data and owns every piece of shared state: the guild stores, the player
//! registry and the API clients. Nothing lives in globals; commands reach the
//! bot through [`Context::data`].
//!
//! - [`commands`] - the command list, help lookups and usage lines
//! - [`handlers`] - invocation logging and error reporting
//! - [`music`], [`moderation`], [`roles`], [`misc`] - command implementations
//! - [`events`] - blacklist filter, reaction roles, buttons and greetings
//! - [`tasks`] - reaction-role reconciliation and presence rotation

use poise::{builtins, Command, CreateReply, ReplyHandle};
use serenity::{all::CreateEmbed, model::id::GuildId, prelude::Context as SerenityContext};
use std::sync::Arc;
use tracing::{error, info};

pub mod commands;
pub mod events;
pub mod handlers;
pub mod misc;
pub mod moderation;
pub mod music;
pub mod notifier;
pub mod roles;
pub mod tasks;

use crate::{
    apis::{MemeClient, TwitchClient},
    audio::{PlayerRegistry, PlayerSettings},
    config::Config,
    error::{BotError, BotResult},
    guild::{BlacklistStore, ReactionRoleStore},
    sources::MediaResolver,
};

pub type Context<'a> = poise::Context<'a, BbBot, BotError>;

/// Shared state of every command and event handler.
pub struct BbBot {
    pub config: Arc<Config>,
    pub blacklist: Arc<BlacklistStore>,
    pub reaction_roles: Arc<ReactionRoleStore>,
    pub players: Arc<PlayerRegistry>,
    pub resolver: Arc<dyn MediaResolver>,
    /// Shared HTTP client for songbird inputs and third-party APIs.
    pub http_client: reqwest::Client,
    pub memes: MemeClient,
    /// Present only when Twitch credentials are configured.
    pub twitch: Option<TwitchClient>,
}

impl BbBot {
    pub fn new(
        config: Config,
        blacklist: BlacklistStore,
        reaction_roles: ReactionRoleStore,
        resolver: Arc<dyn MediaResolver>,
        http_client: reqwest::Client,
    ) -> Self {
        let settings = PlayerSettings {
            idle_timeout: config.idle_timeout(),
            default_volume: config.default_volume,
        };

        let twitch = match (&config.twitch_client_id, &config.twitch_client_secret) {
            (Some(id), Some(secret)) => Some(TwitchClient::new(http_client.clone(), id, secret)),
            _ => None,
        };

        Self {
            players: Arc::new(PlayerRegistry::new(Arc::clone(&resolver), settings)),
            memes: MemeClient::new(http_client.clone(), config.meme_api_url.clone()),
            twitch,
            config: Arc::new(config),
            blacklist: Arc::new(blacklist),
            reaction_roles: Arc::new(reaction_roles),
            resolver,
            http_client,
        }
    }

    /// Registers slash commands in the development guild, or globally.
    async fn register_commands(
        &self,
        ctx: &SerenityContext,
        commands: &[Command<BbBot, BotError>],
    ) -> serenity::Result<()> {
        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                builtins::register_in_guild(ctx, commands, guild_id).await?;
                info!("🏠 Registered {} slash commands in guild {}", commands.len(), guild_id);
            }
            None => {
                builtins::register_globally(ctx, commands).await?;
                info!("🌐 Registered {} global slash commands", commands.len());
            }
        }
        Ok(())
    }

    fn start_tasks(&self, ctx: &SerenityContext) {
        tasks::spawn_reconciler(
            ctx.clone(),
            Arc::clone(&self.reaction_roles),
            self.config.reconcile_interval(),
        );
        tasks::spawn_presence_rotation(
            ctx.clone(),
            self.config.command_prefix.clone(),
            self.config.presence_interval(),
        );

        info!("⏱️ Background tasks started");
    }
}

/// Builds the command framework around `bot`.
///
/// Setup runs on the first `ready` only, so commands are registered and
/// background tasks started once per process.
pub fn framework(bot: BbBot) -> poise::Framework<BbBot, BotError> {
    let prefix = bot.config.command_prefix.clone();

    poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(prefix),
                case_insensitive_commands: true,
                ..Default::default()
            },
            pre_command: |ctx| Box::pin(handlers::log_invocation(ctx)),
            on_error: |error| Box::pin(handlers::on_error(error)),
            event_handler: |ctx, event, framework, bot| {
                Box::pin(events::handle(ctx, event, framework, bot))
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("🤖 {} is online!", ready.user.name);
                info!("📊 Connected to {} guilds", ready.guilds.len());

                if let Err(e) = bot
                    .register_commands(ctx, &framework.options().commands)
                    .await
                {
                    error!("❌ Could not register slash commands: {:?}", e);
                }

                bot.start_tasks(ctx);
                Ok(bot)
            })
        })
        .build()
}

/// Answers with an embed, quoting the invoking message of prefix commands.
pub async fn reply_embed(ctx: Context<'_>, embed: CreateEmbed) -> BotResult<ReplyHandle<'_>> {
    Ok(ctx.send(CreateReply::default().embed(embed).reply(true)).await?)
}
