use poise::{CreateReply, FrameworkError};
use tracing::{debug, error, info, warn};

use crate::{
    bot::{commands, BbBot, Context},
    error::{BotError, ErrorKind},
};

/// Runs before every command.
pub async fn log_invocation(ctx: Context<'_>) {
    info!(
        "📝 Command {}{} used by {} in {}",
        ctx.prefix(),
        ctx.command().name,
        ctx.author().name,
        ctx.guild_id()
            .map_or("a private channel".to_string(), |id| format!("guild {id}"))
    );
}

/// Turns every framework failure into a [`BotError`] and reports it.
pub async fn on_error(error: FrameworkError<'_, BbBot, BotError>) {
    let (ctx, err) = match error {
        FrameworkError::Command { error, ctx, .. } => (ctx, error),
        FrameworkError::ArgumentParse {
            error, input, ctx, ..
        } => {
            debug!(
                "Arguments {:?} of {} rejected: {}",
                input,
                ctx.command().name,
                error
            );
            let usage = format!("{}{}", ctx.prefix(), commands::usage(ctx.command()));
            (ctx, BotError::BadArguments(usage))
        }
        FrameworkError::CooldownHit {
            remaining_cooldown,
            ctx,
            ..
        } => (ctx, BotError::Cooldown(remaining_cooldown)),
        FrameworkError::MissingUserPermissions {
            missing_permissions,
            ctx,
            ..
        } => {
            let missing = missing_permissions.unwrap_or(ctx.command().required_permissions);
            let names = missing.get_permission_names().join(", ");
            (ctx, BotError::MissingPermissions(names))
        }
        FrameworkError::GuildOnly { ctx, .. } => (ctx, BotError::NoPrivateMessage),
        FrameworkError::EventHandler { error, .. } => {
            error!("❌ Event handler failed: {:?}", error);
            return;
        }
        FrameworkError::Setup { error, .. } => {
            error!("❌ Startup failed: {:?}", error);
            return;
        }
        FrameworkError::UnknownCommand { .. } => return,
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("❌ Error while handling an error: {}", e);
            }
            return;
        }
    };

    report(ctx, err).await;
}

async fn report(ctx: Context<'_>, err: BotError) {
    let name = &ctx.command().name;

    match err.kind() {
        ErrorKind::UserInput => debug!("Command {} rejected: {}", name, err),
        ErrorKind::External | ErrorKind::Permission => warn!("⚠️ Command {} failed: {}", name, err),
        ErrorKind::Unexpected => error!("❌ Command {} failed: {:?}", name, err),
    }

    let reply = CreateReply::default()
        .content(err.user_message())
        .ephemeral(true)
        .reply(true);
    if let Err(e) = ctx.send(reply).await {
        debug!("Error reply for {} not delivered: {}", name, e);
    }
}
