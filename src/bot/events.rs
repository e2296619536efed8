//! Gateway event handling that is not a command: the blacklist filter,
//! reaction roles, poll votes, confirmation buttons and greetings.

use poise::FrameworkContext;
use serenity::{
    all::{
        ComponentInteraction, CreateEmbed, CreateInteractionResponse,
        CreateInteractionResponseMessage, CreateMessage, EditInteractionResponse, FullEvent,
        Interaction, Message, Reaction, VoiceState,
    },
    model::id::{GuildId, MessageId},
    prelude::Context as SerenityContext,
};
use tracing::{debug, error, info, warn};

use crate::{
    audio::voice,
    bot::{commands, misc, moderation, roles, BbBot},
    error::{BotError, BotResult, ErrorKind},
    ui::{
        buttons::parse_button,
        embeds::{goodbye_embed, welcome_embed},
    },
};

pub async fn handle(
    ctx: &SerenityContext,
    event: &FullEvent,
    framework: FrameworkContext<'_, BbBot, BotError>,
    bot: &BbBot,
) -> BotResult<()> {
    match event {
        FullEvent::Message { new_message } => on_message(ctx, bot, framework, new_message).await,
        FullEvent::ReactionAdd { add_reaction } => on_reaction(ctx, bot, add_reaction, true).await,
        FullEvent::ReactionRemove { removed_reaction } => {
            on_reaction(ctx, bot, removed_reaction, false).await
        }
        FullEvent::MessageDelete {
            deleted_message_id,
            guild_id,
            ..
        } => on_message_delete(bot, *guild_id, *deleted_message_id).await,
        FullEvent::GuildMemberAddition { new_member } => {
            let guild_name = ctx
                .cache
                .guild(new_member.guild_id)
                .map(|guild| guild.name.clone())
                .unwrap_or_else(|| "the server".to_string());

            let embed = welcome_embed(&format!("<@{}>", new_member.user.id), &guild_name);
            greet(ctx, new_member.guild_id, embed).await;
        }
        FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
            greet(ctx, *guild_id, goodbye_embed(&user.name)).await;
        }
        FullEvent::InteractionCreate {
            interaction: Interaction::Component(component),
        } => on_component(ctx, bot, component).await,
        FullEvent::VoiceStateUpdate { new, .. } => on_voice_state(ctx, bot, new).await,
        _ => {}
    }

    Ok(())
}

pub async fn on_message(
    ctx: &SerenityContext,
    bot: &BbBot,
    framework: FrameworkContext<'_, BbBot, BotError>,
    message: &Message,
) {
    if message.author.bot {
        return;
    }

    // Commands are never filtered, so the blacklist stays manageable.
    let prefix = &bot.config.command_prefix;
    if commands::command_word(&message.content, prefix)
        .and_then(|word| commands::find(&framework.options().commands, word))
        .is_some()
    {
        return;
    }

    let Some(guild_id) = message.guild_id else {
        return;
    };

    if bot.blacklist.is_blocked(guild_id, &message.content) {
        match message.delete(&ctx.http).await {
            Ok(()) => info!(
                "⛔ Deleted blacklisted message from {} in guild {}",
                message.author.name, guild_id
            ),
            Err(e) => warn!("⚠️ Could not delete blacklisted message {}: {}", message.id, e),
        }
    }
}

pub async fn on_reaction(ctx: &SerenityContext, bot: &BbBot, reaction: &Reaction, added: bool) {
    if let Err(e) = roles::sync_reaction(ctx, bot, reaction, added).await {
        warn!(
            "⚠️ Reaction role on message {} failed: {}",
            reaction.message_id, e
        );
    }

    if added {
        if let Err(e) = misc::enforce_single_vote(ctx, reaction).await {
            debug!("Poll vote on message {} not enforced: {}", reaction.message_id, e);
        }
    }
}

pub async fn on_message_delete(bot: &BbBot, guild_id: Option<GuildId>, message_id: MessageId) {
    let Some(guild_id) = guild_id else {
        return;
    };

    if let Err(e) = bot.reaction_roles.remove_message(guild_id, message_id).await {
        warn!(
            "⚠️ Could not drop reaction roles of deleted message {}: {}",
            message_id, e
        );
    }
}

/// Posts a greeting in the guild's system channel, if it has one.
pub async fn greet(ctx: &SerenityContext, guild_id: GuildId, embed: CreateEmbed) {
    let channel = ctx
        .cache
        .guild(guild_id)
        .and_then(|guild| guild.system_channel_id);

    let Some(channel) = channel else {
        debug!("Guild {} has no system channel, skipping greeting", guild_id);
        return;
    };

    if let Err(e) = channel
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await
    {
        warn!("⚠️ Could not greet in guild {}: {}", guild_id, e);
    }
}

/// Answers a confirmation button. Only the member who ran the command may press it.
pub async fn on_component(ctx: &SerenityContext, bot: &BbBot, component: &ComponentInteraction) {
    let Some(press) = parse_button(&component.data.custom_id) else {
        debug!("Ignoring unknown component {}", component.data.custom_id);
        return;
    };

    if component.user.id != press.owner {
        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content("❌ Only the member who ran the command can answer this.")
                .ephemeral(true),
        );
        if let Err(e) = component.create_response(&ctx.http, response).await {
            debug!("Button rejection not delivered: {}", e);
        }
        return;
    }

    if !press.confirmed {
        let response = CreateInteractionResponse::UpdateMessage(
            CreateInteractionResponseMessage::new()
                .content("❌ Cancelled.")
                .embeds(Vec::new())
                .components(Vec::new()),
        );
        if let Err(e) = component.create_response(&ctx.http, response).await {
            debug!("Cancel confirmation not delivered: {}", e);
        }
        return;
    }

    if let Err(e) = component.defer(&ctx.http).await {
        warn!("⚠️ Could not acknowledge button {}: {}", component.data.custom_id, e);
        return;
    }

    let text = match moderation::confirm(ctx, bot, component, press).await {
        Ok(text) => text,
        Err(e) => {
            if e.kind() == ErrorKind::Unexpected {
                error!("❌ Confirmed action {:?} failed: {:?}", press.action, e);
            } else {
                warn!("⚠️ Confirmed action {:?} failed: {}", press.action, e);
            }
            e.user_message()
        }
    };

    let edit = EditInteractionResponse::new()
        .content(text)
        .embeds(Vec::new())
        .components(Vec::new());
    if let Err(e) = component.edit_response(&ctx.http, edit).await {
        debug!("Confirmation result not delivered: {}", e);
    }
}

/// Stops the guild's player when the bot is disconnected from voice.
///
/// Leaving is also how a player tears itself down, and that update can
/// arrive after a new player already rejoined. Such stale updates are
/// ignored: songbird is connected again, or the player is not playing.
pub async fn on_voice_state(ctx: &SerenityContext, bot: &BbBot, new: &VoiceState) {
    if new.user_id != ctx.cache.current_user().id || new.channel_id.is_some() {
        return;
    }

    let Some(guild_id) = new.guild_id else {
        return;
    };

    if let Some(manager) = songbird::get(ctx).await {
        if voice::is_connected(&manager, guild_id).await {
            debug!("Ignoring stale voice disconnect in guild {}", guild_id);
            return;
        }
    }

    if bot.players.stop_playing(guild_id).await {
        info!("🔌 Disconnected from voice in guild {}, player stopped", guild_id);
    }
}
