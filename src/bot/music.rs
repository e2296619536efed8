//! Music commands. Playback itself lives in [`crate::audio`]; these handlers
//! resolve the guild's player, check the caller's voice state and answer.

use anyhow::anyhow;
use serenity::{
    all::{ChannelType, GuildChannel},
    model::id::{ChannelId, GuildId, UserId},
    prelude::Context as SerenityContext,
};
use songbird::Songbird;
use std::sync::Arc;
use tracing::info;

use crate::{
    audio::{voice, GuildPlayer, MusicError, PlayerOutputs, SongbirdSink, Transition, VoiceError},
    bot::{notifier::ChannelNotifier, reply_embed, Context},
    error::{BotError, BotResult},
    sources::{regather, DeferredTrack, Requester, TrackRequest},
    ui::embeds::{now_playing_embed, queue_embed, success_embed, track_queued_embed},
};

/// Plays a song from a search term or URL
#[poise::command(prefix_command, slash_command, guild_only, aliases("p"), category = "🎵 Music")]
pub async fn play(
    ctx: Context<'_>,
    #[description = "Song name or URL"]
    #[rest]
    query: String,
) -> BotResult<()> {
    let guild_id = guild(ctx)?;
    let author = ctx.author();
    let manager = songbird_manager(ctx.serenity_context()).await?;

    let channel = voice_channel_of(ctx.serenity_context(), guild_id, author.id)
        .ok_or_else(|| BotError::user("You need to be in a voice channel to play music."))?;

    ctx.defer().await?;

    if !voice::is_connected(&manager, guild_id).await {
        voice::join(&manager, guild_id, channel).await?;
    }

    let bot = ctx.data();
    let metadata = bot.resolver.lookup(&query).await?;
    let deferred = DeferredTrack::new(
        metadata,
        Requester {
            id: author.id,
            name: author.name.clone(),
        },
    );

    // An idle player starts right away, so resolve the stream now; queued
    // tracks are resolved when they reach the head of the queue.
    let idle = bot
        .players
        .get(guild_id)
        .map_or(true, |player| !player.is_playing() && player.queue_len() == 0);

    let request = if idle {
        TrackRequest::Resolved(regather(bot.resolver.as_ref(), &deferred).await?)
    } else {
        TrackRequest::Deferred(deferred)
    };

    let outputs = || PlayerOutputs {
        voice: Arc::new(SongbirdSink::new(
            Arc::clone(&manager),
            guild_id,
            channel,
            bot.http_client.clone(),
        )),
        notifier: Arc::new(ChannelNotifier::new(
            Arc::clone(&ctx.serenity_context().http),
            ctx.channel_id(),
        )),
    };

    let (_, position) = bot.players.enqueue(guild_id, request.clone(), outputs)?;

    info!(
        "🎵 Queued '{}' at position {} in guild {}",
        request.title(),
        position,
        guild_id
    );

    reply_embed(ctx, track_queued_embed(&request, position)).await?;
    Ok(())
}

/// Pauses the current song
#[poise::command(prefix_command, slash_command, guild_only, category = "🎵 Music")]
pub async fn pause(ctx: Context<'_>) -> BotResult<()> {
    let player = active_player(ctx).await?;

    let text = match player.pause().await? {
        Transition::Changed => "⏸️ Paused the song.",
        Transition::Unchanged => "⏸️ The song is already paused.",
    };
    ctx.reply(text).await?;
    Ok(())
}

/// Resumes the paused song
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("unpause"),
    category = "🎵 Music"
)]
pub async fn resume(ctx: Context<'_>) -> BotResult<()> {
    let player = active_player(ctx).await?;

    let text = match player.resume().await? {
        Transition::Changed => "▶️ Resumed the song.",
        Transition::Unchanged => "▶️ The song is already playing.",
    };
    ctx.reply(text).await?;
    Ok(())
}

/// Skips the current song
#[poise::command(prefix_command, slash_command, guild_only, aliases("next"), category = "🎵 Music")]
pub async fn skip(ctx: Context<'_>) -> BotResult<()> {
    let player = active_player(ctx).await?;
    let skipped = player.skip().await?;

    ctx.reply(format!("⏭️ Skipped **{}**.", skipped.title)).await?;
    Ok(())
}

/// Shows the next songs in the queue
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("q", "playlist"),
    category = "🎵 Music"
)]
pub async fn queue(ctx: Context<'_>) -> BotResult<()> {
    let player = active_player(ctx).await?;
    let upcoming = player.upcoming()?;

    let embed = queue_embed(player.current().as_ref(), &upcoming, player.queue_len());
    reply_embed(ctx, embed).await?;
    Ok(())
}

/// Shows the song that is playing
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    rename = "nowplaying",
    aliases("np", "current"),
    category = "🎵 Music"
)]
pub async fn now_playing(ctx: Context<'_>) -> BotResult<()> {
    let player = active_player(ctx).await?;
    let track = player.now_playing().await?;

    let reply = reply_embed(ctx, now_playing_embed(&track)).await?;
    let message = reply.message().await?;
    player.replace_now_playing(message.id).await;
    Ok(())
}

/// Changes the player volume
#[poise::command(prefix_command, slash_command, guild_only, aliases("vol"), category = "🎵 Music")]
pub async fn volume(
    ctx: Context<'_>,
    #[description = "Volume between 1 and 100"] level: f32,
) -> BotResult<()> {
    let player = active_player(ctx).await?;

    player.set_volume(level).await?;

    ctx.reply(format!("🔊 Set the volume to **{}%**.", player.volume_percent()))
        .await?;
    Ok(())
}

/// Stops the music, clears the queue and leaves the channel
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("leave", "disconnect"),
    category = "🎵 Music"
)]
pub async fn stop(ctx: Context<'_>) -> BotResult<()> {
    let guild_id = guild(ctx)?;

    if !ctx.data().players.stop(guild_id).await {
        let manager = songbird_manager(ctx.serenity_context()).await?;
        if manager.get(guild_id).is_none() {
            return Err(MusicError::NotConnected.into());
        }
        manager
            .remove(guild_id)
            .await
            .map_err(|e| VoiceError::Control(e.to_string()))?;
    }

    info!("⏹️ Music stopped in guild {}", guild_id);
    reply_embed(
        ctx,
        success_embed("Stopped", "Cleared the queue and left the voice channel."),
    )
    .await?;
    Ok(())
}

/// Joins your voice channel or the one given
#[poise::command(prefix_command, slash_command, guild_only, aliases("join"), category = "🎵 Music")]
pub async fn connect(
    ctx: Context<'_>,
    #[description = "Voice channel to join"]
    #[channel_types("Voice", "Stage")]
    channel: Option<GuildChannel>,
) -> BotResult<()> {
    let guild_id = guild(ctx)?;
    let manager = songbird_manager(ctx.serenity_context()).await?;

    let channel = match channel {
        Some(channel) if is_voice_channel(&channel) => channel.id,
        Some(channel) => {
            return Err(BotError::user(format!("<#{}> is not a voice channel.", channel.id)));
        }
        None => voice_channel_of(ctx.serenity_context(), guild_id, ctx.author().id).ok_or_else(
            || BotError::user("No channel to join. Please either specify a valid channel or join one."),
        )?,
    };

    voice::join(&manager, guild_id, channel).await?;
    ctx.reply(format!("🔊 Connected to <#{channel}>.")).await?;
    Ok(())
}

fn guild(ctx: Context<'_>) -> BotResult<GuildId> {
    ctx.guild_id().ok_or(BotError::NoPrivateMessage)
}

/// The guild's running player, or why there is none.
async fn active_player(ctx: Context<'_>) -> BotResult<Arc<GuildPlayer>> {
    let guild_id = guild(ctx)?;

    if let Some(player) = ctx.data().players.get(guild_id) {
        return Ok(player);
    }

    let manager = songbird_manager(ctx.serenity_context()).await?;
    if voice::is_connected(&manager, guild_id).await {
        Err(MusicError::NothingPlaying.into())
    } else {
        Err(MusicError::NotConnected.into())
    }
}

async fn songbird_manager(ctx: &SerenityContext) -> BotResult<Arc<Songbird>> {
    songbird::get(ctx)
        .await
        .ok_or_else(|| BotError::Unexpected(anyhow!("songbird voice client is not registered")))
}

fn voice_channel_of(ctx: &SerenityContext, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild.voice_states.get(&user_id).and_then(|state| state.channel_id)
}

fn is_voice_channel(channel: &GuildChannel) -> bool {
    matches!(channel.kind, ChannelType::Voice | ChannelType::Stage)
}
