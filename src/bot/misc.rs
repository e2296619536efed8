use chrono::Utc;
use poise::CreateReply;
use rand::seq::SliceRandom;
use serenity::{
    all::{CreateAllowedMentions, Reaction, ReactionType},
    prelude::Context as SerenityContext,
};
use tracing::debug;

use crate::{
    apis::TwitchLookup,
    bot::{
        commands::{self, CommandHelp},
        reply_embed, Context,
    },
    error::{BotError, BotResult},
    ui::embeds::{
        command_help_embed, help_overview_embed, meme_embed, ping_embed, poll_embed, twitch_embed,
        youtube_embed, POLL_NO, POLL_TITLE_PREFIX, POLL_YES,
    },
};

/// Creates a yes or no poll
#[poise::command(prefix_command, slash_command, guild_only, category = "🎲 Misc")]
pub async fn poll(
    ctx: Context<'_>,
    #[description = "Question to ask"]
    #[rest]
    question: String,
) -> BotResult<()> {
    let reply = reply_embed(ctx, poll_embed(&ctx.author().name, &question)).await?;
    let message = reply.message().await?;

    for vote in [POLL_YES, POLL_NO] {
        message
            .react(ctx.http(), ReactionType::Unicode(vote.to_string()))
            .await?;
    }
    Ok(())
}

/// Picks one of the given choices
#[poise::command(prefix_command, slash_command, aliases("pick"), category = "🎲 Misc")]
pub async fn choose(
    ctx: Context<'_>,
    #[description = "Choices, separated by commas"]
    #[rest]
    choices: String,
) -> BotResult<()> {
    let choices = split_choices(&choices);

    if choices.len() < 2 {
        return Err(BotError::user("Please give me at least two choices."));
    }

    let picked = choices
        .choose(&mut rand::thread_rng())
        .ok_or_else(|| BotError::user("Please give me at least two choices."))?;

    ctx.reply(format!("🎲 I choose **{picked}**!")).await?;
    Ok(())
}

/// Sends a random meme
#[poise::command(prefix_command, slash_command, category = "🎲 Misc")]
pub async fn meme(ctx: Context<'_>) -> BotResult<()> {
    ctx.defer().await?;
    let meme = ctx.data().memes.random().await?;
    reply_embed(ctx, meme_embed(&meme)).await?;
    Ok(())
}

/// Shows a Twitch streamer's live broadcast
#[poise::command(prefix_command, slash_command, aliases("stream"), category = "🎲 Misc")]
pub async fn twitch(
    ctx: Context<'_>,
    #[description = "Streamer name"] name: String,
) -> BotResult<()> {
    let client = ctx
        .data()
        .twitch
        .as_ref()
        .ok_or_else(|| BotError::user("Twitch lookups are not configured on this bot."))?;

    ctx.defer().await?;
    match client.lookup(&name).await? {
        TwitchLookup::Live(stream) => {
            reply_embed(ctx, twitch_embed(&stream, Utc::now())).await?;
        }
        TwitchLookup::Offline { display_name } => {
            ctx.reply(format!("📴 **{display_name}** is not streaming right now."))
                .await?;
        }
        TwitchLookup::NotFound => {
            return Err(BotError::user(format!(
                "I couldn't find a Twitch streamer called **{name}**."
            )));
        }
    }
    Ok(())
}

/// Searches YouTube and posts the first result
#[poise::command(prefix_command, slash_command, aliases("yt"), category = "🎲 Misc")]
pub async fn youtube(
    ctx: Context<'_>,
    #[description = "What to search for"]
    #[rest]
    query: String,
) -> BotResult<()> {
    ctx.defer().await?;
    let video = ctx.data().resolver.lookup(&query).await?;

    reply_embed(ctx, youtube_embed(&video)).await?;
    Ok(())
}

/// Shows your current latency
#[poise::command(prefix_command, slash_command, category = "🎲 Misc")]
pub async fn ping(ctx: Context<'_>) -> BotResult<()> {
    let latency = ctx.ping().await;
    reply_embed(ctx, ping_embed(latency)).await?;
    Ok(())
}

/// Repeats what you say
///
/// The invoking message is deleted and nobody is pinged by the copy.
#[poise::command(prefix_command, slash_command, category = "🎲 Misc")]
pub async fn echo(
    ctx: Context<'_>,
    #[description = "What to say"]
    #[rest]
    message: String,
) -> BotResult<()> {
    if message.trim().is_empty() {
        return Err(BotError::user("You need to tell me what to say."));
    }

    if let poise::Context::Prefix(prefix) = ctx {
        if let Err(e) = prefix.msg.delete(ctx.http()).await {
            debug!("Echoed message {} not deleted: {}", prefix.msg.id, e);
        }
    }

    ctx.send(
        CreateReply::default()
            .content(message)
            .allowed_mentions(CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

/// Beep boop, the bot becomes the boop to your beep
#[poise::command(prefix_command, slash_command, category = "🎲 Misc")]
pub async fn beep(ctx: Context<'_>) -> BotResult<()> {
    ctx.say("boop").await?;
    Ok(())
}

/// Lists commands or explains one
#[poise::command(prefix_command, slash_command, aliases("h", "commands"), category = "🎲 Misc")]
pub async fn help(
    ctx: Context<'_>,
    #[description = "Command to explain"] command: Option<String>,
) -> BotResult<()> {
    let prefix = &ctx.data().config.command_prefix;
    let all = &ctx.framework().options().commands;

    let embed = match command {
        Some(name) => {
            let name = name.trim_start_matches(prefix.as_str()).trim_start_matches('/');
            let found = commands::find(all, name)
                .ok_or_else(|| BotError::user(format!("There is no command called `{name}`.")))?;
            command_help_embed(&CommandHelp::of(found), prefix)
        }
        None => help_overview_embed(&commands::help_entries(all), prefix),
    };

    reply_embed(ctx, embed).await?;
    Ok(())
}

/// Keeps one vote per member on bot polls by removing their other reaction.
pub async fn enforce_single_vote(ctx: &SerenityContext, reaction: &Reaction) -> BotResult<()> {
    let ReactionType::Unicode(emoji) = &reaction.emoji else {
        return Ok(());
    };
    let Some(other) = other_vote(emoji) else {
        return Ok(());
    };
    let Some(user_id) = reaction.user_id else {
        return Ok(());
    };

    let bot_id = ctx.cache.current_user().id;
    if user_id == bot_id {
        return Ok(());
    }

    let message = reaction.message(&ctx.http).await?;
    if message.author.id != bot_id
        || !is_poll_title(message.embeds.first().and_then(|embed| embed.title.as_deref()))
    {
        return Ok(());
    }

    let others_voted = message.reactions.iter().any(|existing| {
        matches!(&existing.reaction_type, ReactionType::Unicode(e) if e == other)
            && existing.count > 1
    });
    if !others_voted {
        return Ok(());
    }

    debug!("Removing {}'s previous vote on poll {}", user_id, message.id);
    reaction
        .channel_id
        .delete_reaction(
            &ctx.http,
            reaction.message_id,
            Some(user_id),
            ReactionType::Unicode(other.to_string()),
        )
        .await?;
    Ok(())
}

/// The opposite answer of a poll vote.
fn other_vote(emoji: &str) -> Option<&'static str> {
    match emoji {
        POLL_YES => Some(POLL_NO),
        POLL_NO => Some(POLL_YES),
        _ => None,
    }
}

fn is_poll_title(title: Option<&str>) -> bool {
    title.is_some_and(|title| title.starts_with(POLL_TITLE_PREFIX))
}

/// Commas separate choices when present, otherwise whitespace does.
fn split_choices(input: &str) -> Vec<&str> {
    if !input.contains(',') {
        return input.split_whitespace().collect();
    }

    input
        .split(',')
        .map(str::trim)
        .filter(|choice| !choice.is_empty())
        .collect()
}
