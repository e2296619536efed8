use chrono::{DateTime, Utc};
use num_format::{Locale, ToFormattedString};
use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    apis::{Broadcast, Meme},
    bot::commands::{CommandHelp, CATEGORIES},
    sources::{PlayableTrack, TrackMetadata, TrackRequest},
};

/// Standard colour palette.
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
    pub const TWITCH_PURPLE: Colour = Colour::from_rgb(145, 70, 255);
}

const STANDARD_FOOTER: &str = "🤖 BB.Bot";

pub const POLL_TITLE_PREFIX: &str = "📢 Poll by";
pub const POLL_YES: &str = "✅";
pub const POLL_NO: &str = "❌";

pub fn now_playing_embed(track: &PlayableTrack) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Now Playing")
        .description(format!("**[{}]({})**", track.title, track.webpage_url))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duration", duration_label(track.duration), true)
        .field("👤 Requested by", format!("<@{}>", track.requester.id), true);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn track_queued_embed(track: &TrackRequest, position: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("➕ Added to Queue")
        .description(format!("**[{}]({})**", track.title(), track.webpage_url()))
        .color(colors::MUSIC_PURPLE)
        .field("⏱️ Duration", duration_label(track.duration()), true)
        .field("📍 Position", format!("#{position}"), true)
        .field("👤 Requested by", format!("<@{}>", track.requester().id), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn queue_embed(
    current: Option<&PlayableTrack>,
    upcoming: &[TrackRequest],
    total: usize,
) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Queue")
        .color(colors::INFO_BLUE);

    if let Some(current) = current {
        embed = embed.field(
            "▶️ Playing",
            format!("**{}** `[{}]`", current.title, duration_label(current.duration)),
            false,
        );
    }

    let mut lines = String::new();
    for (i, item) in upcoming.iter().enumerate() {
        lines.push_str(&format!(
            "**{}**. {} `[{}]`\n",
            i + 1,
            item.title(),
            duration_label(item.duration())
        ));
    }

    if total > upcoming.len() {
        lines.push_str(&format!("*...and {} more*", total - upcoming.len()));
    }

    embed
        .field(format!("Up next ({total})"), lines, false)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

pub fn error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn warning_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("⚠️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn help_overview_embed(commands: &[CommandHelp], prefix: &str) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📖 BB.Bot Commands")
        .description(format!(
            "Use `{prefix}help <command>` for details. Every command also works as a slash command."
        ))
        .color(colors::INFO_BLUE);

    for category in CATEGORIES {
        let names: Vec<String> = commands
            .iter()
            .filter(|command| command.category == category)
            .map(|command| format!("`{}`", command.name))
            .collect();
        if !names.is_empty() {
            embed = embed.field(category, names.join(" "), false);
        }
    }

    embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn command_help_embed(command: &CommandHelp, prefix: &str) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(format!("📖 {}", command.name))
        .description(&command.description)
        .color(colors::INFO_BLUE)
        .field("Usage", format!("`{prefix}{}`", command.usage), false);

    if !command.aliases.is_empty() {
        let aliases: Vec<String> = command.aliases.iter().map(|a| format!("`{a}`")).collect();
        embed = embed.field("Aliases", aliases.join(", "), true);
    }

    if !command.permissions.is_empty() {
        embed = embed.field("Permissions", command.permissions.join(", "), true);
    }

    embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn ping_embed(latency: Duration) -> CreateEmbed {
    CreateEmbed::default()
        .title("🏓 Pong!")
        .description(format!(
            "⌛ Your ping is **{}**ms.",
            latency.as_millis().to_formatted_string(&Locale::en)
        ))
        .color(colors::INFO_BLUE)
}

pub fn poll_embed(author: &str, question: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("{POLL_TITLE_PREFIX} **{author}**:"))
        .description(format!("```❓ {question}```"))
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(format!("Vote {POLL_YES} Yes or {POLL_NO} No.")))
}

pub fn reaction_role_embed(text: &str, emoji: &str, role_name: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(text)
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(format!(
            "React with {emoji} to get the {role_name} role."
        )))
}

pub fn blacklist_embed(words: &[String]) -> CreateEmbed {
    let listed: Vec<String> = words.iter().map(|w| format!("`{w}`")).collect();

    CreateEmbed::default()
        .title("⛔ Blacklisted Words")
        .description(listed.join(", "))
        .color(colors::NEUTRAL_GRAY)
        .footer(CreateEmbedFooter::new(format!("{} words", words.len())))
}

pub fn youtube_embed(video: &TrackMetadata) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(&video.title)
        .url(&video.webpage_url)
        .color(colors::ERROR_RED)
        .field("⏱️ Duration", duration_label(video.duration), true);

    if let Some(thumbnail) = &video.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed.footer(CreateEmbedFooter::new("▶️ YouTube"))
}

pub fn twitch_embed(stream: &Broadcast, now: DateTime<Utc>) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(&stream.title)
        .url(&stream.stream_url)
        .color(colors::TWITCH_PURPLE)
        .image(&stream.thumbnail_url)
        .thumbnail(&stream.box_art_url)
        .field("📺 Streamer", &stream.user_name, true)
        .field("🎮 Playing", &stream.game_name, true)
        .field(
            "👀 Viewers",
            stream.viewer_count.to_formatted_string(&Locale::en),
            true,
        )
        .field(
            "⏳ Live for",
            humantime::format_duration(stream.uptime(now)).to_string(),
            true,
        );

    if stream.is_mature {
        embed = embed.field("🔞", "Mature content", true);
    }

    embed.footer(CreateEmbedFooter::new("Twitch"))
}

pub fn meme_embed(meme: &Meme) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(&meme.title)
        .image(&meme.url)
        .color(colors::WARNING_ORANGE);

    if let Some(link) = &meme.post_link {
        embed = embed.url(link);
    }
    if let Some(subreddit) = &meme.subreddit {
        embed = embed.footer(CreateEmbedFooter::new(format!("r/{subreddit}")));
    }

    embed
}

pub fn welcome_embed(member_mention: &str, guild_name: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("👋 Welcome!")
        .description(format!("Welcome to **{guild_name}**, {member_mention}!"))
        .color(colors::SUCCESS_GREEN)
}

pub fn goodbye_embed(user_name: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("👋 Goodbye!")
        .description(format!("**{user_name}** has left the server."))
        .color(colors::NEUTRAL_GRAY)
}

/// `m:ss`, `h:mm:ss`, or a live marker when the length is unknown.
pub fn duration_label(duration: Option<Duration>) -> String {
    match duration {
        Some(duration) => format_duration(duration),
        None => "🔴 Live".to_string(),
    }
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_render_like_a_player() {
        assert_eq!(duration_label(Some(Duration::from_secs(65))), "1:05");
        assert_eq!(duration_label(Some(Duration::from_secs(3 * 3600 + 7))), "3:00:07");
        assert_eq!(duration_label(None), "🔴 Live");
    }
}
