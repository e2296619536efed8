use chrono::Utc;
use poise::CreateReply;
use serenity::{
    all::{
        ComponentInteraction, EditRole, GetMessages, PermissionOverwrite, PermissionOverwriteType,
        Permissions, User,
    },
    http::Http,
    model::id::{ChannelId, GuildId, MessageId, RoleId, UserId},
    prelude::Context as SerenityContext,
};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    bot::{reply_embed, BbBot, Context},
    error::{is_not_found, BotError, BotResult},
    guild::{BlacklistError, WordChange},
    ui::{
        buttons::{confirmation_buttons, ButtonPress, ConfirmAction},
        embeds::{blacklist_embed, success_embed, warning_embed},
    },
};

const MUTED_ROLE: &str = "Muted";

const MUTED_DENY: Permissions = Permissions::SEND_MESSAGES
    .union(Permissions::SEND_MESSAGES_IN_THREADS)
    .union(Permissions::ADD_REACTIONS)
    .union(Permissions::SPEAK);

const PURGE_BATCH: usize = 100;

/// Discord refuses to bulk delete messages older than two weeks.
const BULK_DELETE_MAX_AGE_SECS: i64 = 14 * 24 * 60 * 60 - 60;

const MAX_SOFTBAN_DAYS: i64 = 365;

/// Deletes recent messages in this channel
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    ephemeral,
    aliases("purge"),
    required_permissions = "MANAGE_MESSAGES",
    user_cooldown = 15,
    category = "🛡️ Moderation"
)]
pub async fn clear(
    ctx: Context<'_>,
    #[description = "How many messages to delete"] amount: Option<i64>,
) -> BotResult<()> {
    let cap = ctx.data().config.purge_all_limit;
    let channel = ctx.channel_id();

    let Some(amount) = amount else {
        let embed = warning_embed(
            "No amount given",
            &format!("Would you like to clear up to **{cap}** messages in this channel?"),
        );
        let buttons = confirmation_buttons(ConfirmAction::ClearChannel, ctx.author().id);
        ctx.send(
            CreateReply::default()
                .embed(embed)
                .components(vec![buttons])
                .reply(true),
        )
        .await?;
        return Ok(());
    };

    if amount < 1 {
        return Err(BotError::user("Please enter a number of messages greater than 0."));
    }

    let before = match ctx {
        poise::Context::Prefix(prefix) => {
            prefix.msg.delete(ctx.http()).await?;
            Some(prefix.msg.id)
        }
        poise::Context::Application(_) => {
            ctx.defer_ephemeral().await?;
            None
        }
    };

    let limit = usize::try_from(amount).unwrap_or(cap).min(cap);
    let deleted = purge(ctx.http(), channel, limit, before).await?;

    info!("🧹 Cleared {} messages in channel {}", deleted, channel);
    ctx.say(format!("🛠️ Deleted **{deleted}** messages.")).await?;
    Ok(())
}

/// Kicks a member from the server
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    ephemeral,
    required_permissions = "KICK_MEMBERS",
    user_cooldown = 30,
    category = "🛡️ Moderation"
)]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "Member to kick"] member: User,
    #[description = "Reason for the audit log"]
    #[rest]
    reason: Option<String>,
) -> BotResult<()> {
    let guild_id = guild(ctx)?;
    let reason = reason.as_deref();

    match reason {
        Some(reason) => guild_id.kick_with_reason(ctx.http(), member.id, reason).await?,
        None => guild_id.kick(ctx.http(), member.id).await?,
    }

    announce_sanction(ctx, member.id, "kicked", reason).await
}

/// Bans a member from the server
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    ephemeral,
    required_permissions = "BAN_MEMBERS",
    user_cooldown = 30,
    category = "🛡️ Moderation"
)]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "Member to ban"] member: User,
    #[description = "Reason for the audit log"]
    #[rest]
    reason: Option<String>,
) -> BotResult<()> {
    let guild_id = guild(ctx)?;
    let reason = reason.as_deref();

    ban_member(ctx.http(), guild_id, member.id, reason).await?;

    announce_sanction(ctx, member.id, "permanently banned", reason).await
}

/// Bans a member and unbans them after some days
///
/// The pending unban lives only in memory and is lost on restart.
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    ephemeral,
    aliases("tempban"),
    required_permissions = "BAN_MEMBERS",
    user_cooldown = 30,
    category = "🛡️ Moderation"
)]
pub async fn softban(
    ctx: Context<'_>,
    #[description = "Member to ban"] member: User,
    #[description = "Days until the ban is lifted"] days: Option<i64>,
    #[description = "Reason for the audit log"]
    #[rest]
    reason: Option<String>,
) -> BotResult<()> {
    let guild_id = guild(ctx)?;
    let reason = reason.as_deref();
    let days = days.unwrap_or(1);

    if !(1..=MAX_SOFTBAN_DAYS).contains(&days) {
        return Err(BotError::user(format!(
            "A temporary ban lasts between 1 and {MAX_SOFTBAN_DAYS} days."
        )));
    }

    let target = member.id;
    ban_member(ctx.http(), guild_id, target, reason).await?;

    let http = Arc::clone(&ctx.serenity_context().http);
    let duration = Duration::from_secs(days as u64 * 24 * 60 * 60);
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        match guild_id.unban(&http, target).await {
            Ok(()) => info!("⚖️ Temporary ban of {} lifted in guild {}", target, guild_id),
            Err(e) => warn!("⚠️ Could not lift temporary ban of {}: {}", target, e),
        }
    });

    let action = format!(
        "temporarily banned for {}",
        humantime::format_duration(duration)
    );
    announce_sanction(ctx, target, &action, reason).await
}

/// Lifts the ban of a user
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    ephemeral,
    required_permissions = "BAN_MEMBERS",
    user_cooldown = 2,
    category = "🛡️ Moderation"
)]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "User ID or mention"] user: User,
) -> BotResult<()> {
    let guild_id = guild(ctx)?;

    match guild_id.unban(ctx.http(), user.id).await {
        Ok(()) => {}
        Err(e) if is_not_found(&e) => {
            return Err(BotError::user(format!(
                "Unbanning <@{}> was not possible. Please check that they are currently banned.",
                user.id
            )))
        }
        Err(e) => return Err(e.into()),
    }

    info!("⚖️ {} unbanned in guild {}", user.id, guild_id);
    ctx.reply(format!(
        "🛠️ <@{}>: <@{}>'s ban was lifted.",
        ctx.author().id,
        user.id
    ))
    .await?;
    Ok(())
}

/// Stops a member from talking in text and voice channels
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    ephemeral,
    required_permissions = "MODERATE_MEMBERS",
    category = "🛡️ Moderation"
)]
pub async fn mute(
    ctx: Context<'_>,
    #[description = "Member to mute"] member: User,
    #[description = "Reason for the audit log"]
    #[rest]
    reason: Option<String>,
) -> BotResult<()> {
    let guild_id = guild(ctx)?;
    let reason = reason.as_deref();
    let http = ctx.http();

    let role_id = match find_muted_role(ctx.serenity_context(), guild_id).await? {
        Some(role_id) => role_id,
        None => create_muted_role(http, guild_id).await?,
    };

    http.add_member_role(guild_id, member.id, role_id, reason).await?;

    info!("🔇 Muted {} in guild {}", member.id, guild_id);
    let mut embed = success_embed("Member Muted", &format!("💡 Member: <@{}>.", member.id));
    if let Some(reason) = reason {
        embed = embed.field("🖊️ Reason", reason, false);
    }
    reply_embed(ctx, embed).await?;
    Ok(())
}

/// Lets a muted member talk again
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    ephemeral,
    required_permissions = "MODERATE_MEMBERS",
    category = "🛡️ Moderation"
)]
pub async fn unmute(
    ctx: Context<'_>,
    #[description = "Member to unmute"] member: User,
) -> BotResult<()> {
    let guild_id = guild(ctx)?;

    let role_id = find_muted_role(ctx.serenity_context(), guild_id)
        .await?
        .ok_or_else(|| BotError::user("Nobody is muted on this server."))?;

    ctx.http()
        .remove_member_role(guild_id, member.id, role_id, None)
        .await?;

    info!("🔊 Unmuted {} in guild {}", member.id, guild_id);
    reply_embed(
        ctx,
        success_embed("Member Unmuted", &format!("💡 Member: <@{}>.", member.id)),
    )
    .await?;
    Ok(())
}

/// Adds words to the server blacklist
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    ephemeral,
    rename = "blacklist",
    aliases("ban_word", "addblacklist"),
    required_permissions = "MANAGE_MESSAGES",
    user_cooldown = 2,
    category = "🛡️ Moderation"
)]
pub async fn blacklist_add(
    ctx: Context<'_>,
    #[description = "Words to ban, separated by spaces"]
    #[rest]
    words: String,
) -> BotResult<()> {
    let guild_id = guild(ctx)?;
    let change = ctx.data().blacklist.add(guild_id, &words).await?;

    reply_embed(
        ctx,
        success_embed(
            "Blacklist Updated",
            &describe_change(&change, "added to", "already blacklisted"),
        ),
    )
    .await?;
    Ok(())
}

/// Removes words from the server blacklist
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    ephemeral,
    rename = "blacklistremove",
    aliases("unban_word", "removeblacklist"),
    required_permissions = "MANAGE_MESSAGES",
    user_cooldown = 2,
    category = "🛡️ Moderation"
)]
pub async fn blacklist_remove(
    ctx: Context<'_>,
    #[description = "Words to allow again, separated by spaces"]
    #[rest]
    words: String,
) -> BotResult<()> {
    let guild_id = guild(ctx)?;
    let change = ctx.data().blacklist.remove(guild_id, &words).await?;

    reply_embed(
        ctx,
        success_embed(
            "Blacklist Updated",
            &describe_change(&change, "removed from", "not blacklisted"),
        ),
    )
    .await?;
    Ok(())
}

/// Lists the blacklisted words
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    ephemeral,
    rename = "showblacklist",
    aliases("blacklisted"),
    required_permissions = "MANAGE_MESSAGES",
    category = "🛡️ Moderation"
)]
pub async fn blacklist_show(ctx: Context<'_>) -> BotResult<()> {
    let guild_id = guild(ctx)?;
    let words = ctx.data().blacklist.words(guild_id);

    if words.is_empty() {
        return Err(BlacklistError::Empty.into());
    }

    reply_embed(ctx, blacklist_embed(&words)).await?;
    Ok(())
}

/// Deletes every blacklisted word
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    ephemeral,
    rename = "clearblacklist",
    required_permissions = "MANAGE_MESSAGES",
    category = "🛡️ Moderation"
)]
pub async fn blacklist_clear(ctx: Context<'_>) -> BotResult<()> {
    let guild_id = guild(ctx)?;

    if !ctx.data().blacklist.has_words(guild_id) {
        return Err(BlacklistError::Empty.into());
    }

    let embed = warning_embed(
        "Clear blacklist",
        "Are you sure you want to delete every blacklisted word?",
    );
    let buttons = confirmation_buttons(ConfirmAction::ClearBlacklist, ctx.author().id);
    ctx.send(
        CreateReply::default()
            .embed(embed)
            .components(vec![buttons])
            .reply(true),
    )
    .await?;
    Ok(())
}

/// Carries out a confirmed destructive action. Returns the text that replaces the prompt.
pub async fn confirm(
    ctx: &SerenityContext,
    bot: &BbBot,
    component: &ComponentInteraction,
    press: ButtonPress,
) -> BotResult<String> {
    let guild_id = component.guild_id.ok_or(BotError::NoPrivateMessage)?;

    match press.action {
        ConfirmAction::ClearChannel => {
            let deleted = purge(
                &ctx.http,
                component.channel_id,
                bot.config.purge_all_limit,
                Some(component.message.id),
            )
            .await?;
            info!("🧹 Cleared {} messages in channel {}", deleted, component.channel_id);
            Ok(format!("🛠️ Deleted **{deleted}** messages."))
        }
        ConfirmAction::ClearBlacklist => {
            let cleared = bot.blacklist.clear(guild_id).await?;
            Ok(format!("🛠️ Removed **{cleared}** words from the blacklist."))
        }
    }
}

/// Deletes up to `limit` messages older than `before`, newest first.
pub async fn purge(
    http: &Http,
    channel: ChannelId,
    limit: usize,
    mut before: Option<MessageId>,
) -> serenity::Result<usize> {
    let mut deleted = 0;

    while deleted < limit {
        let batch = (limit - deleted).min(PURGE_BATCH);
        let mut request = GetMessages::new().limit(batch as u8);
        if let Some(before) = before {
            request = request.before(before);
        }

        let messages = channel.messages(http, request).await?;
        let Some(oldest) = messages.last() else {
            break;
        };
        before = Some(oldest.id);

        let (recent, old) = split_by_age(
            messages.iter().map(|m| (m.id, m.timestamp.unix_timestamp())),
            Utc::now().timestamp(),
        );

        if !recent.is_empty() {
            channel.delete_messages(http, &recent).await?;
        }
        for id in old {
            channel.delete_message(http, id).await?;
        }

        deleted += messages.len();
        if messages.len() < batch {
            break;
        }
    }

    Ok(deleted)
}

/// Splits messages into those that may be bulk deleted and those that must go one by one.
fn split_by_age(
    messages: impl IntoIterator<Item = (MessageId, i64)>,
    now: i64,
) -> (Vec<MessageId>, Vec<MessageId>) {
    let mut recent = Vec::new();
    let mut old = Vec::new();

    for (id, created) in messages {
        if now - created < BULK_DELETE_MAX_AGE_SECS {
            recent.push(id);
        } else {
            old.push(id);
        }
    }

    (recent, old)
}

fn guild(ctx: Context<'_>) -> BotResult<GuildId> {
    ctx.guild_id().ok_or(BotError::NoPrivateMessage)
}

async fn ban_member(
    http: &Http,
    guild_id: GuildId,
    member: UserId,
    reason: Option<&str>,
) -> serenity::Result<()> {
    match reason {
        Some(reason) => guild_id.ban_with_reason(http, member, 0, reason).await,
        None => guild_id.ban(http, member, 0).await,
    }
}

async fn announce_sanction(
    ctx: Context<'_>,
    target: UserId,
    action: &str,
    reason: Option<&str>,
) -> BotResult<()> {
    info!(
        "⚖️ {} was {} in guild {:?} by {}",
        target,
        action,
        ctx.guild_id(),
        ctx.author().name
    );

    reply_embed(
        ctx,
        success_embed("User Sanctioned", &sanction_message(target, action, reason)),
    )
    .await?;
    Ok(())
}

fn sanction_message(target: UserId, action: &str, reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("⚖️ <@{target}> was {action} for **{reason}**."),
        None => format!("⚖️ <@{target}> was {action}."),
    }
}

fn describe_change(change: &WordChange, changed: &str, skipped: &str) -> String {
    let quote = |words: &[String]| {
        words
            .iter()
            .map(|w| format!("`{w}`"))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut text = format!("{} {changed} the blacklist.", quote(&change.changed));
    if !change.skipped.is_empty() {
        text.push_str(&format!("\n{} {skipped}.", quote(&change.skipped)));
    }
    text
}

async fn find_muted_role(ctx: &SerenityContext, guild_id: GuildId) -> serenity::Result<Option<RoleId>> {
    let cached = ctx.cache.guild(guild_id).map(|guild| {
        guild
            .roles
            .values()
            .find(|role| role.name == MUTED_ROLE)
            .map(|role| role.id)
    });

    match cached {
        Some(found) => Ok(found),
        None => Ok(guild_id
            .roles(&ctx.http)
            .await?
            .into_values()
            .find(|role| role.name == MUTED_ROLE)
            .map(|role| role.id)),
    }
}

/// Creates the `Muted` role and denies it talking in every channel.
async fn create_muted_role(http: &Http, guild_id: GuildId) -> serenity::Result<RoleId> {
    let role = guild_id
        .create_role(
            http,
            EditRole::new()
                .name(MUTED_ROLE)
                .permissions(Permissions::empty()),
        )
        .await?;

    for channel_id in guild_id.channels(http).await?.into_keys() {
        let overwrite = PermissionOverwrite {
            allow: Permissions::empty(),
            deny: MUTED_DENY,
            kind: PermissionOverwriteType::Role(role.id),
        };
        if let Err(e) = channel_id.create_permission(http, overwrite).await {
            warn!("⚠️ Could not restrict Muted role in channel {}: {}", channel_id, e);
        }
    }

    info!("🔇 Created Muted role in guild {}", guild_id);
    Ok(role.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn messages_older_than_two_weeks_are_deleted_one_by_one() {
        let now = 1_700_000_000;
        let day = 24 * 60 * 60;
        let messages = vec![
            (MessageId::new(3), now - 60),
            (MessageId::new(2), now - 13 * day),
            (MessageId::new(1), now - 15 * day),
        ];

        let (recent, old) = split_by_age(messages, now);
        assert_eq!(recent, vec![MessageId::new(3), MessageId::new(2)]);
        assert_eq!(old, vec![MessageId::new(1)]);
    }

    #[test]
    fn sanction_message_mentions_reason_when_given() {
        let target = UserId::new(42);
        assert_eq!(
            sanction_message(target, "kicked", Some("spam")),
            "⚖️ <@42> was kicked for **spam**."
        );
        assert_eq!(sanction_message(target, "kicked", None), "⚖️ <@42> was kicked.");
    }

    #[test]
    fn word_changes_list_skipped_words() {
        let change = WordChange {
            changed: vec!["foo".to_string()],
            skipped: vec!["bar".to_string(), "baz".to_string()],
        };
        assert_eq!(
            describe_change(&change, "added to", "already blacklisted"),
            "`foo` added to the blacklist.\n`bar`, `baz` already blacklisted."
        );
    }

    #[test]
    fn sanctions_need_matching_permissions() {
        assert_eq!(kick().required_permissions, Permissions::KICK_MEMBERS);
        assert_eq!(ban().required_permissions, Permissions::BAN_MEMBERS);
        assert_eq!(unban().required_permissions, Permissions::BAN_MEMBERS);
        assert_eq!(clear().required_permissions, Permissions::MANAGE_MESSAGES);
        assert_eq!(blacklist_add().name, "blacklist");

        for command in [clear(), kick(), ban(), softban(), mute(), blacklist_clear()] {
            assert!(command.guild_only, "{} works in private messages", command.name);
            assert!(command.ephemeral, "{} answers publicly", command.name);
        }
    }

    #[test]
    fn muted_role_cannot_talk() {
        assert!(MUTED_DENY.contains(Permissions::SEND_MESSAGES | Permissions::SPEAK));
        assert!(!MUTED_DENY.contains(Permissions::VIEW_CHANNEL));
    }
}
