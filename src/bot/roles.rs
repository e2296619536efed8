use serenity::{
    all::{Reaction, ReactionType, Role},
    model::id::{GuildId, RoleId},
    prelude::Context as SerenityContext,
};
use tracing::{debug, info};

use crate::{
    bot::{reply_embed, BbBot, Context},
    error::{BotError, BotResult},
    guild::ReactionRole,
    ui::embeds::{reaction_role_embed, success_embed},
};

/// Posts a message that grants a role to whoever reacts
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    rename = "reactrole",
    aliases("rr"),
    required_permissions = "MANAGE_ROLES",
    category = "🏷️ Roles"
)]
pub async fn add_reaction_role(
    ctx: Context<'_>,
    #[description = "Emoji members react with"] emoji: String,
    #[description = "Role to grant"] role: Role,
    #[description = "Text of the message"]
    #[rest]
    message: String,
) -> BotResult<()> {
    let guild_id = ctx.guild_id().ok_or(BotError::NoPrivateMessage)?;

    let reaction = ReactionType::try_from(emoji.as_str())
        .map_err(|_| BotError::user(format!("`{emoji}` is not an emoji I can react with.")))?;

    let reply = reply_embed(ctx, reaction_role_embed(&message, &emoji, &role.name)).await?;
    let posted = reply.message().await?;
    posted.react(ctx.http(), reaction.clone()).await?;

    ctx.data()
        .reaction_roles
        .add(ReactionRole {
            guild_id,
            role_id: role.id,
            role_name: role.name.clone(),
            emoji: emoji_key(&reaction),
            message_id: posted.id,
            channel_id: posted.channel_id,
        })
        .await?;

    info!(
        "🏷️ Reaction role {} → {} created in guild {}",
        emoji, role.name, guild_id
    );
    Ok(())
}

/// Deletes every reaction role message of a role
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    rename = "removereactrole",
    aliases("rrr"),
    required_permissions = "MANAGE_ROLES",
    category = "🏷️ Roles"
)]
pub async fn remove_reaction_role(
    ctx: Context<'_>,
    #[description = "Role to unbind"] role: Role,
) -> BotResult<()> {
    let guild_id = ctx.guild_id().ok_or(BotError::NoPrivateMessage)?;

    let removed = ctx
        .data()
        .reaction_roles
        .remove_role(guild_id, role.id, &role.name)
        .await?;

    for record in &removed {
        if let Err(e) = record
            .channel_id
            .delete_message(ctx.http(), record.message_id)
            .await
        {
            debug!("Reaction role message {} not deleted: {}", record.message_id, e);
        }
    }

    reply_embed(
        ctx,
        success_embed(
            "Reaction Role Removed",
            &format!(
                "**{}** is no longer a reaction role ({} messages deleted).",
                role.name,
                removed.len()
            ),
        ),
    )
    .await?;
    Ok(())
}

/// Grants or revokes the roles bound to a reaction.
pub async fn sync_reaction(
    ctx: &SerenityContext,
    bot: &BbBot,
    reaction: &Reaction,
    added: bool,
) -> BotResult<()> {
    let (Some(guild_id), Some(user_id)) = (reaction.guild_id, reaction.user_id) else {
        return Ok(());
    };

    if user_id == ctx.cache.current_user().id
        || reaction.member.as_ref().is_some_and(|member| member.user.bot)
    {
        return Ok(());
    }

    let records = bot
        .reaction_roles
        .matching(guild_id, reaction.message_id, &emoji_key(&reaction.emoji));

    for record in records {
        if !role_exists(ctx, guild_id, record.role_id) {
            debug!("Skipping reaction role {}: role no longer exists", record.role_name);
            continue;
        }

        if added {
            ctx.http
                .add_member_role(guild_id, user_id, record.role_id, Some("Reaction role"))
                .await?;
            info!("🏷️ Gave {} to {} in guild {}", record.role_name, user_id, guild_id);
        } else {
            ctx.http
                .remove_member_role(guild_id, user_id, record.role_id, Some("Reaction role"))
                .await?;
            info!("🏷️ Took {} from {} in guild {}", record.role_name, user_id, guild_id);
        }
    }

    Ok(())
}

/// Stable key of an emoji: the id of custom emojis, the text of unicode ones.
pub fn emoji_key(reaction: &ReactionType) -> String {
    match reaction {
        ReactionType::Custom { id, .. } => id.to_string(),
        ReactionType::Unicode(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Uncached guilds are assumed to still have the role.
fn role_exists(ctx: &SerenityContext, guild_id: GuildId, role_id: RoleId) -> bool {
    ctx.cache
        .guild(guild_id)
        .map_or(true, |guild| guild.roles.contains_key(&role_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::model::id::EmojiId;

    #[test]
    fn custom_emojis_are_keyed_by_id() {
        let custom = ReactionType::Custom {
            animated: false,
            id: EmojiId::new(1234),
            name: Some("pepe".to_string()),
        };
        assert_eq!(emoji_key(&custom), "1234");

        let parsed = ReactionType::try_from("<:pepe:1234>").unwrap();
        assert_eq!(emoji_key(&parsed), "1234");
    }

    #[test]
    fn reaction_role_commands_need_manage_roles() {
        use serenity::model::Permissions;

        assert_eq!(add_reaction_role().name, "reactrole");
        assert_eq!(remove_reaction_role().name, "removereactrole");
        for command in [add_reaction_role(), remove_reaction_role()] {
            assert_eq!(command.required_permissions, Permissions::MANAGE_ROLES);
        }
    }

    #[test]
    fn unicode_emojis_are_keyed_by_text() {
        let parsed = ReactionType::try_from("🔥").unwrap();
        assert_eq!(emoji_key(&parsed), "🔥");
    }
}
