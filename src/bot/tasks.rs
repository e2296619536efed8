//! Periodic background work started once the gateway is ready.

use serenity::{all::ActivityData, model::id::RoleId, prelude::Context};
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::guild::ReactionRoleStore;

/// Commands advertised in the bot's presence, in rotation.
const PRESENCE_COMMANDS: [&str; 3] = ["help", "play", "twitch"];

/// Drops reaction roles whose role was deleted, every `every`.
pub fn spawn_reconciler(ctx: Context, store: Arc<ReactionRoleStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;
            reconcile_reaction_roles(&ctx, &store).await;
        }
    })
}

/// One reconciliation pass. Failures are logged per guild and the pass goes on.
pub async fn reconcile_reaction_roles(ctx: &Context, store: &ReactionRoleStore) {
    for guild_id in store.guilds() {
        let roles = match guild_id.roles(&ctx.http).await {
            Ok(roles) => roles,
            Err(e) => {
                warn!("⚠️ Could not fetch roles of guild {}: {}", guild_id, e);
                continue;
            }
        };

        let existing: HashSet<RoleId> = roles.into_keys().collect();
        if let Err(e) = store.reconcile(guild_id, &existing).await {
            warn!("⚠️ Reaction role reconciliation failed for guild {}: {}", guild_id, e);
        }
    }

    debug!("Reaction role reconciliation pass finished");
}

/// Rotates the "Playing ..." presence through the main commands.
pub fn spawn_presence_rotation(ctx: Context, prefix: String, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        let mut tick = 0;

        loop {
            interval.tick().await;
            ctx.set_activity(Some(ActivityData::playing(presence_text(&prefix, tick))));
            tick = tick.wrapping_add(1);
        }
    })
}

fn presence_text(prefix: &str, tick: usize) -> String {
    format!("{prefix}{}", PRESENCE_COMMANDS[tick % PRESENCE_COMMANDS.len()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_cycles_through_commands() {
        let texts: Vec<String> = (0..4).map(|tick| presence_text("~", tick)).collect();
        assert_eq!(texts, vec!["~help", "~play", "~twitch", "~help"]);
    }
}
