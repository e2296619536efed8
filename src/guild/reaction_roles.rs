use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId, MessageId, RoleId};
use std::{collections::HashSet, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::storage::{Document, DocumentStore, StoreError};

/// One `{emoji, message} → role` binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionRole {
    pub guild_id: GuildId,
    pub role_id: RoleId,
    pub role_name: String,
    pub emoji: String,
    pub message_id: MessageId,
    pub channel_id: ChannelId,
}

/// All bindings of one guild, as persisted in `reactionroles.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionRoleDocument {
    #[serde(rename = "_id")]
    pub guild_id: String,
    pub roles: Vec<ReactionRole>,
}

impl Document for ReactionRoleDocument {
    fn id(&self) -> String {
        self.guild_id.clone()
    }
}

#[derive(Debug, Error)]
pub enum ReactionRoleError {
    #[error("**{0}** either doesn't exist, or isn't a reaction role on this server.")]
    NotAReactionRole(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Splits `records` into those whose role still exists and those whose role is gone.
pub fn partition_by_existing_roles(
    records: Vec<ReactionRole>,
    existing: &HashSet<RoleId>,
) -> (Vec<ReactionRole>, Vec<ReactionRole>) {
    records
        .into_iter()
        .partition(|record| existing.contains(&record.role_id))
}

/// Reaction-role bindings of every guild.
pub struct ReactionRoleStore {
    collection: Arc<dyn DocumentStore<ReactionRoleDocument>>,
    records: DashMap<GuildId, Vec<ReactionRole>>,
    writes: tokio::sync::Mutex<()>,
}

impl ReactionRoleStore {
    pub async fn load(
        collection: Arc<dyn DocumentStore<ReactionRoleDocument>>,
    ) -> Result<Self, StoreError> {
        let records = DashMap::new();

        for doc in collection.all().await? {
            match doc.guild_id.parse::<u64>() {
                Ok(id) if id != 0 => {
                    records.insert(GuildId::new(id), doc.roles);
                }
                _ => warn!(
                    "Ignoring reaction role document with invalid id {}",
                    doc.guild_id
                ),
            }
        }

        info!("🏷️ Loaded reaction roles for {} guilds", records.len());

        Ok(Self {
            collection,
            records,
            writes: tokio::sync::Mutex::new(()),
        })
    }

    pub fn guilds(&self) -> Vec<GuildId> {
        self.records.iter().map(|entry| *entry.key()).collect()
    }

    pub fn records(&self, guild_id: GuildId) -> Vec<ReactionRole> {
        self.records
            .get(&guild_id)
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Bindings triggered by `emoji` on `message_id`.
    pub fn matching(&self, guild_id: GuildId, message_id: MessageId, emoji: &str) -> Vec<ReactionRole> {
        self.records
            .get(&guild_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.message_id == message_id && r.emoji == emoji)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn add(&self, record: ReactionRole) -> Result<(), ReactionRoleError> {
        let _guard = self.writes.lock().await;
        let guild_id = record.guild_id;

        let mut next = self.records(guild_id);
        info!(
            "🏷️ Reaction role {} → {} bound on message {}",
            record.emoji, record.role_name, record.message_id
        );
        next.push(record);

        self.persist(guild_id, next).await?;
        Ok(())
    }

    /// Removes every binding of `role_id`, returning the removed bindings.
    pub async fn remove_role(
        &self,
        guild_id: GuildId,
        role_id: RoleId,
        role_name: &str,
    ) -> Result<Vec<ReactionRole>, ReactionRoleError> {
        let _guard = self.writes.lock().await;

        let (removed, kept): (Vec<_>, Vec<_>) = self
            .records(guild_id)
            .into_iter()
            .partition(|r| r.role_id == role_id);

        if removed.is_empty() {
            return Err(ReactionRoleError::NotAReactionRole(role_name.to_string()));
        }

        self.persist(guild_id, kept).await?;
        Ok(removed)
    }

    /// Drops the bindings attached to a deleted message.
    pub async fn remove_message(
        &self,
        guild_id: GuildId,
        message_id: MessageId,
    ) -> Result<Vec<ReactionRole>, ReactionRoleError> {
        if !self
            .records
            .get(&guild_id)
            .is_some_and(|records| records.iter().any(|r| r.message_id == message_id))
        {
            return Ok(Vec::new());
        }

        let _guard = self.writes.lock().await;
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .records(guild_id)
            .into_iter()
            .partition(|r| r.message_id == message_id);

        if !removed.is_empty() {
            self.persist(guild_id, kept).await?;
            info!(
                "🏷️ Removed {} reaction roles bound to deleted message {}",
                removed.len(),
                message_id
            );
        }

        Ok(removed)
    }

    /// Removes exactly the bindings whose role is not in `existing`.
    pub async fn reconcile(
        &self,
        guild_id: GuildId,
        existing: &HashSet<RoleId>,
    ) -> Result<Vec<ReactionRole>, ReactionRoleError> {
        let _guard = self.writes.lock().await;

        let (kept, removed) = partition_by_existing_roles(self.records(guild_id), existing);
        if removed.is_empty() {
            return Ok(removed);
        }

        self.persist(guild_id, kept).await?;
        info!(
            "🧹 Reconciled guild {}: dropped {} reaction roles with deleted roles",
            guild_id,
            removed.len()
        );
        Ok(removed)
    }

    async fn persist(&self, guild_id: GuildId, records: Vec<ReactionRole>) -> Result<(), StoreError> {
        let id = guild_id.to_string();

        if records.is_empty() {
            self.collection.delete(&id).await?;
            self.records.remove(&guild_id);
        } else {
            let doc = ReactionRoleDocument {
                guild_id: id,
                roles: records.clone(),
            };
            self.collection.upsert(&doc).await?;
            self.records.insert(guild_id, records);
        }

        debug!("💾 Reaction roles persisted for guild {}", guild_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonCollection;
    use pretty_assertions::assert_eq;

    const GUILD: GuildId = GuildId::new(1);

    fn record(role: u64, message: u64, emoji: &str) -> ReactionRole {
        ReactionRole {
            guild_id: GUILD,
            role_id: RoleId::new(role),
            role_name: format!("role-{role}"),
            emoji: emoji.to_string(),
            message_id: MessageId::new(message),
            channel_id: ChannelId::new(99),
        }
    }

    async fn store(dir: &tempfile::TempDir) -> ReactionRoleStore {
        let collection =
            JsonCollection::<ReactionRoleDocument>::open(dir.path().join("reactionroles.json"))
                .await
                .unwrap();
        ReactionRoleStore::load(Arc::new(collection)).await.unwrap()
    }

    #[test]
    fn partition_keeps_exactly_existing_roles() {
        let records = vec![record(10, 1, "🔥"), record(11, 1, "🎵"), record(12, 2, "🔥")];
        let existing: HashSet<RoleId> = [RoleId::new(10), RoleId::new(12)].into();

        let (kept, removed) = partition_by_existing_roles(records, &existing);

        assert_eq!(kept, vec![record(10, 1, "🔥"), record(12, 2, "🔥")]);
        assert_eq!(removed, vec![record(11, 1, "🎵")]);
    }

    #[tokio::test]
    async fn matching_filters_on_message_and_emoji() {
        let dir = tempfile::tempdir().unwrap();
        let roles = store(&dir).await;

        roles.add(record(10, 1, "🔥")).await.unwrap();
        roles.add(record(11, 1, "🎵")).await.unwrap();
        roles.add(record(12, 1, "🔥")).await.unwrap();

        let hits = roles.matching(GUILD, MessageId::new(1), "🔥");
        assert_eq!(hits, vec![record(10, 1, "🔥"), record(12, 1, "🔥")]);
        assert!(roles.matching(GUILD, MessageId::new(2), "🔥").is_empty());
    }

    #[tokio::test]
    async fn reconcile_removes_only_deleted_roles_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let roles = store(&dir).await;
            roles.add(record(10, 1, "🔥")).await.unwrap();
            roles.add(record(11, 2, "🎵")).await.unwrap();

            let existing: HashSet<RoleId> = [RoleId::new(10)].into();
            let removed = roles.reconcile(GUILD, &existing).await.unwrap();
            assert_eq!(removed, vec![record(11, 2, "🎵")]);
        }

        let reloaded = store(&dir).await;
        assert_eq!(reloaded.records(GUILD), vec![record(10, 1, "🔥")]);
    }

    #[tokio::test]
    async fn remove_role_unknown_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let roles = store(&dir).await;
        roles.add(record(10, 1, "🔥")).await.unwrap();

        let result = roles.remove_role(GUILD, RoleId::new(77), "Ghost").await;
        assert!(matches!(result, Err(ReactionRoleError::NotAReactionRole(name)) if name == "Ghost"));

        let removed = roles.remove_role(GUILD, RoleId::new(10), "role-10").await.unwrap();
        assert_eq!(removed.len(), 1);
        assert!(roles.records(GUILD).is_empty());
        assert!(roles.guilds().is_empty());
    }

    #[tokio::test]
    async fn deleting_source_message_drops_its_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let roles = store(&dir).await;
        roles.add(record(10, 1, "🔥")).await.unwrap();
        roles.add(record(11, 2, "🎵")).await.unwrap();

        let removed = roles.remove_message(GUILD, MessageId::new(1)).await.unwrap();
        assert_eq!(removed, vec![record(10, 1, "🔥")]);
        assert!(roles
            .remove_message(GUILD, MessageId::new(1))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(roles.records(GUILD), vec![record(11, 2, "🎵")]);
    }
}
