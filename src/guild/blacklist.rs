use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::{collections::BTreeSet, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::storage::{Document, DocumentStore, StoreError};

/// Banned words of one guild, as persisted in `blacklist.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistDocument {
    #[serde(rename = "_id")]
    pub guild_id: String,
    pub words: BTreeSet<String>,
}

impl Document for BlacklistDocument {
    fn id(&self) -> String {
        self.guild_id.clone()
    }
}

#[derive(Debug, Error)]
pub enum BlacklistError {
    #[error("Please enter one or more words.")]
    NoWords,
    #[error("Sorry. Those words are already in the blacklist.")]
    AllDuplicates,
    #[error("Sorry. Those words are not in the blacklist.")]
    NoneListed,
    #[error("This server does not have any words blacklisted.")]
    Empty,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a successful add or remove.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WordChange {
    /// Words that were actually added or removed.
    pub changed: Vec<String>,
    /// Words skipped because they were already present (add) or absent (remove).
    pub skipped: Vec<String>,
}

/// Per-guild banned word sets.
///
/// Reads are served from memory; every mutation is persisted before the in-memory
/// copy changes, so a failed write leaves the filter exactly as it was.
pub struct BlacklistStore {
    collection: Arc<dyn DocumentStore<BlacklistDocument>>,
    words: DashMap<GuildId, BTreeSet<String>>,
    writes: tokio::sync::Mutex<()>,
}

impl BlacklistStore {
    pub async fn load(
        collection: Arc<dyn DocumentStore<BlacklistDocument>>,
    ) -> Result<Self, StoreError> {
        let words = DashMap::new();

        for doc in collection.all().await? {
            match doc.guild_id.parse::<u64>() {
                Ok(id) if id != 0 => {
                    words.insert(GuildId::new(id), doc.words);
                }
                _ => warn!("Ignoring blacklist document with invalid id {}", doc.guild_id),
            }
        }

        info!("⛔ Loaded blacklists for {} guilds", words.len());

        Ok(Self {
            collection,
            words,
            writes: tokio::sync::Mutex::new(()),
        })
    }

    /// Sorted banned words of a guild.
    pub fn words(&self, guild_id: GuildId) -> Vec<String> {
        self.words
            .get(&guild_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_words(&self, guild_id: GuildId) -> bool {
        self.words.get(&guild_id).is_some_and(|set| !set.is_empty())
    }

    /// Whether any whitespace-separated token of `content` is banned in the guild.
    pub fn is_blocked(&self, guild_id: GuildId, content: &str) -> bool {
        let Some(banned) = self.words.get(&guild_id) else {
            return false;
        };

        if banned.is_empty() {
            return false;
        }

        content
            .split_whitespace()
            .any(|token| banned.contains(&token.to_lowercase()))
    }

    pub async fn add(&self, guild_id: GuildId, input: &str) -> Result<WordChange, BlacklistError> {
        let requested = normalize_words(input);
        if requested.is_empty() {
            return Err(BlacklistError::NoWords);
        }

        let _guard = self.writes.lock().await;
        let mut next = self.words.get(&guild_id).map(|s| s.clone()).unwrap_or_default();

        let mut change = WordChange::default();
        for word in requested {
            if next.insert(word.clone()) {
                change.changed.push(word);
            } else {
                change.skipped.push(word);
            }
        }

        if change.changed.is_empty() {
            return Err(BlacklistError::AllDuplicates);
        }

        self.persist(guild_id, next).await?;
        info!(
            "⛔ Added {} words to blacklist of guild {}",
            change.changed.len(),
            guild_id
        );
        Ok(change)
    }

    pub async fn remove(
        &self,
        guild_id: GuildId,
        input: &str,
    ) -> Result<WordChange, BlacklistError> {
        let requested = normalize_words(input);
        if requested.is_empty() {
            return Err(BlacklistError::NoWords);
        }

        let _guard = self.writes.lock().await;
        let mut next = match self.words.get(&guild_id) {
            Some(set) if !set.is_empty() => set.clone(),
            _ => return Err(BlacklistError::Empty),
        };

        let mut change = WordChange::default();
        for word in requested {
            if next.remove(&word) {
                change.changed.push(word);
            } else {
                change.skipped.push(word);
            }
        }

        if change.changed.is_empty() {
            return Err(BlacklistError::NoneListed);
        }

        self.persist(guild_id, next).await?;
        info!(
            "⛔ Removed {} words from blacklist of guild {}",
            change.changed.len(),
            guild_id
        );
        Ok(change)
    }

    /// Deletes the whole blacklist of a guild, returning how many words it held.
    pub async fn clear(&self, guild_id: GuildId) -> Result<usize, BlacklistError> {
        let _guard = self.writes.lock().await;
        let count = match self.words.get(&guild_id) {
            Some(set) if !set.is_empty() => set.len(),
            _ => return Err(BlacklistError::Empty),
        };

        self.persist(guild_id, BTreeSet::new()).await?;
        info!("🗑️ Cleared blacklist of guild {}", guild_id);
        Ok(count)
    }

    async fn persist(&self, guild_id: GuildId, words: BTreeSet<String>) -> Result<(), StoreError> {
        let id = guild_id.to_string();

        if words.is_empty() {
            self.collection.delete(&id).await?;
            self.words.remove(&guild_id);
        } else {
            let doc = BlacklistDocument {
                guild_id: id,
                words: words.clone(),
            };
            self.collection.upsert(&doc).await?;
            self.words.insert(guild_id, words);
        }

        debug!("💾 Blacklist persisted for guild {}", guild_id);
        Ok(())
    }
}

/// Lowercased, de-duplicated words in input order.
fn normalize_words(input: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    input
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|word| seen.insert(word.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonCollection;
    use pretty_assertions::assert_eq;

    const GUILD: GuildId = GuildId::new(42);

    async fn store(dir: &tempfile::TempDir) -> BlacklistStore {
        let collection = JsonCollection::<BlacklistDocument>::open(dir.path().join("blacklist.json"))
            .await
            .unwrap();
        BlacklistStore::load(Arc::new(collection)).await.unwrap()
    }

    #[tokio::test]
    async fn whole_token_case_insensitive_match() {
        let dir = tempfile::tempdir().unwrap();
        let blacklist = store(&dir).await;

        blacklist.add(GUILD, "foo").await.unwrap();

        assert!(blacklist.is_blocked(GUILD, "what is Foo doing"));
        assert!(blacklist.is_blocked(GUILD, "FOO"));
        assert!(!blacklist.is_blocked(GUILD, "I like food"));
        assert!(!blacklist.is_blocked(GuildId::new(7), "foo"));
    }

    #[tokio::test]
    async fn duplicate_add_reports_error_and_keeps_set() {
        let dir = tempfile::tempdir().unwrap();
        let blacklist = store(&dir).await;

        blacklist.add(GUILD, "foo bar").await.unwrap();
        let result = blacklist.add(GUILD, "FOO bar").await;

        assert!(matches!(result, Err(BlacklistError::AllDuplicates)));
        assert_eq!(blacklist.words(GUILD), vec!["bar", "foo"]);
    }

    #[tokio::test]
    async fn partial_duplicates_are_reported_as_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let blacklist = store(&dir).await;

        blacklist.add(GUILD, "foo").await.unwrap();
        let change = blacklist.add(GUILD, "foo baz baz").await.unwrap();

        assert_eq!(change.changed, vec!["baz"]);
        assert_eq!(change.skipped, vec!["foo"]);
    }

    #[tokio::test]
    async fn remove_rules() {
        let dir = tempfile::tempdir().unwrap();
        let blacklist = store(&dir).await;

        assert!(matches!(
            blacklist.remove(GUILD, "foo").await,
            Err(BlacklistError::Empty)
        ));

        blacklist.add(GUILD, "foo bar").await.unwrap();
        assert!(matches!(
            blacklist.remove(GUILD, "nope").await,
            Err(BlacklistError::NoneListed)
        ));

        let change = blacklist.remove(GUILD, "foo nope").await.unwrap();
        assert_eq!(change.changed, vec!["foo"]);
        assert_eq!(change.skipped, vec!["nope"]);
        assert_eq!(blacklist.words(GUILD), vec!["bar"]);
    }

    #[tokio::test]
    async fn clear_drops_the_guild_and_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let blacklist = store(&dir).await;
            blacklist.add(GUILD, "foo bar").await.unwrap();
            blacklist.add(GuildId::new(7), "baz").await.unwrap();
            assert_eq!(blacklist.clear(GUILD).await.unwrap(), 2);
            assert!(matches!(
                blacklist.clear(GUILD).await,
                Err(BlacklistError::Empty)
            ));
        }

        let reloaded = store(&dir).await;
        assert!(!reloaded.has_words(GUILD));
        assert_eq!(reloaded.words(GuildId::new(7)), vec!["baz"]);
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let blacklist = store(&dir).await;

        assert!(matches!(
            blacklist.add(GUILD, "   ").await,
            Err(BlacklistError::NoWords)
        ));
    }
}
