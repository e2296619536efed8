//! # Storage
//!
//! Key-value document persistence used by the blacklist and reaction-role stores.
//!
//! Every collection is a single JSON file holding an object that maps a document
//! `_id` to the document itself. The file is loaded once when the collection is
//! opened and rewritten on every mutation (write to a temporary file, then rename),
//! so a crash mid-write never leaves a truncated collection behind.
//!
//! The [`DocumentStore`] trait is the seam for other backends: anything exposing
//! `find`, `upsert` and `delete` by id can stand in for [`JsonCollection`].

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::BTreeMap,
    path::PathBuf,
};
use thiserror::Error;
use tokio::{fs, sync::Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed document: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A document that can be stored in a collection, identified by its `_id`.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn id(&self) -> String;
}

#[async_trait]
pub trait DocumentStore<T: Document>: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<T>, StoreError>;

    /// Inserts the document, replacing any document with the same `_id`.
    async fn upsert(&self, doc: &T) -> Result<(), StoreError>;

    /// Returns whether a document was removed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    async fn all(&self) -> Result<Vec<T>, StoreError>;
}

/// JSON-file backed collection.
pub struct JsonCollection<T> {
    path: PathBuf,
    documents: Mutex<BTreeMap<String, T>>,
}

impl<T: Document> JsonCollection<T> {
    /// Opens (or creates) the collection stored at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let documents = match fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("📁 Creating new collection at {}", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        debug!(
            "📂 Loaded {} documents from {}",
            documents.len(),
            path.display()
        );

        Ok(Self {
            path,
            documents: Mutex::new(documents),
        })
    }

    async fn flush(&self, documents: &BTreeMap<String, T>) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(documents)?;
        let tmp = self.path.with_extension("json.tmp");

        fs::write(&tmp, content).await?;
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            warn!("Atomic rename failed for {}: {}", self.path.display(), e);
            return Err(e.into());
        }

        Ok(())
    }
}

#[async_trait]
impl<T: Document> DocumentStore<T> for JsonCollection<T> {
    async fn find(&self, id: &str) -> Result<Option<T>, StoreError> {
        Ok(self.documents.lock().await.get(id).cloned())
    }

    async fn upsert(&self, doc: &T) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().await;
        let mut next = documents.clone();
        next.insert(doc.id(), doc.clone());

        self.flush(&next).await?;
        *documents = next;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut documents = self.documents.lock().await;
        if !documents.contains_key(id) {
            return Ok(false);
        }

        let mut next = documents.clone();
        next.remove(id);

        self.flush(&next).await?;
        *documents = next;
        Ok(true)
    }

    async fn all(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.documents.lock().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        #[serde(rename = "_id")]
        id: String,
        body: String,
    }

    impl Document for Note {
        fn id(&self) -> String {
            self.id.clone()
        }
    }

    fn note(id: &str, body: &str) -> Note {
        Note {
            id: id.to_string(),
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");

        let notes = JsonCollection::<Note>::open(&path).await.unwrap();
        notes.upsert(&note("1", "first")).await.unwrap();
        notes.upsert(&note("1", "second")).await.unwrap();
        notes.upsert(&note("2", "other")).await.unwrap();

        let reopened = JsonCollection::<Note>::open(&path).await.unwrap();
        assert_eq!(reopened.find("1").await.unwrap(), Some(note("1", "second")));
        assert_eq!(reopened.all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_was_removed() {
        let dir = tempfile::tempdir().unwrap();
        let notes = JsonCollection::<Note>::open(dir.path().join("notes.json"))
            .await
            .unwrap();

        notes.upsert(&note("1", "x")).await.unwrap();
        assert!(notes.delete("1").await.unwrap());
        assert!(!notes.delete("1").await.unwrap());
        assert_eq!(notes.find("1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_file_opens_as_empty_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, "").unwrap();

        let notes = JsonCollection::<Note>::open(&path).await.unwrap();
        assert!(notes.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = JsonCollection::<Note>::open(&path).await;
        assert!(matches!(result, Err(StoreError::Serde(_))));
    }
}
