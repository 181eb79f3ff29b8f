//! Storage adapters for serialized column layouts.

use std::path::{Path, PathBuf};

use ahash::RandomState;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

/// Durable key/value store for layout blobs.
///
/// Values are the JSON text of a layout; adapters do not interpret them.
#[async_trait]
pub trait LayoutStorage: Send + Sync {
    /// Returns the blob stored under `key`, if any.
    async fn load(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Stores `blob` under `key`, replacing any previous value.
    async fn save(&self, key: &str, blob: &str) -> anyhow::Result<()>;

    /// Removes `key`. Clearing a missing key is not an error.
    async fn clear(&self, key: &str) -> anyhow::Result<()>;
}

/// In-process storage. Contents live as long as the value.
#[derive(Debug, Default)]
pub struct MemoryLayoutStorage {
    blobs: DashMap<String, String, RandomState>,
}

impl MemoryLayoutStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl LayoutStorage for MemoryLayoutStorage {
    async fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.blobs.get(key).map(|v| v.value().clone()))
    }

    async fn save(&self, key: &str, blob: &str) -> anyhow::Result<()> {
        self.blobs.insert(key.to_string(), blob.to_string());
        Ok(())
    }

    async fn clear(&self, key: &str) -> anyhow::Result<()> {
        self.blobs.remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a directory.
///
/// File names are the BLAKE3 hash of the key, so any key string is safe to
/// use. Writes go to a temporary file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileLayoutStorage {
    dir: PathBuf,
}

impl FileLayoutStorage {
    /// Uses `dir`, creating it on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name = blake3::hash(key.as_bytes()).to_hex();
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl LayoutStorage for FileLayoutStorage {
    async fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::Error::new(e).context(format!("reading layout `{key}`"))),
        }
    }

    async fn save(&self, key: &str, blob: &str) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, blob).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key, path = %path.display(), "layout written");
        Ok(())
    }

    async fn clear(&self, key: &str) -> anyhow::Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exercise(storage: &dyn LayoutStorage) {
        assert_eq!(storage.load("deposits").await.unwrap(), None);

        storage.save("deposits", r#"{"order":["a"]}"#).await.unwrap();
        storage.save("users", r#"{"order":["b"]}"#).await.unwrap();
        assert_eq!(
            storage.load("deposits").await.unwrap().as_deref(),
            Some(r#"{"order":["a"]}"#)
        );

        storage.save("deposits", r#"{"order":["c"]}"#).await.unwrap();
        assert_eq!(
            storage.load("deposits").await.unwrap().as_deref(),
            Some(r#"{"order":["c"]}"#)
        );

        storage.clear("deposits").await.unwrap();
        storage.clear("deposits").await.unwrap();
        assert_eq!(storage.load("deposits").await.unwrap(), None);
        assert!(storage.load("users").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn memory_storage_round_trips() {
        let storage = MemoryLayoutStorage::new();
        exercise(&storage).await;
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn file_storage_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileLayoutStorage::new(dir.path().join("layouts"));
        exercise(&storage).await;

        let files: Vec<_> = std::fs::read_dir(storage.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(files.len(), 1, "no temporary files left behind");
    }

    #[tokio::test]
    async fn file_names_do_not_leak_key_text() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileLayoutStorage::new(dir.path());
        storage.save("../escape/me", "{}").await.unwrap();

        let path = storage.path_for("../escape/me");
        assert_eq!(path.parent(), Some(dir.path()));
        assert!(path.exists());
    }
}
