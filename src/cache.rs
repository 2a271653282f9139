//! Key/value cache for built index artifacts.
//!
//! The [`Cache`] trait is the only contract the index service relies on:
//! string keys, opaque JSON values. Two backends are provided:
//!
//! - [`InMemoryCache`]: lives as long as the process.
//! - [`FileCache`]: one JSON file per key under a directory, so artifacts
//!   survive between builds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// String-keyed store for JSON values.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Value stored under `key`, or `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Process-lifetime cache backed by a map.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Value>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Directory-backed cache.
///
/// Unreadable or corrupt entries are reported and treated as misses.
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Cache rooted at `dir`. The directory is created on the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that backs `key`.
    ///
    /// Keys are sanitised for the filesystem and suffixed with a short hash
    /// so distinct keys never share a file.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        self.dir.join(format!("{}-{}.json", safe, &hash[..12]))
    }
}

#[async_trait]
impl Cache for FileCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cache entry");
                return Ok(None);
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!(key, path = %path.display(), "Cache hit");
                Ok(Some(value))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt cache entry, ignoring");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create cache dir: {}", self.dir.display()))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(&value)?;
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("Failed to write cache entry: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move cache entry into place: {}", path.display()))?;
        debug!(key, path = %path.display(), "Cache entry stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_memory_get_set() {
        let cache = InMemoryCache::new();
        assert!(cache.get("k").await.unwrap().is_none());
        cache.set("k", json!({ "a": 1 })).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!({ "a": 1 })));
        cache.set("k", json!(2)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!(2)));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_file_cache_persists_across_instances() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("cache");
        FileCache::new(&dir)
            .set("SearchIndex < Site:fuse", json!({ "documents": [] }))
            .await
            .unwrap();

        let reopened = FileCache::new(&dir);
        assert_eq!(
            reopened.get("SearchIndex < Site:fuse").await.unwrap(),
            Some(json!({ "documents": [] }))
        );
        assert!(reopened.get("other").await.unwrap().is_none());
    }

    #[test]
    fn test_file_cache_paths_are_distinct_and_safe() {
        let cache = FileCache::new("/tmp/c");
        let a = cache.path_for("a/b:c");
        let b = cache.path_for("a_b_c");
        assert_ne!(a, b);
        let name = a.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("a_b_c-"));
        assert!(name.ends_with(".json"));
    }

    #[tokio::test]
    async fn test_file_cache_corrupt_entry_is_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path());
        std::fs::write(cache.path_for("k"), b"not json").unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }
}
