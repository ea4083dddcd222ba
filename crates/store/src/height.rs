use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{HeightCache, StoreError};

/// File name of the persisted height cache inside the data directory.
pub const HEIGHT_CACHE_FILE: &str = "last_processed_heights.json";

#[derive(Default)]
pub struct MemoryHeightCache {
    /// Height and expiry; `None` when the TTL runs past what `Instant` holds.
    inner: Mutex<HashMap<String, (u64, Option<Instant>)>>,
}

impl MemoryHeightCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HeightCache for MemoryHeightCache {
    async fn get(&self, network: &str) -> Result<Option<u64>, StoreError> {
        let mut guard = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        match guard.get(network).copied() {
            Some((height, expires)) if expires.map_or(true, |at| at > Instant::now()) => {
                Ok(Some(height))
            }
            Some(_) => {
                guard.remove(network);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, network: &str, height: u64, ttl: Duration) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        let expires = Instant::now().checked_add(ttl);
        guard.insert(network.to_string(), (height, expires));
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedHeight {
    height: u64,
    expires_at: DateTime<Utc>,
}

/// Height cache persisted as one JSON document, rewritten on every `set`.
pub struct FileHeightCache {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileHeightCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Cache file inside `datadir`.
    pub fn in_dir(datadir: &Path) -> Self {
        Self::new(datadir.join(HEIGHT_CACHE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, CachedHeight>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(map) => Ok(map),
                Err(e) => {
                    warn!(path = %self.path.display(), err = %e, "discarding unreadable height cache");
                    Ok(BTreeMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl HeightCache for FileHeightCache {
    async fn get(&self, network: &str) -> Result<Option<u64>, StoreError> {
        let _guard = self.lock.lock().await;
        let map = self.load().await?;
        Ok(map
            .get(network)
            .filter(|c| c.expires_at > Utc::now())
            .map(|c| c.height))
    }

    async fn set(&self, network: &str, height: u64, ttl: Duration) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut map = self.load().await?;
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        map.insert(network.to_string(), CachedHeight { height, expires_at });

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&map)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_roundtrip_and_expiry() {
        let cache = MemoryHeightCache::new();
        assert_eq!(cache.get("bbn").await.unwrap(), None);
        cache.set("bbn", 42, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("bbn").await.unwrap(), Some(42));

        cache.set("short", 7, Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_cache_accepts_unbounded_ttl() {
        let cache = MemoryHeightCache::new();
        cache.set("bbn", 9, Duration::MAX).await.unwrap();
        assert_eq!(cache.get("bbn").await.unwrap(), Some(9));
    }

    #[tokio::test]
    async fn test_file_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileHeightCache::in_dir(dir.path());
        assert_eq!(cache.get("bbn").await.unwrap(), None);
        cache.set("bbn", 1000, Duration::from_secs(3600)).await.unwrap();
        cache.set("other", 5, Duration::from_secs(3600)).await.unwrap();

        let reopened = FileHeightCache::in_dir(dir.path());
        assert_eq!(reopened.get("bbn").await.unwrap(), Some(1000));
        assert_eq!(reopened.get("other").await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_file_cache_ignores_expired_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileHeightCache::in_dir(dir.path());
        cache.set("bbn", 1, Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("bbn").await.unwrap(), None);

        tokio::fs::write(cache.path(), b"not json").await.unwrap();
        assert_eq!(cache.get("bbn").await.unwrap(), None);
        cache.set("bbn", 2, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("bbn").await.unwrap(), Some(2));
    }
}
