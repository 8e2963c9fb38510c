//! Disk backend with per-entry TTL support.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use cached::IOCached;
use cached::stores::DiskCache as CachedDiskCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::cache::{CacheBackend, CacheError};
use crate::config::settings::DiskCacheConfig;

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at_ms: u64, // Unix timestamp in milliseconds
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        now_ms() >= self.expires_at_ms
    }
}

/// Disk-based store with per-entry TTL, persisted through sled.
pub struct DiskBackend {
    store: Mutex<CachedDiskCache<String, Vec<u8>>>,
}

impl DiskBackend {
    pub fn new(config: &DiskCacheConfig, cache_name: &str) -> Result<Self, CacheError> {
        // The store-wide lifespan is only a ceiling, expiry is tracked per entry
        let store = CachedDiskCache::new(cache_name)
            .set_disk_directory(&config.directory)
            .set_lifespan(Duration::from_secs(86400 * 365))
            .build()
            .map_err(CacheError::connection)?;
        Ok(Self {
            store: Mutex::new(store),
        })
    }
}

#[async_trait]
impl CacheBackend for DiskBackend {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let key_string = key.to_string();
        let store = self.store.lock().await;

        let bytes = store
            .cache_get(&key_string)
            .map_err(CacheError::operation)?;

        if let Some(bytes) = bytes {
            let entry: CacheEntry = serde_json::from_slice(&bytes)?;
            if !entry.is_expired() {
                return Ok(Some(entry.value));
            }
            store
                .cache_remove(&key_string)
                .map_err(CacheError::operation)?;
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let entry = CacheEntry {
            value,
            expires_at_ms: now_ms().saturating_add(ttl.as_millis() as u64),
        };
        let bytes = serde_json::to_vec(&entry)?;

        let store = self.store.lock().await;
        store
            .cache_set(key.to_string(), bytes)
            .map_err(CacheError::operation)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let key_string = key.to_string();
        let store = self.store.lock().await;
        store
            .cache_remove(&key_string)
            .map_err(CacheError::operation)?;
        Ok(())
    }

    /// Drop expired entries, then flush what remains to disk.
    async fn close(&self) -> Result<(), CacheError> {
        let store = self.store.lock().await;
        let purged = purge_expired(&store)?;
        if purged > 0 {
            debug!(purged, "removed expired disk cache entries");
        }
        store
            .connection()
            .flush()
            .map_err(CacheError::operation)?;
        Ok(())
    }
}

/// Remove every entry whose envelope has expired or can't be decoded.
fn purge_expired(store: &CachedDiskCache<String, Vec<u8>>) -> Result<usize, CacheError> {
    let keys = store
        .connection()
        .iter()
        .keys()
        .collect::<Result<Vec<_>, _>>()
        .map_err(CacheError::operation)?;

    let mut purged = 0;
    for raw in keys {
        let Ok(key) = String::from_utf8(raw.to_vec()) else {
            continue;
        };
        let stale = match store.cache_get(&key).map_err(CacheError::operation)? {
            Some(bytes) => serde_json::from_slice::<CacheEntry>(&bytes)
                .map(|entry| entry.is_expired())
                .unwrap_or(true),
            None => false,
        };
        if stale {
            store.cache_remove(&key).map_err(CacheError::operation)?;
            purged += 1;
        }
    }
    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> DiskCacheConfig {
        DiskCacheConfig {
            directory: dir.path().to_str().unwrap().to_string(),
        }
    }

    #[tokio::test]
    async fn test_get_set() {
        let dir = TempDir::new().unwrap();
        let cache = DiskBackend::new(&test_config(&dir), "test_get_set").unwrap();
        cache
            .set("key", b"value".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("key").await.unwrap(), Some(b"value".to_vec()));
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = TempDir::new().unwrap();
        let cache = DiskBackend::new(&test_config(&dir), "test_remove").unwrap();
        cache
            .set("key", b"value".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.remove("key").await.unwrap();
        cache.remove("key").await.unwrap();
        assert_eq!(cache.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let dir = TempDir::new().unwrap();
        let cache = DiskBackend::new(&test_config(&dir), "test_ttl").unwrap();
        cache
            .set("key", b"value".to_vec(), Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(cache.get("key").await.unwrap(), Some(b"value".to_vec()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_flushes() {
        let dir = TempDir::new().unwrap();
        let cache = DiskBackend::new(&test_config(&dir), "test_close").unwrap();
        cache
            .set("key", b"value".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_purges_expired_entries() {
        let dir = TempDir::new().unwrap();
        let cache = DiskBackend::new(&test_config(&dir), "test_purge").unwrap();
        cache
            .set("stale", b"old".to_vec(), Duration::from_millis(20))
            .await
            .unwrap();
        cache
            .set("fresh", b"new".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        cache.close().await.unwrap();

        let store = cache.store.lock().await;
        assert_eq!(store.connection().len(), 1);
        drop(store);
        assert_eq!(cache.get("fresh").await.unwrap(), Some(b"new".to_vec()));
    }
}
