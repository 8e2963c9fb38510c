//! Memory backend using cached::SizedCache with per-entry expiry.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cached::{Cached, SizedCache};

use crate::cache::{CacheBackend, CacheError};
use crate::config::settings::MemoryCacheConfig;

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process LRU store bounded by entry count.
///
/// Expired entries are dropped the next time they are read; the least
/// recently used entry is evicted once `max_size` is reached.
pub struct MemoryBackend {
    store: Mutex<SizedCache<String, CacheEntry>>,
}

impl MemoryBackend {
    /// # Panics
    ///
    /// If `config.max_size` is zero. [`build_backend`](crate::cache::build_backend)
    /// validates the size first.
    pub fn new(config: &MemoryCacheConfig) -> Self {
        Self {
            store: Mutex::new(SizedCache::with_size(config.max_size)),
        }
    }

    /// Number of entries held, expired or not.
    pub fn len(&self) -> usize {
        self.store.lock().map(|s| s.cache_size()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut store = self.store.lock().map_err(CacheError::operation)?;

        let expired = match store.cache_get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(Instant::now()) => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
        };

        if expired {
            store.cache_remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut store = self.store.lock().map_err(CacheError::operation)?;
        store.cache_set(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut store = self.store.lock().map_err(CacheError::operation)?;
        store.cache_remove(key);
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        let mut store = self.store.lock().map_err(CacheError::operation)?;
        store.cache_clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(max_size: usize) -> MemoryCacheConfig {
        MemoryCacheConfig { max_size }
    }

    #[tokio::test]
    async fn test_get_set() {
        let cache = MemoryBackend::new(&test_config(10));
        cache
            .set("key", b"value".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("key").await.unwrap(), Some(b"value".to_vec()));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let cache = MemoryBackend::new(&test_config(10));
        cache
            .set("key", b"value".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.remove("key").await.unwrap();
        cache.remove("key").await.unwrap();
        assert_eq!(cache.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_per_entry_ttl() {
        let cache = MemoryBackend::new(&test_config(10));
        cache
            .set("short", b"a".to_vec(), Duration::from_millis(30))
            .await
            .unwrap();
        cache
            .set("long", b"b".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(cache.get("short").await.unwrap(), None);
        assert_eq!(cache.get("long").await.unwrap(), Some(b"b".to_vec()));
        // the expired entry is dropped on read
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = MemoryBackend::new(&test_config(2));
        let ttl = Duration::from_secs(60);
        cache.set("k1", b"v1".to_vec(), ttl).await.unwrap();
        cache.set("k2", b"v2".to_vec(), ttl).await.unwrap();
        cache.set("k3", b"v3".to_vec(), ttl).await.unwrap();

        assert_eq!(cache.get("k1").await.unwrap(), None);
        assert_eq!(cache.get("k3").await.unwrap(), Some(b"v3".to_vec()));
    }

    #[tokio::test]
    async fn test_close_clears_entries() {
        let cache = MemoryBackend::new(&test_config(10));
        cache
            .set("key", b"value".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.close().await.unwrap();
        assert!(cache.is_empty());
    }
}
