//! Redis backend using a bb8 connection pool.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bb8::Pool;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError};

use crate::cache::{CacheBackend, CacheError};
use crate::config::settings::RedisCacheConfig;

type RedisPool = Pool<Client>;

/// Redis-based store with a bb8 connection pool.
///
/// Entries are written with `PSETEX`, so expiry is enforced by the server with
/// millisecond resolution.
pub struct RedisBackend {
    pool: RwLock<Option<RedisPool>>,
    key_prefix: String,
}

impl RedisBackend {
    pub async fn new(config: &RedisCacheConfig, cache_name: &str) -> Result<Self, CacheError> {
        if config.pool_size == 0 {
            return Err(CacheError::config("redis pool_size must be greater than 0"));
        }
        let client = Client::open(config.url.as_str()).map_err(CacheError::connection)?;

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(Duration::from_secs(config.connection_timeout))
            .build(client)
            .await
            .map_err(CacheError::connection)?;

        Ok(Self {
            pool: RwLock::new(Some(pool)),
            key_prefix: format!("{}:{}", config.key_prefix, cache_name),
        })
    }

    fn prefixed_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    /// A handle to the pool, or `Stopped` once the backend is closed.
    fn pool(&self) -> Result<RedisPool, CacheError> {
        self.pool
            .read()
            .map_err(CacheError::operation)?
            .clone()
            .ok_or(CacheError::Stopped)
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let pool = self.pool()?;
        let mut conn = pool.get().await.map_err(CacheError::connection)?;
        let prefixed = self.prefixed_key(key);

        let conn_ref: &mut MultiplexedConnection = &mut conn;
        conn_ref
            .get(&prefixed)
            .await
            .map_err(|e: RedisError| CacheError::operation(e))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let pool = self.pool()?;
        let mut conn = pool.get().await.map_err(CacheError::connection)?;
        let prefixed = self.prefixed_key(key);
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let conn_ref: &mut MultiplexedConnection = &mut conn;
        conn_ref
            .pset_ex::<_, _, ()>(&prefixed, value, ttl_ms)
            .await
            .map_err(CacheError::operation)
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let pool = self.pool()?;
        let mut conn = pool.get().await.map_err(CacheError::connection)?;
        let prefixed = self.prefixed_key(key);

        let conn_ref: &mut MultiplexedConnection = &mut conn;
        conn_ref
            .del::<_, ()>(&prefixed)
            .await
            .map_err(CacheError::operation)
    }

    /// Drop the pool. Connections already checked out finish their command;
    /// no new ones are handed out.
    async fn close(&self) -> Result<(), CacheError> {
        let pool = self
            .pool
            .write()
            .map_err(CacheError::operation)?
            .take();
        match pool {
            Some(_) => Ok(()),
            None => Err(CacheError::Stopped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Option<RedisCacheConfig> {
        let url = std::env::var("CACHER_TEST_REDIS_URL").ok()?;
        Some(RedisCacheConfig {
            url,
            ..RedisCacheConfig::default()
        })
    }

    #[tokio::test]
    async fn test_zero_pool_size_rejected() {
        let config = RedisCacheConfig {
            pool_size: 0,
            ..RedisCacheConfig::default()
        };
        let err = RedisBackend::new(&config, "zero").await.err().unwrap();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[tokio::test]
    #[ignore = "requires a redis server at CACHER_TEST_REDIS_URL"]
    async fn test_get_set_remove() {
        let Some(config) = test_config() else { return };
        let cache = RedisBackend::new(&config, "test_get_set_remove").await.unwrap();

        cache
            .set("key", b"value".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("key").await.unwrap(), Some(b"value".to_vec()));

        cache.remove("key").await.unwrap();
        cache.remove("key").await.unwrap();
        assert_eq!(cache.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore = "requires a redis server at CACHER_TEST_REDIS_URL"]
    async fn test_ttl_expiration() {
        let Some(config) = test_config() else { return };
        let cache = RedisBackend::new(&config, "test_ttl").await.unwrap();

        cache
            .set("key", b"value".to_vec(), Duration::from_millis(100))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(cache.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore = "requires a redis server at CACHER_TEST_REDIS_URL"]
    async fn test_close_releases_pool() {
        let Some(config) = test_config() else { return };
        let cache = RedisBackend::new(&config, "test_close").await.unwrap();

        cache.close().await.unwrap();
        assert!(matches!(cache.get("key").await, Err(CacheError::Stopped)));
        assert!(matches!(cache.close().await, Err(CacheError::Stopped)));
    }
}
