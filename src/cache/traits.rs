//! CacheBackend trait definition.

use std::time::Duration;

use async_trait::async_trait;

use crate::cache::CacheError;

/// Storage boundary behind a [`Cacher`](crate::cache::Cacher).
///
/// Backends store opaque bytes under already-derived storage keys. They must
/// be safe to share across tasks without caller-side locking, and a `set`
/// must either land completely or not be observable at all.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Get the live value for a key, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store a value, replacing any existing entry, expiring after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Remove a value. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Release resources held by the backend and drop stale entries.
    async fn close(&self) -> Result<(), CacheError>;
}
