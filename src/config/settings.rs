//! Settings tree deserialized from the layered configuration sources.
//!
//! Every section implements `Default` and is marked `#[serde(default)]`, so a
//! file only needs the values it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logger::LoggerConfig;

/// Which store backs the cacher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Disk,
    Redis,
}

/// Digest applied to keys before storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyHash {
    #[default]
    None,
    Sha256,
    Sha512,
}

/// Key derivation: the prefix is applied first, then the digest, so a
/// tenant prefix is folded into the hashed key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KeyConfig {
    pub prefix: String,
    pub hash: KeyHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryCacheConfig {
    /// LRU capacity in entries
    pub max_size: usize,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self { max_size: 1000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskCacheConfig {
    /// Root directory; each named cache gets its own tree below it
    pub directory: String,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            directory: "cache".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisCacheConfig {
    pub url: String,
    pub pool_size: u32,
    /// Seconds to wait for a pooled connection
    pub connection_timeout: u64,
    /// Stored keys look like `{key_prefix}:{cache_name}:{key}`
    pub key_prefix: String,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".into(),
            pool_size: 4,
            connection_timeout: 5,
            key_prefix: "cacher".into(),
        }
    }
}

/// The `[cache]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false every cacher gets a no-op backend
    pub enabled: bool,
    pub backend: CacheBackendKind,
    /// TTL for callers that don't pick their own
    pub default_ttl_seconds: u64,
    pub keys: KeyConfig,
    pub memory: MemoryCacheConfig,
    pub disk: DiskCacheConfig,
    pub redis: RedisCacheConfig,
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackendKind::Memory,
            default_ttl_seconds: 300,
            keys: KeyConfig::default(),
            memory: MemoryCacheConfig::default(),
            disk: DiskCacheConfig::default(),
            redis: RedisCacheConfig::default(),
        }
    }
}

/// Root of the configuration tree
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub logger: LoggerConfig,
    pub cache: CacheConfig,
}
