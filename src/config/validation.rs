//! Configuration validation logic
//!
//! Checks values the type system can't: non-zero sizes and durations,
//! URL schemes, and the logger level.

use crate::config::error::ConfigError;
use crate::config::settings::{
    CacheBackendKind, CacheConfig, DiskCacheConfig, MemoryCacheConfig, RedisCacheConfig, Settings,
};

/// Accepted Redis URL schemes
const REDIS_SCHEMES: &[&str] = &["redis://", "rediss://", "redis+unix://", "unix://"];

impl MemoryCacheConfig {
    /// # Validation Rules
    /// - `max_size` must be greater than 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::validation(
                "cache.memory.max_size",
                "Memory cache must hold at least one entry.",
            ));
        }
        Ok(())
    }
}

impl DiskCacheConfig {
    /// # Validation Rules
    /// - `directory` must not be empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.trim().is_empty() {
            return Err(ConfigError::validation(
                "cache.disk.directory",
                "Disk cache directory is required.",
            ));
        }
        Ok(())
    }
}

impl RedisCacheConfig {
    /// # Validation Rules
    /// - `url` must use a Redis scheme
    /// - `pool_size` and `connection_timeout` must be greater than 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !REDIS_SCHEMES.iter().any(|s| self.url.starts_with(s)) {
            return Err(ConfigError::validation(
                "cache.redis.url",
                "Invalid Redis URL. Expected format: redis://[user:password@]host[:port][/db]",
            ));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::validation(
                "cache.redis.pool_size",
                "Redis pool size must be greater than 0.",
            ));
        }
        if self.connection_timeout == 0 {
            return Err(ConfigError::validation(
                "cache.redis.connection_timeout",
                "Redis connection timeout must be greater than 0 seconds.",
            ));
        }
        Ok(())
    }
}

impl CacheConfig {
    /// Validate the shared settings and the selected backend's section.
    ///
    /// Sections for backends that aren't selected are not checked.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_ttl_seconds == 0 {
            return Err(ConfigError::validation(
                "cache.default_ttl_seconds",
                "Default TTL must be greater than 0 seconds.",
            ));
        }
        if !self.enabled {
            return Ok(());
        }
        match self.backend {
            CacheBackendKind::Memory => self.memory.validate(),
            CacheBackendKind::Disk => self.disk.validate(),
            CacheBackendKind::Redis => self.redis.validate(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logger
            .validate()
            .map_err(|e| ConfigError::validation("logger.level", e.to_string()))?;
        self.cache.validate()
    }
}
