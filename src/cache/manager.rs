//! Builds a cacher from configuration.

use std::sync::Arc;

use tracing::info;

use crate::cache::disk::DiskBackend;
use crate::cache::key::KeyPipeline;
use crate::cache::memory::MemoryBackend;
use crate::cache::noop::NoOpBackend;
use crate::cache::redis::RedisBackend;
use crate::cache::{CacheBackend, CacheError, Cacher};
use crate::config::settings::{CacheBackendKind, CacheConfig};

/// Create the backend selected by `config`.
///
/// `config` is validated first, so settings built in code get the same
/// checks as loaded ones. When caching is disabled a [`NoOpBackend`] is
/// returned. `cache_name` namespaces the disk tree and Redis keys.
pub async fn build_backend(
    config: &CacheConfig,
    cache_name: &str,
) -> Result<Arc<dyn CacheBackend>, CacheError> {
    config.validate().map_err(CacheError::config)?;

    if !config.enabled {
        return Ok(Arc::new(NoOpBackend::new()));
    }

    let backend: Arc<dyn CacheBackend> = match config.backend {
        CacheBackendKind::Memory => Arc::new(MemoryBackend::new(&config.memory)),
        CacheBackendKind::Disk => Arc::new(DiskBackend::new(&config.disk, cache_name)?),
        CacheBackendKind::Redis => Arc::new(RedisBackend::new(&config.redis, cache_name).await?),
    };
    Ok(backend)
}

impl Cacher {
    /// Create a cacher with the backend, key pipeline and default TTL from
    /// `config`.
    pub async fn from_config(config: &CacheConfig, cache_name: &str) -> Result<Self, CacheError> {
        let backend = build_backend(config, cache_name).await?;
        let keys = KeyPipeline::from_config(&config.keys);

        info!(
            cache = cache_name,
            backend = backend.name(),
            key_steps = keys.len(),
            "cacher initialized"
        );

        Ok(Cacher::from_parts(backend, Arc::new(keys)).with_default_ttl(config.default_ttl()))
    }
}
