//! Configuration management for cacher
//!
//! Settings are loaded in layers (lowest priority first):
//! 1. `default.toml`
//! 2. `{environment}.toml`, picked by `CACHER_APP_ENV`
//! 3. `local.toml`, for untracked local overrides
//! 4. `CACHER_*` environment variables, `__` separating nested keys

pub mod environment;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use environment::Environment;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use settings::{
    CacheBackendKind, CacheConfig, DiskCacheConfig, KeyConfig, KeyHash, MemoryCacheConfig,
    RedisCacheConfig, Settings,
};
