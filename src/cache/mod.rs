//! Fetch-through object cache.
//!
//! A [`Cacher`] stores typed values under string keys with a TTL and offers an
//! atomic-looking get-or-compute operation over any [`CacheBackend`]:
//! - Memory (in-process LRU)
//! - Disk (persistent, sled through `cached`)
//! - Redis (networked, bb8 pool)
//! - NoOp (caching disabled)
//!
//! Keys pass through a [`KeyTransform`] before they reach the backend, so
//! tenants can be namespaced and plaintext identifiers hashed away.
//!
//! # Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "memory"  # or "disk" or "redis"
//! default_ttl_seconds = 300
//!
//! [cache.keys]
//! prefix = "tenant-42:"
//! hash = "sha256"     # or "sha512" or "none"
//!
//! [cache.memory]
//! max_size = 1000
//!
//! [cache.disk]
//! directory = "cache"
//!
//! [cache.redis]
//! url = "redis://127.0.0.1:6379"
//! pool_size = 4
//! connection_timeout = 5
//! key_prefix = "cacher"
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let cacher = Cacher::from_config(&settings.cache, "sms_config").await?;
//! let ctx = CallContext::with_timeout(Duration::from_secs(2));
//!
//! let config: SmsConfig = cacher
//!     .fetch(&ctx, &realm_id.to_string(), cacher.default_ttl(), move || async move {
//!         db.find_sms_config(realm_id).await
//!     })
//!     .await?;
//! ```

mod cacher;
mod context;
mod disk;
mod error;
pub mod key;
mod manager;
mod memory;
mod noop;
mod redis;
mod traits;


pub use cacher::Cacher;
pub use context::CallContext;
pub use disk::DiskBackend;
pub use error::CacheError;
pub use key::{KeyPipeline, KeyTransform, compose, hash, identity, key_fn, prefix};
pub use manager::build_backend;
pub use memory::MemoryBackend;
pub use noop::NoOpBackend;
pub use self::redis::RedisBackend;
pub use traits::CacheBackend;
