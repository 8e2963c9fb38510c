//! Cacher
//!
//! Fetch-through object caching over memory, disk and Redis backends, with
//! composable key derivation and layered configuration.

pub mod cache;
pub mod config;
pub mod logger;

pub use cache::{CacheBackend, CacheError, CallContext, Cacher};
pub use config::{ConfigLoader, Settings};
