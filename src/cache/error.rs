//! Cache error types.

use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during cache operations.
///
/// The type is `Clone` so that every caller coalesced onto one in-flight
/// computation receives the same result.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// `fetch` was called without a compute function.
    #[error("missing fetch function")]
    MissingFetchFn,

    /// The requested TTL cannot bound an entry's lifetime.
    #[error("invalid ttl: entries must expire after a non-zero duration")]
    InvalidTtl,

    /// No live entry exists for the key.
    #[error("key not found")]
    NotFound,

    /// The cacher has been closed.
    #[error("cacher is stopped")]
    Stopped,

    /// The backend settings can't be used to build a store.
    #[error("Invalid cache configuration: {0}")]
    Config(String),

    #[error("Key transform failed: {0}")]
    KeyTransform(String),

    #[error("Cache operation failed: {0}")]
    Operation(String),

    #[error("Cache connection failed: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The caller's compute function failed. The original error is kept intact.
    #[error("{0}")]
    Compute(Arc<anyhow::Error>),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl CacheError {
    pub fn config(message: impl ToString) -> Self {
        Self::Config(message.to_string())
    }

    pub fn key_transform(message: impl Into<String>) -> Self {
        Self::KeyTransform(message.into())
    }

    pub fn operation(message: impl ToString) -> Self {
        Self::Operation(message.to_string())
    }

    pub fn connection(message: impl ToString) -> Self {
        Self::Connection(message.to_string())
    }

    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }

    /// Wrap a compute-function failure.
    pub fn compute(error: anyhow::Error) -> Self {
        Self::Compute(Arc::new(error))
    }

    /// A miss on `read`, which callers probing the cache should expect.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// The error returned by the compute function, if that is what failed.
    pub fn compute_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Compute(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        CacheError::Serialization(error.to_string())
    }
}
