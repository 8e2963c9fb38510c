//! Fetch-through cacher over a pluggable backend.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use crate::cache::key::{Identity, KeyTransform};
use crate::cache::{CacheBackend, CacheError, CallContext};

/// Default TTL for a cacher built without configuration.
const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// A computation shared by every `fetch` waiting on the same storage key.
type Flight = Shared<BoxFuture<'static, Result<Vec<u8>, CacheError>>>;

struct Inner {
    backend: Arc<dyn CacheBackend>,
    keys: Arc<dyn KeyTransform>,
    closed: AtomicBool,
    flights: DashMap<String, Flight>,
}

/// Removes a flight from the table when its task ends, even by panic.
struct FlightGuard {
    inner: Arc<Inner>,
    key: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.inner.flights.remove(&self.key);
    }
}

/// Typed get-or-compute cache over a [`CacheBackend`].
///
/// Values are stored as JSON. Logical keys pass through a [`KeyTransform`]
/// before reaching the backend. Cloning is cheap and clones share state,
/// including the open/closed flag.
///
/// Concurrent `fetch` calls that miss on the same storage key are coalesced:
/// the compute function runs once and every caller receives its result.
#[derive(Clone)]
pub struct Cacher {
    inner: Arc<Inner>,
    default_ttl: Duration,
}

impl Cacher {
    /// A cacher storing logical keys unchanged.
    pub fn new(backend: impl CacheBackend + 'static) -> Self {
        Self::with_key_transform(backend, Identity)
    }

    pub fn with_key_transform(
        backend: impl CacheBackend + 'static,
        keys: impl KeyTransform + 'static,
    ) -> Self {
        Self::from_parts(Arc::new(backend), Arc::new(keys))
    }

    pub(crate) fn from_parts(backend: Arc<dyn CacheBackend>, keys: Arc<dyn KeyTransform>) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                keys,
                closed: AtomicBool::new(false),
                flights: DashMap::new(),
            }),
            default_ttl: DEFAULT_TTL,
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// TTL from configuration, for callers that don't pick their own.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.backend.name()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of computations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.flights.len()
    }

    /// The key a logical key is stored under.
    pub fn storage_key(&self, key: &str) -> Result<String, CacheError> {
        self.inner.keys.transform(key)
    }

    /// Get the value for `key`, computing and storing it on a miss.
    ///
    /// On a miss `fetch_fn` runs on a spawned task, so it keeps running (and
    /// its value is stored) even if every caller gives up waiting. A failing
    /// `fetch_fn` is returned as [`CacheError::Compute`] and nothing is
    /// written.
    pub async fn fetch<T, F, Fut>(
        &self,
        ctx: &CallContext,
        key: &str,
        ttl: Duration,
        fetch_fn: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.fetch_with(ctx, key, ttl, Some(fetch_fn)).await
    }

    /// [`fetch`](Self::fetch) with an optional compute function.
    ///
    /// `None` fails with [`CacheError::MissingFetchFn`] without touching the
    /// backend; it never degrades to a plain read. With `None` nothing pins
    /// the function type, so name it with a turbofish:
    ///
    /// ```ignore
    /// type NoFetch = fn() -> std::future::Ready<anyhow::Result<String>>;
    ///
    /// let result = cacher
    ///     .fetch_with::<String, NoFetch, _>(&ctx, "greeting", ttl, None)
    ///     .await;
    /// assert!(matches!(result, Err(CacheError::MissingFetchFn)));
    /// ```
    pub async fn fetch_with<T, F, Fut>(
        &self,
        ctx: &CallContext,
        key: &str,
        ttl: Duration,
        fetch_fn: Option<F>,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.ensure_open()?;
        let fetch_fn = fetch_fn.ok_or(CacheError::MissingFetchFn)?;
        validate_ttl(ttl)?;
        let storage_key = self.storage_key(key)?;

        if let Some(bytes) = ctx.run(self.inner.backend.get(&storage_key)).await? {
            trace!(key = %storage_key, "cache hit");
            return decode(&bytes);
        }

        let flight = self.join_flight(storage_key, ttl, fetch_fn);
        let bytes = ctx.run(flight).await?;
        decode(&bytes)
    }

    /// Get the value for `key`, or [`CacheError::NotFound`].
    pub async fn read<T>(&self, ctx: &CallContext, key: &str) -> Result<T, CacheError>
    where
        T: DeserializeOwned,
    {
        self.ensure_open()?;
        let storage_key = self.storage_key(key)?;

        match ctx.run(self.inner.backend.get(&storage_key)).await? {
            Some(bytes) => decode(&bytes),
            None => Err(CacheError::NotFound),
        }
    }

    /// Store `value` under `key`, replacing any existing entry.
    pub async fn write<T>(
        &self,
        ctx: &CallContext,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        self.ensure_open()?;
        validate_ttl(ttl)?;
        let storage_key = self.storage_key(key)?;
        let bytes = serde_json::to_vec(value)?;

        ctx.run(self.inner.backend.set(&storage_key, bytes, ttl))
            .await
    }

    /// Remove `key`. Removing an absent key succeeds.
    pub async fn delete(&self, ctx: &CallContext, key: &str) -> Result<(), CacheError> {
        self.ensure_open()?;
        let storage_key = self.storage_key(key)?;

        ctx.run(self.inner.backend.remove(&storage_key)).await
    }

    /// Close the cacher and release the backend.
    ///
    /// Only the first call reaches the backend; later calls return
    /// [`CacheError::Stopped`]. Computations still in flight finish but don't
    /// write their results.
    pub async fn close(&self) -> Result<(), CacheError> {
        self.inner
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CacheError::Stopped)?;

        debug!(backend = self.backend_name(), "closing cacher");
        self.inner.backend.close().await.inspect_err(|e| {
            warn!(backend = self.backend_name(), error = %e, "backend cleanup failed");
        })
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.is_closed() {
            return Err(CacheError::Stopped);
        }
        Ok(())
    }

    /// Attach to the computation for `storage_key`, starting it if none runs.
    fn join_flight<T, F, Fut>(&self, storage_key: String, ttl: Duration, fetch_fn: F) -> Flight
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        match self.inner.flights.entry(storage_key) {
            Entry::Occupied(entry) => {
                trace!(key = %entry.key(), "joining in-flight computation");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                trace!(key = %entry.key(), "cache miss");
                debug!(backend = self.backend_name(), "computing missing value");
                // The task's guard can't remove the entry before it is
                // inserted: the vacant entry holds the shard lock until then.
                let guard = FlightGuard {
                    inner: Arc::clone(&self.inner),
                    key: entry.key().clone(),
                };
                let task = tokio::spawn(async move {
                    let result = compute_and_store(&guard.inner, &guard.key, ttl, fetch_fn).await;
                    drop(guard);
                    result
                });

                let flight = task
                    .map(|joined| {
                        joined.unwrap_or_else(|e| {
                            Err(CacheError::operation(format!("fetch task failed: {}", e)))
                        })
                    })
                    .boxed()
                    .shared();
                entry.insert(flight.clone());
                flight
            }
        }
    }
}

/// Runs on the flight's own task, outside any caller's context.
async fn compute_and_store<T, F, Fut>(
    inner: &Inner,
    key: &str,
    ttl: Duration,
    fetch_fn: F,
) -> Result<Vec<u8>, CacheError>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    if inner.closed.load(Ordering::Acquire) {
        return Err(CacheError::Stopped);
    }
    // a flight that just finished may have stored the value already
    if let Some(bytes) = inner.backend.get(key).await? {
        return Ok(bytes);
    }

    let value = fetch_fn().await.map_err(CacheError::compute)?;
    let bytes = serde_json::to_vec(&value)?;

    if inner.closed.load(Ordering::Acquire) {
        return Err(CacheError::Stopped);
    }
    inner.backend.set(key, bytes.clone(), ttl).await?;

    // close may have cleaned up the backend while the write was in progress
    if inner.closed.load(Ordering::Acquire) {
        if let Err(e) = inner.backend.remove(key).await {
            trace!(key = %key, error = %e, "could not undo write after close");
        }
        return Err(CacheError::Stopped);
    }
    Ok(bytes)
}

fn validate_ttl(ttl: Duration) -> Result<(), CacheError> {
    if ttl.is_zero() {
        return Err(CacheError::InvalidTtl);
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CacheError> {
    Ok(serde_json::from_slice(bytes)?)
}

impl fmt::Debug for Cacher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cacher")
            .field("backend", &self.backend_name())
            .field("default_ttl", &self.default_ttl)
            .field("closed", &self.is_closed())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
