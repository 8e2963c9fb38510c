//! Key transforms applied to logical keys before they reach a backend.
//!
//! Transforms keep plaintext identifiers (API keys, emails, tokens) out of the
//! backing store and namespace keys in multi-tenant deployments. They compose
//! in order, so prefixing before hashing folds the namespace into the digest:
//!
//! ```ignore
//! use sha2::Sha256;
//!
//! let keys = compose(vec![
//!     Arc::new(prefix("tenant-42:")),
//!     Arc::new(hash(Sha256::default)),
//! ]);
//! let storage_key = keys.transform("api-key-value")?;
//! ```

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use sha2::digest::FixedOutput;
use sha2::{Sha256, Sha512};

use crate::cache::CacheError;
use crate::config::settings::{KeyConfig, KeyHash};

/// Maps a logical key to the key used for storage.
///
/// Implementations must be deterministic: the same input always yields the
/// same output for a given instance.
pub trait KeyTransform: Send + Sync {
    fn transform(&self, key: &str) -> Result<String, CacheError>;
}

impl<T: KeyTransform + ?Sized> KeyTransform for Arc<T> {
    fn transform(&self, key: &str) -> Result<String, CacheError> {
        (**self).transform(key)
    }
}

impl<T: KeyTransform + ?Sized> KeyTransform for Box<T> {
    fn transform(&self, key: &str) -> Result<String, CacheError> {
        (**self).transform(key)
    }
}

/// Passes keys through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl KeyTransform for Identity {
    fn transform(&self, key: &str) -> Result<String, CacheError> {
        Ok(key.to_string())
    }
}

/// Prepends a constant namespace.
#[derive(Debug, Clone)]
pub struct Prefix {
    prefix: String,
}

impl KeyTransform for Prefix {
    fn transform(&self, key: &str) -> Result<String, CacheError> {
        if self.prefix.is_empty() {
            return Ok(key.to_string());
        }
        Ok(format!("{}{}", self.prefix, key))
    }
}

/// Replaces the key with the lowercase hex digest of its bytes.
///
/// `new_hasher` builds a fresh hasher per key. Anything that accepts bytes
/// through [`std::io::Write`] and finishes into a fixed-size digest works,
/// including keyed MACs such as `Hmac<Sha256>`.
#[derive(Clone)]
pub struct HashKey<F> {
    new_hasher: F,
}

impl<F, H> KeyTransform for HashKey<F>
where
    F: Fn() -> H + Send + Sync,
    H: Write + FixedOutput,
{
    fn transform(&self, key: &str) -> Result<String, CacheError> {
        let mut hasher = (self.new_hasher)();
        let written = hasher
            .write(key.as_bytes())
            .map_err(|e| CacheError::key_transform(e.to_string()))?;
        if written < key.len() {
            return Err(CacheError::key_transform(format!(
                "only hashed {} of {} bytes",
                written,
                key.len()
            )));
        }
        Ok(hex::encode(hasher.finalize_fixed()))
    }
}

impl<F> fmt::Debug for HashKey<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashKey").finish_non_exhaustive()
    }
}

/// Adapts a closure into a [`KeyTransform`].
#[derive(Clone)]
pub struct FnKey<F> {
    f: F,
}

impl<F> KeyTransform for FnKey<F>
where
    F: Fn(&str) -> Result<String, CacheError> + Send + Sync,
{
    fn transform(&self, key: &str) -> Result<String, CacheError> {
        (self.f)(key)
    }
}

/// An ordered sequence of transforms applied one after another.
///
/// The output of step `i` is the input of step `i + 1`. The first failing
/// step aborts the pipeline and no later step runs. An empty pipeline is the
/// identity.
#[derive(Clone, Default)]
pub struct KeyPipeline {
    steps: Vec<Arc<dyn KeyTransform>>,
}

impl KeyPipeline {
    pub fn new(steps: Vec<Arc<dyn KeyTransform>>) -> Self {
        Self { steps }
    }

    /// Append a step to the end of the pipeline.
    pub fn then(mut self, step: impl KeyTransform + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Build the pipeline described by the `[cache.keys]` configuration:
    /// the prefix first, then the digest.
    pub fn from_config(config: &KeyConfig) -> Self {
        let mut pipeline = Self::default();
        if !config.prefix.is_empty() {
            pipeline = pipeline.then(prefix(config.prefix.clone()));
        }
        match config.hash {
            KeyHash::None => pipeline,
            KeyHash::Sha256 => pipeline.then(hash(Sha256::default)),
            KeyHash::Sha512 => pipeline.then(hash(Sha512::default)),
        }
    }
}

impl KeyTransform for KeyPipeline {
    fn transform(&self, key: &str) -> Result<String, CacheError> {
        let mut current = key.to_string();
        for step in &self.steps {
            current = step.transform(&current)?;
        }
        Ok(current)
    }
}

impl fmt::Debug for KeyPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPipeline")
            .field("steps", &self.steps.len())
            .finish()
    }
}

/// Compose transforms into a single pipeline, applied in order.
pub fn compose(steps: Vec<Arc<dyn KeyTransform>>) -> KeyPipeline {
    KeyPipeline::new(steps)
}

/// Prefix every key with `prefix`. An empty prefix leaves keys untouched.
pub fn prefix(prefix: impl Into<String>) -> Prefix {
    Prefix {
        prefix: prefix.into(),
    }
}

/// Hash every key with a hasher built by `new_hasher`.
pub fn hash<F, H>(new_hasher: F) -> HashKey<F>
where
    F: Fn() -> H + Send + Sync,
    H: Write + FixedOutput,
{
    HashKey { new_hasher }
}

pub fn identity() -> Identity {
    Identity
}

pub fn key_fn<F>(f: F) -> FnKey<F>
where
    F: Fn(&str) -> Result<String, CacheError> + Send + Sync,
{
    FnKey { f }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use hmac::{Hmac, Mac};
    use proptest::prelude::*;
    use sha2::Digest;
    use sha2::digest::consts::U4;
    use sha2::digest::{Output, OutputSizeUser, Update};

    use super::*;

    fn sha256_hex(input: &str) -> String {
        hex::encode(Sha256::digest(input.as_bytes()))
    }

    /// A hasher that only ever accepts one byte per write.
    struct Stingy;

    impl Write for Stingy {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len().min(1))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Update for Stingy {
        fn update(&mut self, _data: &[u8]) {}
    }

    impl OutputSizeUser for Stingy {
        type OutputSize = U4;
    }

    impl FixedOutput for Stingy {
        fn finalize_into(self, out: &mut Output<Self>) {
            out.copy_from_slice(&[0, 0, 0, 0]);
        }
    }

    #[test]
    fn test_prefix_then_hash() {
        let keys = compose(vec![Arc::new(prefix("t:")), Arc::new(hash(Sha256::new))]);
        assert_eq!(keys.transform("abc").unwrap(), sha256_hex("t:abc"));
    }

    #[test]
    fn test_hash_then_prefix() {
        let keys = compose(vec![Arc::new(hash(Sha256::new)), Arc::new(prefix("t:"))]);
        assert_eq!(
            keys.transform("abc").unwrap(),
            format!("t:{}", sha256_hex("abc"))
        );
    }

    #[test]
    fn test_empty_prefix_is_noop() {
        assert_eq!(prefix("").transform("abc").unwrap(), "abc");
        assert_eq!(prefix("ns:").transform("abc").unwrap(), "ns:abc");
    }

    #[test]
    fn test_hash_is_lowercase_hex() {
        let out = hash(Sha256::new).transform("Hello").unwrap();
        assert_eq!(out.len(), 64);
        assert!(out.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(
            out,
            "185f8db32271fe25f561a6fc938b2e264306ec304eda518007d1764826381969"
        );
    }

    #[test]
    fn test_hmac_keyed_hash() {
        let keyed = hash(|| Hmac::<Sha256>::new_from_slice(b"secret").expect("hmac key"));
        let other = hash(|| Hmac::<Sha256>::new_from_slice(b"other").expect("hmac key"));

        let a = keyed.transform("user@example.com").unwrap();
        assert_eq!(a, keyed.transform("user@example.com").unwrap());
        assert_ne!(a, other.transform("user@example.com").unwrap());
        assert_ne!(a, sha256_hex("user@example.com"));
    }

    #[test]
    fn test_short_write_is_an_error() {
        let err = hash(|| Stingy).transform("abcd").unwrap_err();
        match err {
            CacheError::KeyTransform(msg) => assert_eq!(msg, "only hashed 1 of 4 bytes"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_failure_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let keys = compose(vec![
            Arc::new(key_fn(|_: &str| Err(CacheError::key_transform("rejected")))),
            Arc::new(key_fn(move |k: &str| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(k.to_string())
            })),
        ]);

        assert!(matches!(
            keys.transform("abc"),
            Err(CacheError::KeyTransform(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let keys = KeyPipeline::default();
        assert!(keys.is_empty());
        assert_eq!(keys.transform("abc").unwrap(), "abc");
        assert_eq!(identity().transform("abc").unwrap(), "abc");
    }

    #[test]
    fn test_from_config() {
        let config = KeyConfig {
            prefix: "tenant-7:".to_string(),
            hash: KeyHash::Sha256,
        };
        let keys = KeyPipeline::from_config(&config);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys.transform("abc").unwrap(), sha256_hex("tenant-7:abc"));

        let plain = KeyPipeline::from_config(&KeyConfig::default());
        assert!(plain.is_empty());

        let sha512 = KeyPipeline::from_config(&KeyConfig {
            prefix: String::new(),
            hash: KeyHash::Sha512,
        });
        assert_eq!(sha512.transform("abc").unwrap().len(), 128);
    }

    proptest! {
        #[test]
        fn prop_pipeline_is_deterministic(key in ".{0,64}") {
            let keys = compose(vec![Arc::new(prefix("p:")), Arc::new(hash(Sha256::new))]);
            prop_assert_eq!(keys.transform(&key).unwrap(), keys.transform(&key).unwrap());
        }

        #[test]
        fn prop_nested_pipelines_compose(key in ".{0,64}", a in "[a-z]{0,8}", b in "[a-z]{0,8}") {
            let flat = compose(vec![Arc::new(prefix(a.clone())), Arc::new(prefix(b.clone()))]);
            let nested = compose(vec![
                Arc::new(compose(vec![Arc::new(prefix(a.clone()))])),
                Arc::new(prefix(b.clone())),
            ]);
            prop_assert_eq!(flat.transform(&key).unwrap(), format!("{}{}{}", b, a, key));
            prop_assert_eq!(flat.transform(&key).unwrap(), nested.transform(&key).unwrap());
        }
    }
}
