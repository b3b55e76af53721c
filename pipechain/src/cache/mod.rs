//! Key-value cache boundary.
//!
//! The cache is the only shared mutable state of the engine. Run records and
//! results are stored as JSON bytes under the namespaces in [`keys`].

pub mod keys;
mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::errors::{CacheBackendError, PipechainError};

pub use memory::InMemoryCache;

/// A byte-oriented key-value cache with per-key expiry.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Returns the value stored under `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheBackendError>;

    /// Stores `value` under `key`. A `ttl_seconds` of zero means no expiry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<(), CacheBackendError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheBackendError>;
}

/// Reads and deserializes a JSON value.
pub async fn load_json<T: DeserializeOwned>(
    cache: &dyn KeyValueCache,
    key: &str,
) -> Result<Option<T>, PipechainError> {
    let Some(bytes) = cache.get(key).await? else {
        debug!(key, "Cache miss");
        return Ok(None);
    };
    debug!(key, bytes = bytes.len(), "Cache hit");
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Serializes and writes a JSON value.
pub async fn store_json<T: Serialize + Sync>(
    cache: &dyn KeyValueCache,
    key: &str,
    value: &T,
    ttl_seconds: u64,
) -> Result<(), PipechainError> {
    let bytes = serde_json::to_vec(value)?;
    debug!(key, bytes = bytes.len(), ttl_seconds, "Cache write");
    cache.set(key, bytes, ttl_seconds).await?;
    Ok(())
}
