//! In-process cache.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::KeyValueCache;
use crate::errors::CacheBackendError;

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// A [`KeyValueCache`] held in process memory.
///
/// Expired entries are dropped lazily on read.
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries, including expired ones not yet dropped.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if an unexpired entry exists under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|e| !e.is_expired())
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[async_trait]
impl KeyValueCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheBackendError> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Re-checked under the shard lock so a concurrent `set` is never dropped.
        self.entries.remove_if(key, |_, entry| entry.is_expired());
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<(), CacheBackendError> {
        let expires_at = (ttl_seconds > 0).then(|| Instant::now() + Duration::from_secs(ttl_seconds));
        self.entries
            .insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheBackendError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = InMemoryCache::new();
        cache.set("a", b"1".to_vec(), 0).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), Some(b"1".to_vec()));
        assert!(cache.contains_key("a"));

        cache.delete("a").await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let cache = InMemoryCache::new();
        tokio_test::block_on(async {
            cache.set("a", b"1".to_vec(), 0).await.unwrap();
            cache.set("a", b"2".to_vec(), 0).await.unwrap();
            assert_eq!(cache.get("a").await.unwrap(), Some(b"2".to_vec()));
        });
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let cache = InMemoryCache::new();
        assert!(cache.delete("missing").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = InMemoryCache::new();
        cache.set("a", b"1".to_vec(), 10).await.unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cache.get("a").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("a").await.unwrap().is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_expiry_does_not_drop_concurrent_writes() {
        let cache = Arc::new(InMemoryCache::new());
        let keys: Vec<String> = (0..2_000).map(|i| format!("k{i}")).collect();
        for key in &keys {
            cache.entries.insert(
                key.clone(),
                CacheEntry {
                    value: b"old".to_vec(),
                    expires_at: Some(Instant::now()),
                },
            );
        }

        let mut tasks = Vec::new();
        for key in keys.clone() {
            let reader = Arc::clone(&cache);
            let read_key = key.clone();
            tasks.push(tokio::spawn(async move {
                reader.get(&read_key).await.unwrap();
            }));
            let writer = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                writer.set(&key, b"new".to_vec(), 3600).await.unwrap();
            }));
        }
        for task in futures::future::join_all(tasks).await {
            task.unwrap();
        }

        for key in &keys {
            assert_eq!(cache.get(key).await.unwrap(), Some(b"new".to_vec()), "lost write for {key}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_never_expires() {
        let cache = InMemoryCache::new();
        cache.set("a", b"1".to_vec(), 0).await.unwrap();

        tokio::time::advance(Duration::from_secs(1_000_000)).await;
        assert!(cache.get("a").await.unwrap().is_some());
    }
}
