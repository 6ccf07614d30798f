//! In-process cache backend: an LRU map with per-entry deadlines.
//!
//! This is the default backend for single-node deployments. Capacity
//! pressure evicts least-recently-used entries; expired entries read as
//! absent and are removed on touch.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;

use crate::cache::lock::{rw_read, rw_write};
use crate::cache::{BackendError, CacheBackend, CacheConfig};

struct StoredValue {
    value: Bytes,
    expires_at: Instant,
}

pub struct MemoryBackend {
    entries: RwLock<LruCache<String, StoredValue>>,
}

impl MemoryBackend {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.max_entries_non_zero())),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError> {
        // Write lock even on reads: the LRU order moves and expired entries
        // are dropped in place.
        let mut entries = rw_write(&self.entries, "get");
        match entries.get(key) {
            Some(stored) if stored.expires_at > Instant::now() => Ok(Some(stored.value.clone())),
            Some(_) => {
                entries.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), BackendError> {
        let stored = StoredValue {
            value,
            expires_at: Instant::now() + ttl,
        };
        let mut entries = rw_write(&self.entries, "set");
        let at_capacity = entries.len() == entries.cap().get();
        if entries.put(key.to_string(), stored).is_none() && at_capacity {
            counter!("agora_cache_evict_total").increment(1);
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, BackendError> {
        let mut entries = rw_write(&self.entries, "delete");
        Ok(keys.iter().filter(|k| entries.pop(*k).is_some()).count())
    }

    async fn keys_matching(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        let now = Instant::now();
        let entries = rw_read(&self.entries, "keys_matching");
        Ok(entries
            .iter()
            .filter(|(key, stored)| key.starts_with(prefix) && stored.expires_at > now)
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), BackendError> {
        let mut entries = rw_write(&self.entries, "expire");
        if let Some(stored) = entries.get_mut(key) {
            stored.expires_at = Instant::now() + ttl;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with_capacity(max_entries: usize) -> MemoryBackend {
        MemoryBackend::new(&CacheConfig {
            max_entries,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn set_then_get() {
        let backend = backend_with_capacity(8);

        backend
            .set("k1", Bytes::from_static(b"v1"), Duration::from_secs(60))
            .await
            .expect("set");

        assert_eq!(
            backend.get("k1").await.expect("get"),
            Some(Bytes::from_static(b"v1"))
        );
        assert_eq!(backend.get("missing").await.expect("get"), None);
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let backend = backend_with_capacity(8);

        backend
            .set("k1", Bytes::from_static(b"v1"), Duration::from_millis(1))
            .await
            .expect("set");
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(backend.get("k1").await.expect("get"), None);
        assert!(backend.keys_matching("k").await.expect("scan").is_empty());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let backend = backend_with_capacity(2);
        let ttl = Duration::from_secs(60);

        backend.set("a", Bytes::from_static(b"1"), ttl).await.expect("set");
        backend.set("b", Bytes::from_static(b"2"), ttl).await.expect("set");
        backend.get("a").await.expect("get");
        backend.set("c", Bytes::from_static(b"3"), ttl).await.expect("set");

        assert!(backend.get("a").await.expect("get").is_some());
        assert_eq!(backend.get("b").await.expect("get"), None);
        assert!(backend.get("c").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn delete_counts_only_present_keys() {
        let backend = backend_with_capacity(8);
        let ttl = Duration::from_secs(60);

        backend.set("a", Bytes::from_static(b"1"), ttl).await.expect("set");
        backend.set("b", Bytes::from_static(b"2"), ttl).await.expect("set");

        let removed = backend
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .expect("delete");
        assert_eq!(removed, 1);
        assert!(backend.get("a").await.expect("get").is_none());
        assert!(backend.get("b").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn prefix_scan_matches_structured_keys() {
        let backend = backend_with_capacity(8);
        let ttl = Duration::from_secs(60);

        backend.set("v1:content:detail:a:anonymous", Bytes::from_static(b"1"), ttl).await.expect("set");
        backend.set("v1:content:detail:a:user:u", Bytes::from_static(b"2"), ttl).await.expect("set");
        backend.set("v1:content:detail:b:anonymous", Bytes::from_static(b"3"), ttl).await.expect("set");

        let mut keys = backend
            .keys_matching("v1:content:detail:a:")
            .await
            .expect("scan");
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "v1:content:detail:a:anonymous".to_string(),
                "v1:content:detail:a:user:u".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn expire_rewrites_the_deadline() {
        let backend = backend_with_capacity(8);

        backend
            .set("k1", Bytes::from_static(b"v1"), Duration::from_secs(60))
            .await
            .expect("set");
        backend.expire("k1", Duration::from_millis(1)).await.expect("expire");
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(backend.get("k1").await.expect("get"), None);
    }
}
