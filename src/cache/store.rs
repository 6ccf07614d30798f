//! Tiered cache store with adaptive TTLs and delete-wins fencing.
//!
//! Every entry is written under a volatility tier that fixes its base TTL.
//! Access frequency bends the TTL within the tier ladder: entries read often
//! are kept fresher (shorter TTL), entries read rarely coast longer. A purge
//! arms a fence for its key pattern; a write whose payload was built before
//! the purge, inside the grace window, is rejected so stale aggregates can
//! never overwrite an invalidation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use metrics::counter;
use thiserror::Error;
use tracing::debug;

use super::backend::{BackendError, CacheBackend};
use super::config::CacheConfig;
use super::keys::KeyPattern;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend: {0}")]
    Backend(String),
    /// A purge landed after this payload was built; the write must not win.
    #[error("write fenced by a newer invalidation")]
    Fenced,
}

impl From<BackendError> for CacheError {
    fn from(err: BackendError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Volatility tier of a cached aggregate. Base TTLs come from
/// [`CacheConfig`] and must rise monotonically along this ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    /// Real-time aggregates (activity feeds, per-user views).
    Hot,
    /// Content detail and comment aggregates.
    Warm,
    /// List and search results.
    Cold,
    /// Rarely-changing reference data (slug mappings, taxonomies).
    Frozen,
}

impl CacheTier {
    pub fn base_ttl(self, config: &CacheConfig) -> Duration {
        match self {
            Self::Hot => config.hot_ttl(),
            Self::Warm => config.warm_ttl(),
            Self::Cold => config.cold_ttl(),
            Self::Frozen => config.frozen_ttl(),
        }
    }

    /// One step toward the longer-lived end of the ladder.
    pub fn promote(self) -> Self {
        match self {
            Self::Hot => Self::Warm,
            Self::Warm => Self::Cold,
            Self::Cold | Self::Frozen => Self::Frozen,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FrequencyWindow {
    hits: u32,
    window_start: Instant,
}

/// Cache store front door: reads bump access frequency, writes pass the
/// fence check and get a frequency-adjusted TTL.
pub struct TieredStore {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    frequency: DashMap<String, FrequencyWindow>,
    fences: DashMap<String, Instant>,
}

impl TieredStore {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            frequency: DashMap::new(),
            fences: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Fetch an entry, recording the access for TTL adaptation.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        if !self.config.enabled {
            return Ok(None);
        }
        let value = self.backend.get(key).await?;
        match &value {
            Some(_) => {
                self.bump_frequency(key);
                counter!("agora_cache_hit_total").increment(1);
            }
            None => {
                counter!("agora_cache_miss_total").increment(1);
            }
        }
        Ok(value)
    }

    /// Store an entry built at `built_at`.
    ///
    /// Fails with [`CacheError::Fenced`] when an invalidation for a matching
    /// pattern landed after the payload was built, inside the grace window.
    /// Callers rebuild once and retry; a second fence means another purge
    /// raced in and the write is simply abandoned.
    ///
    /// The fence is checked on both sides of the backend write. A purge can
    /// arm its fence and scan keys while this writer is suspended inside
    /// `backend.set`; the purge then removes nothing, so the landed payload
    /// is deleted here and the write reported fenced.
    pub async fn set(
        &self,
        key: &str,
        value: Bytes,
        tier: CacheTier,
        built_at: Instant,
    ) -> Result<(), CacheError> {
        if !self.config.enabled {
            return Ok(());
        }
        if self.is_fenced(key, built_at) {
            counter!("agora_cache_fenced_total").increment(1);
            return Err(CacheError::Fenced);
        }
        let ttl = self.adjusted_ttl(key, tier);
        self.backend.set(key, value, ttl).await?;
        if self.is_fenced(key, built_at) {
            self.backend.delete(&[key.to_string()]).await?;
            counter!("agora_cache_fenced_total").increment(1);
            return Err(CacheError::Fenced);
        }
        Ok(())
    }

    /// Purge every key matching `pattern` and arm its fence.
    ///
    /// Returns the number of entries removed.
    pub async fn invalidate(&self, pattern: &KeyPattern) -> Result<usize, CacheError> {
        if !self.config.enabled {
            return Ok(0);
        }
        // Fence first so a concurrent writer racing this purge still loses.
        self.fences
            .insert(pattern.prefix().to_string(), Instant::now());

        let keys = self.backend.keys_matching(pattern.prefix()).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = self.backend.delete(&keys).await?;
        for key in &keys {
            self.frequency.remove(key);
        }
        debug!(pattern = %pattern, removed, "cache pattern purged");
        Ok(removed)
    }

    fn is_fenced(&self, key: &str, built_at: Instant) -> bool {
        let grace = self.config.fence_grace();
        let now = Instant::now();
        let mut fenced = false;
        self.fences.retain(|prefix, purged_at| {
            if now.duration_since(*purged_at) > grace {
                return false;
            }
            if key.starts_with(prefix.as_str()) && built_at <= *purged_at {
                fenced = true;
            }
            true
        });
        fenced
    }

    fn bump_frequency(&self, key: &str) {
        let now = Instant::now();
        let window = self.config.frequency_ttl();
        let mut entry = self
            .frequency
            .entry(key.to_string())
            .or_insert(FrequencyWindow {
                hits: 0,
                window_start: now,
            });
        if now.duration_since(entry.window_start) > window {
            entry.hits = 1;
            entry.window_start = now;
        } else {
            entry.hits = entry.hits.saturating_add(1);
        }
    }

    fn hits_in_window(&self, key: &str) -> u32 {
        match self.frequency.get(key) {
            Some(entry)
                if Instant::now().duration_since(entry.window_start)
                    <= self.config.frequency_ttl() =>
            {
                entry.hits
            }
            _ => 0,
        }
    }

    /// Base tier TTL bent by observed access frequency, clamped to the
    /// [hot, frozen] range so adaptation never escapes the ladder.
    fn adjusted_ttl(&self, key: &str, tier: CacheTier) -> Duration {
        let base = tier.base_ttl(&self.config);
        let hits = self.hits_in_window(key);
        let adjusted = if hits >= self.config.high_frequency_threshold {
            // Heavily read entries stay fresher.
            base / 2
        } else if hits <= self.config.low_frequency_threshold {
            tier.promote().base_ttl(&self.config)
        } else {
            base
        };
        adjusted.clamp(self.config.hot_ttl(), self.config.frozen_ttl())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;

    #[derive(Default)]
    struct MapBackend {
        entries: Mutex<HashMap<String, (Bytes, Duration)>>,
    }

    impl MapBackend {
        fn ttl_of(&self, key: &str) -> Option<Duration> {
            self.entries
                .lock()
                .expect("map backend lock")
                .get(key)
                .map(|(_, ttl)| *ttl)
        }
    }

    #[async_trait]
    impl CacheBackend for MapBackend {
        async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError> {
            Ok(self
                .entries
                .lock()
                .expect("map backend lock")
                .get(key)
                .map(|(value, _)| value.clone()))
        }

        async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), BackendError> {
            self.entries
                .lock()
                .expect("map backend lock")
                .insert(key.to_string(), (value, ttl));
            Ok(())
        }

        async fn delete(&self, keys: &[String]) -> Result<usize, BackendError> {
            let mut entries = self.entries.lock().expect("map backend lock");
            Ok(keys.iter().filter(|k| entries.remove(*k).is_some()).count())
        }

        async fn keys_matching(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
            Ok(self
                .entries
                .lock()
                .expect("map backend lock")
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn expire(&self, key: &str, ttl: Duration) -> Result<(), BackendError> {
            if let Some(entry) = self
                .entries
                .lock()
                .expect("map backend lock")
                .get_mut(key)
            {
                entry.1 = ttl;
            }
            Ok(())
        }
    }

    fn store_with(config: CacheConfig) -> (TieredStore, Arc<MapBackend>) {
        let backend = Arc::new(MapBackend::default());
        (TieredStore::new(backend.clone(), config), backend)
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let (store, _) = store_with(CacheConfig::default());

        store
            .set("v1:content:detail:a:anonymous", Bytes::from_static(b"{}"), CacheTier::Warm, Instant::now())
            .await
            .expect("set");

        let value = store.get("v1:content:detail:a:anonymous").await.expect("get");
        assert_eq!(value, Some(Bytes::from_static(b"{}")));
    }

    #[tokio::test]
    async fn disabled_cache_reads_as_empty() {
        let config = CacheConfig {
            enabled: false,
            ..Default::default()
        };
        let (store, backend) = store_with(config);

        store
            .set("v1:content:detail:a:anonymous", Bytes::from_static(b"{}"), CacheTier::Warm, Instant::now())
            .await
            .expect("set is a no-op");
        assert!(backend.ttl_of("v1:content:detail:a:anonymous").is_none());
        assert_eq!(store.get("v1:content:detail:a:anonymous").await.expect("get"), None);
    }

    #[tokio::test]
    async fn invalidate_removes_matching_keys_only() {
        let (store, _) = store_with(CacheConfig::default());
        let now = Instant::now();

        store.set("v1:content:detail:a:anonymous", Bytes::from_static(b"1"), CacheTier::Warm, now).await.expect("set");
        store.set("v1:content:detail:a:user:u", Bytes::from_static(b"2"), CacheTier::Warm, now).await.expect("set");
        store.set("v1:content:detail:b:anonymous", Bytes::from_static(b"3"), CacheTier::Warm, now).await.expect("set");

        let removed = store
            .invalidate(&KeyPattern::new("v1:content:detail:a:"))
            .await
            .expect("invalidate");

        assert_eq!(removed, 2);
        assert_eq!(store.get("v1:content:detail:a:anonymous").await.expect("get"), None);
        assert!(store.get("v1:content:detail:b:anonymous").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn stale_write_after_purge_is_fenced() {
        let (store, _) = store_with(CacheConfig::default());

        let built_at = Instant::now();
        store
            .invalidate(&KeyPattern::new("v1:content:detail:a:"))
            .await
            .expect("invalidate");

        let result = store
            .set("v1:content:detail:a:anonymous", Bytes::from_static(b"stale"), CacheTier::Warm, built_at)
            .await;
        assert!(matches!(result, Err(CacheError::Fenced)));

        // A payload rebuilt after the purge goes through.
        store
            .set("v1:content:detail:a:anonymous", Bytes::from_static(b"fresh"), CacheTier::Warm, Instant::now())
            .await
            .expect("post-purge rebuild");
    }

    /// Backend whose `set` parks until released. Models a writer suspended
    /// mid-write while a purge scans and fences.
    struct GatedBackend {
        inner: MapBackend,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl CacheBackend for GatedBackend {
        async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), BackendError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, keys: &[String]) -> Result<usize, BackendError> {
            self.inner.delete(keys).await
        }

        async fn keys_matching(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
            self.inner.keys_matching(prefix).await
        }

        async fn expire(&self, key: &str, ttl: Duration) -> Result<(), BackendError> {
            self.inner.expire(key, ttl).await
        }
    }

    #[tokio::test]
    async fn purge_racing_an_in_flight_write_still_wins() {
        let backend = Arc::new(GatedBackend {
            inner: MapBackend::default(),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let store = Arc::new(TieredStore::new(backend.clone(), CacheConfig::default()));

        let built_at = Instant::now();
        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .set(
                        "v1:content:detail:a:anonymous",
                        Bytes::from_static(b"stale"),
                        CacheTier::Warm,
                        built_at,
                    )
                    .await
            })
        };

        // The purge runs while the writer is parked inside the backend call.
        // It scans before the payload lands, so it removes nothing.
        backend.entered.notified().await;
        let removed = store
            .invalidate(&KeyPattern::new("v1:content:detail:a:"))
            .await
            .expect("invalidate");
        assert_eq!(removed, 0);

        backend.release.notify_one();
        let result = writer.await.expect("writer task");
        assert!(matches!(result, Err(CacheError::Fenced)));

        // The pre-purge payload must not be served afterwards.
        assert_eq!(
            store.get("v1:content:detail:a:anonymous").await.expect("get"),
            None
        );
    }

    #[tokio::test]
    async fn fence_expires_after_grace_window() {
        let config = CacheConfig {
            fence_grace_ms: 0,
            ..Default::default()
        };
        let (store, _) = store_with(config);

        let built_at = Instant::now();
        store
            .invalidate(&KeyPattern::new("v1:content:detail:a:"))
            .await
            .expect("invalidate");
        tokio::time::sleep(Duration::from_millis(5)).await;

        store
            .set("v1:content:detail:a:anonymous", Bytes::from_static(b"ok"), CacheTier::Warm, built_at)
            .await
            .expect("fence lapsed");
    }

    #[tokio::test]
    async fn hot_reads_shorten_the_ttl() {
        let config = CacheConfig::default();
        let high = config.high_frequency_threshold;
        let (store, backend) = store_with(config.clone());
        let key = "v1:content:detail:a:anonymous";
        let now = Instant::now();

        store.set(key, Bytes::from_static(b"1"), CacheTier::Warm, now).await.expect("set");
        for _ in 0..high {
            store.get(key).await.expect("get");
        }
        store.set(key, Bytes::from_static(b"2"), CacheTier::Warm, Instant::now()).await.expect("re-set");

        assert_eq!(backend.ttl_of(key), Some(config.warm_ttl() / 2));
    }

    #[tokio::test]
    async fn rarely_read_entries_coast_a_tier_longer() {
        let config = CacheConfig::default();
        let (store, backend) = store_with(config.clone());
        let key = "v1:content:list:all:anonymous";

        // No recorded accesses: promoted from Cold to Frozen on write.
        store.set(key, Bytes::from_static(b"1"), CacheTier::Cold, Instant::now()).await.expect("set");
        assert_eq!(backend.ttl_of(key), Some(config.frozen_ttl()));
    }

    #[tokio::test]
    async fn adjusted_ttl_never_escapes_the_ladder() {
        let config = CacheConfig::default();
        let high = config.high_frequency_threshold;
        let (store, backend) = store_with(config.clone());
        let key = "v1:user:activity:u:anonymous";
        let now = Instant::now();

        // Hot tier halved would undershoot the hot TTL; the clamp holds it.
        store.set(key, Bytes::from_static(b"1"), CacheTier::Hot, now).await.expect("set");
        for _ in 0..high {
            store.get(key).await.expect("get");
        }
        store.set(key, Bytes::from_static(b"2"), CacheTier::Hot, Instant::now()).await.expect("re-set");

        assert_eq!(backend.ttl_of(key), Some(config.hot_ttl()));
    }
}
