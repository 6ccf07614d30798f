//! Cache configuration.
//!
//! Tier TTLs, adaptive-frequency thresholds, and invalidation batching knobs,
//! populated from `agora.toml` via the settings layer.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_HOT_TTL_SECS: u64 = 5 * 60;
const DEFAULT_WARM_TTL_SECS: u64 = 30 * 60;
const DEFAULT_COLD_TTL_SECS: u64 = 60 * 60;
const DEFAULT_FROZEN_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_MAX_ENTRIES: usize = 10_000;
const DEFAULT_FREQUENCY_TTL_SECS: u64 = 60;
const DEFAULT_HIGH_FREQUENCY_THRESHOLD: u32 = 8;
const DEFAULT_LOW_FREQUENCY_THRESHOLD: u32 = 1;
const DEFAULT_FENCE_GRACE_MS: u64 = 2_000;
const DEFAULT_QUEUE_CAPACITY: usize = 1_024;
const DEFAULT_DRAIN_BATCH_LIMIT: usize = 64;
const DEFAULT_DRAIN_INTERVAL_MS: u64 = 50;
const DEFAULT_MAX_PURGE_ATTEMPTS: u32 = 3;
const DEFAULT_PURGE_BACKOFF_MS: u64 = 50;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch; when false, reads always take the aggregation path.
    pub enabled: bool,
    /// Hot-tier TTL (real-time/personalized aggregates).
    pub hot_ttl_secs: u64,
    /// Warm-tier TTL (content detail, comment lists).
    pub warm_ttl_secs: u64,
    /// Cold-tier TTL (list/search results).
    pub cold_ttl_secs: u64,
    /// Frozen-tier TTL (rarely-changing reference data).
    pub frozen_ttl_secs: u64,
    /// Entry ceiling for the in-process backend.
    pub max_entries: usize,
    /// Lifetime of one access-frequency observation window.
    pub frequency_ttl_secs: u64,
    /// Hits per window above which an entry's TTL is halved on re-set.
    pub high_frequency_threshold: u32,
    /// Hits per window at or below which an entry is promoted one tier up.
    pub low_frequency_threshold: u32,
    /// Delete-wins grace window: a set built before a purge inside this
    /// window is rejected.
    pub fence_grace_ms: u64,
    /// Invalidation queue capacity; oldest events drop beyond it.
    pub queue_capacity: usize,
    /// Maximum events per drain batch.
    pub drain_batch_limit: usize,
    /// Maximum wait before a partial batch drains anyway.
    pub drain_interval_ms: u64,
    /// Purge attempts per pattern before giving up to TTL expiry.
    pub max_purge_attempts: u32,
    /// Base backoff between purge retries.
    pub purge_backoff_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hot_ttl_secs: DEFAULT_HOT_TTL_SECS,
            warm_ttl_secs: DEFAULT_WARM_TTL_SECS,
            cold_ttl_secs: DEFAULT_COLD_TTL_SECS,
            frozen_ttl_secs: DEFAULT_FROZEN_TTL_SECS,
            max_entries: DEFAULT_MAX_ENTRIES,
            frequency_ttl_secs: DEFAULT_FREQUENCY_TTL_SECS,
            high_frequency_threshold: DEFAULT_HIGH_FREQUENCY_THRESHOLD,
            low_frequency_threshold: DEFAULT_LOW_FREQUENCY_THRESHOLD,
            fence_grace_ms: DEFAULT_FENCE_GRACE_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            drain_batch_limit: DEFAULT_DRAIN_BATCH_LIMIT,
            drain_interval_ms: DEFAULT_DRAIN_INTERVAL_MS,
            max_purge_attempts: DEFAULT_MAX_PURGE_ATTEMPTS,
            purge_backoff_ms: DEFAULT_PURGE_BACKOFF_MS,
        }
    }
}

impl CacheConfig {
    pub fn hot_ttl(&self) -> Duration {
        Duration::from_secs(self.hot_ttl_secs)
    }

    pub fn warm_ttl(&self) -> Duration {
        Duration::from_secs(self.warm_ttl_secs)
    }

    pub fn cold_ttl(&self) -> Duration {
        Duration::from_secs(self.cold_ttl_secs)
    }

    pub fn frozen_ttl(&self) -> Duration {
        Duration::from_secs(self.frozen_ttl_secs)
    }

    pub fn frequency_ttl(&self) -> Duration {
        Duration::from_secs(self.frequency_ttl_secs)
    }

    pub fn fence_grace(&self) -> Duration {
        Duration::from_millis(self.fence_grace_ms)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn purge_backoff(&self) -> Duration {
        Duration::from_millis(self.purge_backoff_ms)
    }

    /// Entry ceiling as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }

    /// TTLs must be strictly ordered hot < warm < cold < frozen for tier
    /// promotion to mean anything.
    pub fn validate(&self) -> Result<(), String> {
        if self.hot_ttl_secs == 0 {
            return Err("cache.hot_ttl_secs must be positive".to_string());
        }
        if self.hot_ttl_secs > self.warm_ttl_secs
            || self.warm_ttl_secs > self.cold_ttl_secs
            || self.cold_ttl_secs > self.frozen_ttl_secs
        {
            return Err("cache tier TTLs must be ordered hot <= warm <= cold <= frozen".to_string());
        }
        if self.queue_capacity == 0 {
            return Err("cache.queue_capacity must be positive".to_string());
        }
        if self.drain_batch_limit == 0 {
            return Err("cache.drain_batch_limit must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tiers_follow_the_volatility_ladder() {
        let config = CacheConfig::default();
        assert_eq!(config.hot_ttl(), Duration::from_secs(300));
        assert_eq!(config.warm_ttl(), Duration::from_secs(1800));
        assert_eq!(config.cold_ttl(), Duration::from_secs(3600));
        assert_eq!(config.frozen_ttl(), Duration::from_secs(86400));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn misordered_tiers_fail_validation() {
        let config = CacheConfig {
            warm_ttl_secs: 10,
            hot_ttl_secs: 20,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_capacity_queue_fails_validation() {
        let config = CacheConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn max_entries_clamps_to_min() {
        let config = CacheConfig {
            max_entries: 0,
            ..Default::default()
        };
        assert_eq!(config.max_entries_non_zero().get(), 1);
    }
}
