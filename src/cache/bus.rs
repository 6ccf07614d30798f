//! Invalidation bus: the at-least-once bridge from write-path events to
//! cache purges.
//!
//! Write operations publish events and return immediately. A background task
//! (or an explicit [`InvalidationBus::drain_now`] on latency-tolerant write
//! paths) drains the queue in batches, plans the purge, and executes it with
//! bounded retries. A pattern that still fails after the retry budget is
//! abandoned to TTL expiry; purge failures never fail the originating write.

use std::sync::Arc;
use std::time::Instant;

use metrics::{gauge, histogram};
use tokio::sync::Notify;
use tracing::{info, instrument, warn};

use super::config::CacheConfig;
use super::events::{EventContext, EventQueue, TriggerKind};
use super::keys::{CacheKeyManager, KeyPattern};
use super::planner::PurgePlan;
use super::store::TieredStore;

const METRIC_PURGE_BATCH_MS: &str = "agora_purge_batch_ms";
const METRIC_QUEUE_LEN: &str = "agora_invalidation_queue_len";

pub struct InvalidationBus {
    config: CacheConfig,
    store: Arc<TieredStore>,
    keys: Arc<CacheKeyManager>,
    queue: Arc<EventQueue>,
    wakeup: Notify,
}

impl InvalidationBus {
    pub fn new(store: Arc<TieredStore>, keys: Arc<CacheKeyManager>, config: CacheConfig) -> Self {
        let queue = Arc::new(EventQueue::new(config.queue_capacity));
        Self {
            config,
            store,
            keys,
            queue,
            wakeup: Notify::new(),
        }
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    /// Publish a mutation event. Returns immediately; the purge happens on
    /// the next drain.
    pub fn publish(&self, kind: TriggerKind, context: EventContext) {
        self.queue.publish(kind, context);
        gauge!(METRIC_QUEUE_LEN).set(self.queue.len() as f64);
        self.wakeup.notify_one();
    }

    /// Drain one batch and execute its purge plan.
    ///
    /// Returns the number of patterns purged. Write paths that need
    /// read-your-writes within the same process call this directly instead
    /// of waiting for the background loop.
    #[instrument(skip(self))]
    pub async fn drain_now(&self) -> usize {
        let events = self.queue.drain(self.config.drain_batch_limit);
        gauge!(METRIC_QUEUE_LEN).set(self.queue.len() as f64);
        if events.is_empty() {
            return 0;
        }

        let batch_started_at = Instant::now();
        let event_count = events.len();
        let plan = PurgePlan::from_events(&events, &self.keys);

        info!(event_count, patterns = plan.len(), "invalidation batch starting");

        let mut purged = 0;
        for pattern in plan.patterns() {
            if self.purge_with_retry(pattern).await {
                purged += 1;
            }
        }

        info!(event_count, purged, "invalidation batch complete");
        histogram!(METRIC_PURGE_BATCH_MS)
            .record(batch_started_at.elapsed().as_secs_f64() * 1000.0);
        purged
    }

    /// Background drain loop. Wakes on publish or on the drain interval,
    /// whichever comes first. Runs until the surrounding task is dropped.
    pub async fn run_forever(&self) {
        loop {
            let _ = tokio::time::timeout(self.config.drain_interval(), self.wakeup.notified()).await;
            while self.drain_now().await > 0 && self.queue.len() >= self.config.drain_batch_limit {}
        }
    }

    /// Purge one pattern, retrying transient backend failures with doubling
    /// backoff. Returns false when the retry budget is exhausted; the
    /// entries then age out via their TTLs.
    async fn purge_with_retry(&self, pattern: &KeyPattern) -> bool {
        let mut backoff = self.config.purge_backoff();
        for attempt in 1..=self.config.max_purge_attempts.max(1) {
            match self.store.invalidate(pattern).await {
                Ok(removed) => {
                    if removed > 0 {
                        info!(pattern = %pattern, removed, "cache purge applied");
                    }
                    return true;
                }
                Err(err) if attempt < self.config.max_purge_attempts.max(1) => {
                    warn!(pattern = %pattern, attempt, error = %err, "cache purge failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => {
                    warn!(
                        pattern = %pattern,
                        attempt,
                        error = %err,
                        "cache purge abandoned, entries will expire by TTL"
                    );
                }
            }
        }
        false
    }
}
