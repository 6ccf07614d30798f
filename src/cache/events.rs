//! Invalidation events and the bounded in-memory queue that carries them.
//!
//! Write paths publish a [`TriggerKind`] plus an [`EventContext`]; the
//! invalidation bus drains the queue in batches and turns events into key
//! purges. The queue is bounded; under sustained back-pressure the oldest
//! event drops, which is safe because every entry still has a TTL ceiling.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::lock::mutex_lock;

/// Monotonic ordering stamp, unique per event within this process.
///
/// When several events touch the same content id, the highest epoch wins
/// during purge planning.
pub type Epoch = u64;

/// Mutations that can dirty cached aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    ContentCreated,
    ContentUpdated,
    ContentDeleted,
    CommentCreated,
    CommentUpdated,
    CommentDeleted,
    ReactionChanged,
    BookmarkChanged,
    UserUpdated,
}

/// Identifiers the mutation touched. Fields are optional because not every
/// trigger knows every identifier (a reaction event carries no slug).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventContext {
    pub content_id: Option<Uuid>,
    pub slug: Option<String>,
    pub user_id: Option<Uuid>,
    pub category: Option<String>,
}

impl EventContext {
    pub fn for_content(content_id: Uuid) -> Self {
        Self {
            content_id: Some(content_id),
            ..Default::default()
        }
    }

    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// One invalidation event, carrying an idempotency id and an ordering epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationEvent {
    /// Unique identifier for dedupe (UUIDv4).
    pub id: Uuid,
    /// Monotonic epoch for ordering within this process.
    pub epoch: Epoch,
    pub kind: TriggerKind,
    pub context: EventContext,
    pub timestamp: OffsetDateTime,
}

impl InvalidationEvent {
    pub fn new(kind: TriggerKind, context: EventContext, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            context,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Bounded in-memory invalidation queue.
///
/// A mutex is enough here; publish and drain are short critical sections and
/// contention is expected to be low.
pub struct EventQueue {
    queue: Mutex<VecDeque<InvalidationEvent>>,
    epoch_counter: AtomicU64,
    capacity: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Get the next epoch number.
    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Publish an event. When the queue is at capacity the oldest event is
    /// dropped to make room; TTL expiry bounds the staleness that drop can
    /// introduce.
    pub fn publish(&self, kind: TriggerKind, context: EventContext) -> Epoch {
        let epoch = self.next_epoch();
        let event = InvalidationEvent::new(kind, context, epoch);

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = ?kind,
            "invalidation event enqueued"
        );

        let mut queue = mutex_lock(&self.queue, "publish");
        if queue.len() >= self.capacity {
            if let Some(dropped) = queue.pop_front() {
                counter!("agora_invalidation_dropped_total").increment(1);
                warn!(
                    dropped_id = %dropped.id,
                    dropped_epoch = dropped.epoch,
                    capacity = self.capacity,
                    "invalidation queue full, dropping oldest event"
                );
            }
        }
        queue.push_back(event);
        epoch
    }

    /// Drain up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<InvalidationEvent> {
        let mut queue = mutex_lock(&self.queue, "drain");
        let count = limit.min(queue.len());
        queue.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        mutex_lock(&self.queue, "clear").clear();
    }
}
