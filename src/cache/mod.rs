//! Agora cache system.
//!
//! Caches assembled content-detail views in a tiered key/value store and
//! keeps them consistent with the source of truth through event-driven
//! invalidation:
//!
//! - **Key manager**: deterministic, versioned key derivation and the
//!   reverse pattern enumeration used for purges.
//! - **Tiered store**: per-entry TTL drawn from hot/warm/cold/frozen tiers,
//!   adjusted by observed access frequency, with delete-wins fencing
//!   against racing invalidations.
//! - **Invalidation bus**: bounded event queue, a purge planner translating
//!   mutation triggers into key patterns, and a batching drain loop.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `agora.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! warm_ttl_secs = 1800
//! queue_capacity = 1024
//! # ... see config.rs for all options
//! ```

mod backend;
mod bus;
mod config;
mod events;
mod keys;
pub(crate) mod lock;
mod planner;
mod store;

pub use backend::{BackendError, CacheBackend};
pub use bus::InvalidationBus;
pub use config::CacheConfig;
pub use events::{Epoch, EventContext, EventQueue, InvalidationEvent, TriggerKind};
pub use keys::{CacheKeyManager, KeyPattern, MAX_KEY_LEN, SCHEMA_VERSION, ViewerContext};
pub use planner::PurgePlan;
pub use store::{CacheError, CacheTier, TieredStore};
