//! Agora engine: content aggregation and adaptive caching for a community
//! platform.
//!
//! The engine assembles content detail views out of normalized collections
//! (content, users, comments, reactions) and keeps the assembled views
//! consistent under concurrent writes:
//!
//! - [`pipeline`] builds and executes deterministic aggregation plans.
//! - [`cache`] holds the tiered store, the versioned key manager, and the
//!   event-driven invalidation bus.
//! - [`application`] exposes the repository seams and the
//!   [`ContentDetailService`](application::ContentDetailService) read path.
//! - [`infra`] provides the in-process cache backend, connection pooling
//!   with a circuit breaker, and telemetry installation.
//! - [`config`] loads layered settings (file, then environment).
//!
//! The cacheable unit is always viewer-independent; personalization is
//! fetched live per request and merged after the shared aggregate resolves.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod pipeline;

pub use application::{ContentDetailService, EngineError};
pub use cache::{CacheKeyManager, InvalidationBus, TieredStore};
pub use config::EngineSettings;
