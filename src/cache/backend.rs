//! Storage backend seam for the tiered cache.
//!
//! The engine ships an in-process backend ([`crate::infra::MemoryBackend`]);
//! a shared backend such as Redis plugs in behind the same trait.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("cache backend io: {0}")]
    Io(String),
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Byte-oriented key/value store with per-entry TTLs and prefix scans.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a live entry. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError>;

    /// Store an entry, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), BackendError>;

    /// Remove entries, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<usize, BackendError>;

    /// All live keys starting with `prefix`.
    async fn keys_matching(&self, prefix: &str) -> Result<Vec<String>, BackendError>;

    /// Rewrite the TTL of a live entry; absent keys are a no-op.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), BackendError>;
}
