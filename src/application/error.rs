use thiserror::Error;

use crate::application::repos::RepoError;
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;

/// Error taxonomy surfaced to callers of the engine.
///
/// `NotFound` is terminal. `Unavailable` and `Timeout` are retryable by the
/// caller; when they originate from the cache store they are recovered
/// inside the engine instead of surfacing. `Conflict` marks a cache write
/// that lost a race against an invalidation fence; it is retried once
/// internally and never observed by callers of `get_content_detail`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("content not found")]
    NotFound,
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
    #[error("operation exceeded its time bound: {0}")]
    Timeout(String),
    #[error("cache write fenced by a newer invalidation")]
    Conflict,
}

impl EngineError {
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::Unavailable(detail.into())
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::Timeout(detail.into())
    }

    /// Whether a caller-level retry with backoff can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Unavailable(_) | EngineError::Timeout(_))
    }
}

impl From<RepoError> for EngineError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => EngineError::NotFound,
            RepoError::Timeout => EngineError::timeout("store query"),
            RepoError::Unavailable => EngineError::unavailable("store unreachable"),
            RepoError::Persistence(message) => EngineError::Unavailable(message),
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { .. } => EngineError::NotFound,
            other => EngineError::Unavailable(other.to_string()),
        }
    }
}

impl From<InfraError> for EngineError {
    fn from(err: InfraError) -> Self {
        match err {
            InfraError::CircuitOpen | InfraError::PoolExhausted => {
                EngineError::unavailable(err.to_string())
            }
            InfraError::AcquireTimeout => EngineError::timeout("connection acquisition"),
            other => EngineError::Unavailable(other.to_string()),
        }
    }
}
