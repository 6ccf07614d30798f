//! Repository traits describing the document store and the collaborator
//! services the aggregation pipeline reads from.
//!
//! Implementations live outside this crate (the routing/business layer wires
//! concrete stores in); tests use in-memory fakes.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{
    AuthorSummary, CommentAggregate, ContentRecord, ReactionAggregate, ViewerReaction,
};
use crate::domain::types::ContentIdentifier;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("store unreachable")]
    Unavailable,
    #[error("store timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Source-of-truth lookup for content documents.
///
/// The match contract mirrors the aggregation query interface: resolve by id
/// or slug, restricted by the caller to active content. Returning `None` is
/// the "not found" outcome; it is never an error.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch_content(
        &self,
        identifier: &ContentIdentifier,
    ) -> Result<Option<ContentRecord>, RepoError>;
}

/// User lookup service resolving author projections in bulk.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn get_users_by_ids(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, AuthorSummary>, RepoError>;
}

/// Comment repository exposing the grouped count-and-preview sub-query.
#[async_trait]
pub trait CommentsRepo: Send + Sync {
    async fn count_and_preview(&self, content_id: Uuid) -> Result<CommentAggregate, RepoError>;
}

/// Reaction repository: shared tallies plus the viewer's own state.
#[async_trait]
pub trait ReactionsRepo: Send + Sync {
    async fn tally(&self, content_id: Uuid) -> Result<ReactionAggregate, RepoError>;

    async fn viewer_reaction(
        &self,
        content_id: Uuid,
        viewer_id: Uuid,
    ) -> Result<ViewerReaction, RepoError>;
}
