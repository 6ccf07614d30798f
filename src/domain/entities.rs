//! Domain entities mirrored from persistent storage, plus the read-model
//! types assembled by the aggregation pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{ContentStatus, ReactionKind};

/// Upper bound on the embedded recent-comment preview. Keeps the grouped
/// comment sub-pipeline from dragging full child collections into the
/// aggregated payload.
pub const COMMENT_PREVIEW_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: Uuid,
    pub slug: String,
    pub author_id: Uuid,
    pub title: String,
    pub body: String,
    pub status: ContentStatus,
    /// Free-form descriptors: category, tags, type discriminator.
    pub metadata: BTreeMap<String, String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Read-projection of a user embedded into aggregated results. Never
/// authoritative; always re-derived from the user entity at read or
/// cache-refresh time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: Uuid,
    pub display_name: String,
    pub handle: String,
    pub avatar_url: Option<String>,
}

impl AuthorSummary {
    /// Placeholder for an author whose user record could not be resolved
    /// (deleted account, lagging replica). Keeps the aggregated view total.
    pub fn unresolved(id: Uuid) -> Self {
        Self {
            id,
            display_name: "unknown".to_string(),
            handle: "unknown".to_string(),
            avatar_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentPreview {
    pub id: Uuid,
    pub author_id: Uuid,
    pub excerpt: String,
    pub created_at: OffsetDateTime,
}

/// Derived comment statistics; computed by grouping, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentAggregate {
    pub count: u64,
    pub recent: Vec<CommentPreview>,
}

/// Derived per-kind reaction counts. Missing child data yields zero,
/// never null.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionAggregate {
    pub likes: u64,
    pub dislikes: u64,
    pub bookmarks: u64,
}

impl ReactionAggregate {
    pub fn count_for(&self, kind: ReactionKind) -> u64 {
        match kind {
            ReactionKind::Like => self.likes,
            ReactionKind::Dislike => self.dislikes,
            ReactionKind::Bookmark => self.bookmarks,
        }
    }
}

/// The requesting viewer's own reaction state. Not cacheable independently
/// of viewer identity, so it is always fetched live and merged at the edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerReaction {
    pub reaction: Option<ReactionKind>,
    pub bookmarked: bool,
}

/// The cacheable, viewer-independent portion of a content detail view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedView {
    pub content: ContentRecord,
    pub author: AuthorSummary,
    pub comments: CommentAggregate,
    pub reactions: ReactionAggregate,
}

/// The full detail view returned to callers: the shared aggregate plus the
/// per-viewer personalization merged in as a final step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentDetail {
    #[serde(flatten)]
    pub view: AggregatedView,
    pub viewer: Option<ViewerReaction>,
}
