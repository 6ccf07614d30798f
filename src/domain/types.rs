//! Shared domain enumerations and identifier types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    Published,
    Removed,
}

impl ContentStatus {
    pub fn is_active(self) -> bool {
        matches!(self, ContentStatus::Published)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    Like,
    Dislike,
    Bookmark,
}

impl ReactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReactionKind::Like => "like",
            ReactionKind::Dislike => "dislike",
            ReactionKind::Bookmark => "bookmark",
        }
    }
}

/// How a caller addresses a content document: by opaque id or by its
/// human-readable slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentIdentifier {
    Id(Uuid),
    Slug(String),
}

impl From<Uuid> for ContentIdentifier {
    fn from(id: Uuid) -> Self {
        ContentIdentifier::Id(id)
    }
}

impl ContentIdentifier {
    pub fn slug(slug: impl Into<String>) -> Self {
        ContentIdentifier::Slug(slug.into())
    }
}

impl std::fmt::Display for ContentIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentIdentifier::Id(id) => write!(f, "id:{id}"),
            ContentIdentifier::Slug(slug) => write!(f, "slug:{slug}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_published_content_is_active() {
        assert!(ContentStatus::Published.is_active());
        assert!(!ContentStatus::Draft.is_active());
        assert!(!ContentStatus::Removed.is_active());
    }

    #[test]
    fn reaction_kind_labels() {
        assert_eq!(ReactionKind::Like.as_str(), "like");
        assert_eq!(ReactionKind::Bookmark.as_str(), "bookmark");
    }
}
