//! Typed pipeline stages and the pure plan builder.

use crate::domain::entities::COMMENT_PREVIEW_LIMIT;
use crate::domain::types::{ContentIdentifier, ContentStatus};

/// Fields projected out of the user record for the embedded author summary.
/// Never the full record: bounds payload size and keeps sensitive fields
/// out of cacheable payloads.
pub const AUTHOR_PROJECTION: &[&str] = &["id", "display_name", "handle", "avatar_url"];

/// Match stage: selects exactly one content document by id or slug,
/// restricted to the given status.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchStage {
    pub identifier: ContentIdentifier,
    pub status: ContentStatus,
}

/// Lookup stage: joins a foreign collection, projecting a fixed field list.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupStage {
    pub from: &'static str,
    pub local_field: &'static str,
    pub foreign_field: &'static str,
    pub project: &'static [&'static str],
    pub as_field: &'static str,
}

/// Group stage: a grouped/counting sub-pipeline over a child collection.
/// `preview_limit` caps any embedded document list carried alongside the
/// count; `None` means counts only.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStage {
    pub from: &'static str,
    pub by: &'static str,
    pub count_as: &'static str,
    pub preview_limit: Option<usize>,
}

/// Final merge: one combined add-fields/project step so intermediate join
/// arrays never materialize between stages.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectStage {
    pub merge_fields: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(MatchStage),
    Lookup(LookupStage),
    Group(GroupStage),
    Project(ProjectStage),
}

#[derive(Debug, Clone, Default)]
pub struct DetailOptions {
    /// Skip the recent-comment preview (counts only).
    pub counts_only: bool,
}

/// An ordered stage sequence for one aggregation round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationPlan {
    stages: Vec<Stage>,
}

impl AggregationPlan {
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn match_stage(&self) -> Option<&MatchStage> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::Match(m) => Some(m),
            _ => None,
        })
    }

    pub fn group_stage(&self, from: &str) -> Option<&GroupStage> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::Group(g) if g.from == from => Some(g),
            _ => None,
        })
    }
}

/// Build the content-detail plan for an identifier.
///
/// Stage order: match active content, join the author projection, group
/// comments (count + capped preview), group reactions (counts only), then
/// merge everything in a single project step.
pub fn build_detail_plan(identifier: &ContentIdentifier, options: &DetailOptions) -> AggregationPlan {
    let comment_preview = if options.counts_only {
        None
    } else {
        Some(COMMENT_PREVIEW_LIMIT)
    };

    AggregationPlan {
        stages: vec![
            Stage::Match(MatchStage {
                identifier: identifier.clone(),
                status: ContentStatus::Published,
            }),
            Stage::Lookup(LookupStage {
                from: "users",
                local_field: "author_id",
                foreign_field: "id",
                project: AUTHOR_PROJECTION,
                as_field: "author",
            }),
            Stage::Group(GroupStage {
                from: "comments",
                by: "content_id",
                count_as: "comment_count",
                preview_limit: comment_preview,
            }),
            Stage::Group(GroupStage {
                from: "reactions",
                by: "content_id",
                count_as: "reaction_counts",
                preview_limit: None,
            }),
            Stage::Project(ProjectStage {
                merge_fields: &["author", "comments", "reactions"],
            }),
        ],
    }
}
