//! Purge planning: collapse a batch of invalidation events into the minimal
//! ordered set of key patterns to delete.
//!
//! Planning is where event semantics live. Each trigger kind maps to a fixed
//! pattern set; the planner dedupes replayed events by id, groups events by
//! content id, and dedupes the resulting patterns while preserving
//! epoch-derived order. Every surviving event contributes its full pattern
//! set: a batch may carry several distinct mutations for one content id and
//! each one must still reach the surfaces it touches.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use super::events::{Epoch, InvalidationEvent, TriggerKind};
use super::keys::{CacheKeyManager, KeyPattern};

/// The patterns one drain batch must purge.
#[derive(Debug, Clone)]
pub struct PurgePlan {
    patterns: Vec<KeyPattern>,
}

impl PurgePlan {
    /// Build a plan from a drained event batch.
    ///
    /// Events sharing a content id are grouped and their pattern sets
    /// unioned; the group's highest epoch decides cross-id ordering, and
    /// within a group events replay in epoch order. The epoch collapse only
    /// ever orders, it never drops a mutation's patterns: a comment event
    /// followed by a reaction event for the same content must still purge
    /// the comment-list surface. Events without a content id (user profile
    /// changes) are planned individually after the grouped ones.
    pub fn from_events(events: &[InvalidationEvent], keys: &CacheKeyManager) -> Self {
        let mut seen_ids = HashSet::new();
        let mut per_content: HashMap<Uuid, Vec<&InvalidationEvent>> = HashMap::new();
        let mut standalone = Vec::new();

        for event in events {
            if !seen_ids.insert(event.id) {
                continue;
            }
            match event.context.content_id {
                Some(content_id) => per_content.entry(content_id).or_default().push(event),
                None => standalone.push(event),
            }
        }

        let mut groups: Vec<(Epoch, Vec<&InvalidationEvent>)> = per_content
            .into_values()
            .map(|mut group| {
                group.sort_by_key(|event| event.epoch);
                let latest = group.last().map(|event| event.epoch).unwrap_or_default();
                (latest, group)
            })
            .collect();
        groups.sort_by_key(|(latest, _)| *latest);

        let ordered = groups
            .into_iter()
            .flat_map(|(_, group)| group)
            .chain(standalone);

        let mut patterns = Vec::new();
        let mut dedup = HashSet::new();
        for event in ordered {
            for pattern in patterns_for(event, keys) {
                if dedup.insert(pattern.prefix().to_string()) {
                    patterns.push(pattern);
                }
            }
        }

        Self { patterns }
    }

    pub fn patterns(&self) -> &[KeyPattern] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }
}

/// Static trigger-to-pattern table.
///
/// Detail views are keyed by content id, so comment and reaction events reach
/// them without knowing the slug. Slug mappings are only purged when the
/// content itself changes, since only those events carry the slug. An author
/// rename purges the author's own activity views and otherwise rides out the
/// TTL of any detail view embedding the old name.
fn patterns_for(event: &InvalidationEvent, keys: &CacheKeyManager) -> Vec<KeyPattern> {
    let ctx = &event.context;
    let mut patterns = Vec::new();

    match event.kind {
        TriggerKind::ContentCreated => {
            patterns.push(keys.content_list_pattern());
        }
        TriggerKind::ContentUpdated | TriggerKind::ContentDeleted => {
            if let Some(content_id) = ctx.content_id {
                patterns.push(keys.detail_pattern(content_id));
                if event.kind == TriggerKind::ContentDeleted {
                    patterns.push(keys.comment_list_pattern(content_id));
                }
            }
            if let Some(slug) = &ctx.slug {
                patterns.push(keys.slug_pattern(slug));
            }
            patterns.push(keys.content_list_pattern());
        }
        TriggerKind::CommentCreated | TriggerKind::CommentUpdated | TriggerKind::CommentDeleted => {
            if let Some(content_id) = ctx.content_id {
                patterns.push(keys.detail_pattern(content_id));
                patterns.push(keys.comment_list_pattern(content_id));
            }
        }
        TriggerKind::ReactionChanged | TriggerKind::BookmarkChanged => {
            if let Some(content_id) = ctx.content_id {
                patterns.push(keys.detail_pattern(content_id));
            }
        }
        TriggerKind::UserUpdated => {}
    }

    if let Some(user_id) = ctx.user_id {
        patterns.push(keys.user_activity_pattern(user_id));
    }

    patterns
}
