//! Cache key derivation and reverse pattern enumeration.
//!
//! Every cache key follows `{version}:{content-type}:{subtype}:{identifier}:{ctx}`.
//! The version prefix namespaces the payload schema: bumping it orphans
//! every entry written under the old shape instead of colliding with it.
//! Filter sets are hashed (stable, order-independent) rather than
//! concatenated so list keys stay bounded.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Payload schema version baked into every key.
pub const SCHEMA_VERSION: &str = "v1";

/// Hard ceiling on derived key length; the backing cache protocol bounds
/// keys to roughly this size.
pub const MAX_KEY_LEN: usize = 250;

/// Hex characters of the truncated SHA-256 filter digest (64 bits).
const FILTER_DIGEST_LEN: usize = 16;

/// Viewer scope baked into the key suffix. The cacheable aggregated view is
/// always derived under `Anonymous`; `User` keys exist for the list/activity
/// surfaces a personalized caller may cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewerContext {
    Anonymous,
    User(Uuid),
}

impl fmt::Display for ViewerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerContext::Anonymous => f.write_str("anonymous"),
            ViewerContext::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// A key-prefix template identifying the set of concrete keys purged in
/// response to a mutation. Matching is prefix-based, never an enumeration
/// of every concrete key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPattern(String);

impl KeyPattern {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }

    pub fn prefix(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, key: &str) -> bool {
        key.starts_with(&self.0)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*", self.0)
    }
}

/// Derives cache keys and the purge patterns that cover them.
///
/// Derivation is idempotent: the same logical query always yields the same
/// string, and two distinct logical queries differ in at least one segment
/// (or in the 64-bit filter digest).
#[derive(Debug, Clone, Default)]
pub struct CacheKeyManager;

impl CacheKeyManager {
    pub fn new() -> Self {
        Self
    }

    /// Key for the viewer-independent aggregated view of one content id.
    pub fn content_detail(&self, content_id: Uuid) -> String {
        self.assemble("content", "detail", &content_id.to_string(), ViewerContext::Anonymous)
    }

    /// Key for the slug → content id mapping consulted on slug reads.
    /// Holds only the id, so comment/reaction churn never stales it.
    pub fn slug_mapping(&self, slug: &str) -> String {
        self.assemble("content", "slug", &bound_segment(slug), ViewerContext::Anonymous)
    }

    /// Key for a content's comment-list surface.
    pub fn comment_list(&self, content_id: Uuid) -> String {
        self.assemble("content", "comments", &content_id.to_string(), ViewerContext::Anonymous)
    }

    /// Key for a filtered content list. The filter map is hashed, not
    /// concatenated; map ordering cannot change the key.
    pub fn content_list(&self, filters: &BTreeMap<String, String>, ctx: ViewerContext) -> String {
        self.assemble("content", "list", &hash_filters(filters), ctx)
    }

    /// Key for a user's activity surface.
    pub fn user_activity(&self, user_id: Uuid) -> String {
        self.assemble("user", "activity", &user_id.to_string(), ViewerContext::Anonymous)
    }

    fn assemble(&self, kind: &str, subtype: &str, identifier: &str, ctx: ViewerContext) -> String {
        format!("{SCHEMA_VERSION}:{kind}:{subtype}:{identifier}:{ctx}")
    }

    // Reverse operations: the patterns a mutation must purge.

    pub fn detail_pattern(&self, content_id: Uuid) -> KeyPattern {
        KeyPattern::new(format!("{SCHEMA_VERSION}:content:detail:{content_id}:"))
    }

    pub fn slug_pattern(&self, slug: &str) -> KeyPattern {
        let segment = bound_segment(slug);
        KeyPattern::new(format!("{SCHEMA_VERSION}:content:slug:{segment}:"))
    }

    pub fn comment_list_pattern(&self, content_id: Uuid) -> KeyPattern {
        KeyPattern::new(format!("{SCHEMA_VERSION}:content:comments:{content_id}:"))
    }

    pub fn content_list_pattern(&self) -> KeyPattern {
        KeyPattern::new(format!("{SCHEMA_VERSION}:content:list:"))
    }

    pub fn user_activity_pattern(&self, user_id: Uuid) -> KeyPattern {
        KeyPattern::new(format!("{SCHEMA_VERSION}:user:activity:{user_id}:"))
    }
}

/// Stable, order-independent digest over a filter map. BTreeMap iteration is
/// already sorted by key, so equal maps hash identically regardless of how
/// they were built. 64 bits keeps collision probability for realistic
/// filter cardinalities below 1e-9.
pub fn hash_filters(filters: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in filters {
        hasher.update(key.as_bytes());
        hasher.update([0x1f]);
        hasher.update(value.as_bytes());
        hasher.update([0x1e]);
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..FILTER_DIGEST_LEN / 2])
}

/// Slugs are the only unbounded key segment. Oversized ones are replaced by
/// their digest so the full key stays inside the protocol's length bound;
/// the substitution happens before assembly, so keys and their purge
/// patterns always agree.
fn bound_segment(segment: &str) -> String {
    const MAX_SEGMENT_LEN: usize = MAX_KEY_LEN - 64;
    if segment.len() <= MAX_SEGMENT_LEN {
        return segment.to_string();
    }
    let digest = Sha256::digest(segment.as_bytes());
    format!("x{}", hex::encode(&digest[..FILTER_DIGEST_LEN]))
}
