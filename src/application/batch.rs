//! Batch loader for foreign-key resolution.
//!
//! Collapses a set of author ids into one `get_users_by_ids` round trip
//! instead of a lookup per reference.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use crate::application::repos::{RepoError, UserLookup};
use crate::domain::entities::AuthorSummary;

#[derive(Clone)]
pub struct BatchLoader {
    users: Arc<dyn UserLookup>,
}

impl BatchLoader {
    pub fn new(users: Arc<dyn UserLookup>) -> Self {
        Self { users }
    }

    /// Resolve a set of author ids in one round trip. Duplicate ids are
    /// collapsed before the call; ids the lookup cannot resolve are simply
    /// absent from the result map.
    pub async fn load_authors(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, AuthorSummary>, RepoError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let unique: Vec<Uuid> = ids
            .iter()
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        self.users.get_users_by_ids(&unique).await
    }
}
