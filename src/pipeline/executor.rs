//! Plan executor: runs an aggregation plan against the repository seams and
//! assembles the viewer-independent aggregated view.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{debug, instrument};

use crate::application::batch::BatchLoader;
use crate::application::repos::{CommentsRepo, DocumentStore, ReactionsRepo, RepoError};
use crate::domain::entities::{AggregatedView, AuthorSummary};
use crate::pipeline::plan::AggregationPlan;

const METRIC_AGGREGATE_MS: &str = "agora_aggregate_ms";

/// Interprets an [`AggregationPlan`] against the document store and the
/// collaborator repositories. Pure read path: never writes, never caches.
pub struct PipelineExecutor {
    store: Arc<dyn DocumentStore>,
    authors: BatchLoader,
    comments: Arc<dyn CommentsRepo>,
    reactions: Arc<dyn ReactionsRepo>,
}

impl PipelineExecutor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        authors: BatchLoader,
        comments: Arc<dyn CommentsRepo>,
        reactions: Arc<dyn ReactionsRepo>,
    ) -> Self {
        Self {
            store,
            authors,
            comments,
            reactions,
        }
    }

    /// Run a detail plan. `Ok(None)` is the not-found outcome: the match
    /// stage resolved nothing active.
    ///
    /// The child lookups share no mutable state and are issued concurrently;
    /// the merge happens only after all of them complete.
    #[instrument(skip(self, plan))]
    pub async fn run_detail(
        &self,
        plan: &AggregationPlan,
    ) -> Result<Option<AggregatedView>, RepoError> {
        let started_at = Instant::now();

        let matched = plan
            .match_stage()
            .ok_or_else(|| RepoError::from_persistence("plan missing match stage"))?;

        let Some(content) = self.store.fetch_content(&matched.identifier).await? else {
            histogram!(METRIC_AGGREGATE_MS, "outcome" => "not_found")
                .record(started_at.elapsed().as_secs_f64() * 1000.0);
            return Ok(None);
        };
        if content.status != matched.status {
            debug!(content_id = %content.id, status = ?content.status, "Match stage rejected inactive content");
            histogram!(METRIC_AGGREGATE_MS, "outcome" => "not_found")
                .record(started_at.elapsed().as_secs_f64() * 1000.0);
            return Ok(None);
        }

        // Fan out the independent child lookups in one round of suspension.
        let author_ids = [content.author_id];
        let (authors, comments, reactions) = tokio::join!(
            self.authors.load_authors(&author_ids),
            self.comments.count_and_preview(content.id),
            self.reactions.tally(content.id),
        );

        let authors = authors?;
        let mut comments = comments?;
        let reactions = reactions?;

        if let Some(group) = plan.group_stage("comments") {
            let cap = group.preview_limit.unwrap_or(0);
            comments.recent.truncate(cap);
        }

        let author = authors
            .get(&content.author_id)
            .cloned()
            .unwrap_or_else(|| AuthorSummary::unresolved(content.author_id));

        histogram!(METRIC_AGGREGATE_MS, "outcome" => "ok")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        Ok(Some(AggregatedView {
            content,
            author,
            comments,
            reactions,
        }))
    }
}
