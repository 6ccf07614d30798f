//! Content detail read path: cache-first assembly of the aggregated view,
//! live personalization, and the mutation hook that feeds the invalidation
//! bus.
//!
//! The cacheable payload is strictly viewer-independent. Detail views are
//! keyed by content id only; a slug lookup goes through a separately cached
//! slug-to-id mapping so that comment and reaction events, which carry only
//! the content id, can reach every cached rendering of the content.
//!
//! Degradation rules: a cache failure falls back to live aggregation, a
//! personalization failure serves the view without viewer state. Only a
//! failure of the source of truth itself surfaces to the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::cache::{
    CacheError, CacheKeyManager, CacheTier, EventContext, InvalidationBus, TieredStore,
    TriggerKind,
};
use crate::domain::entities::{AggregatedView, ContentDetail, ViewerReaction};
use crate::domain::types::ContentIdentifier;
use crate::infra::ConnectionManager;
use crate::pipeline::{DetailOptions, PipelineExecutor, build_detail_plan};

use super::error::EngineError;
use super::repos::ReactionsRepo;
use super::retry::RetryPolicy;

pub struct ContentDetailService {
    executor: PipelineExecutor,
    store: Arc<TieredStore>,
    keys: Arc<CacheKeyManager>,
    bus: Arc<InvalidationBus>,
    pool: Arc<ConnectionManager>,
    reactions: Arc<dyn ReactionsRepo>,
    query_timeout: Duration,
    retry: RetryPolicy,
}

impl ContentDetailService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        executor: PipelineExecutor,
        store: Arc<TieredStore>,
        keys: Arc<CacheKeyManager>,
        bus: Arc<InvalidationBus>,
        pool: Arc<ConnectionManager>,
        reactions: Arc<dyn ReactionsRepo>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            store,
            keys,
            bus,
            pool,
            reactions,
            query_timeout,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy applied to source-of-truth aggregation.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn bus(&self) -> &Arc<InvalidationBus> {
        &self.bus
    }

    /// Assemble the detail view for one piece of content.
    ///
    /// The shared aggregate comes from the cache when possible; viewer state
    /// is always fetched live and merged last, so two viewers reading the
    /// same content share one cached payload.
    #[instrument(skip(self), fields(identifier = %identifier))]
    pub async fn get_content_detail(
        &self,
        identifier: &ContentIdentifier,
        viewer: Option<Uuid>,
    ) -> Result<ContentDetail, EngineError> {
        let known_id = match identifier {
            ContentIdentifier::Id(id) => Some(*id),
            ContentIdentifier::Slug(slug) => self.resolve_slug(slug).await,
        };

        let (view, viewer_state) = match (known_id, viewer) {
            (Some(id), Some(user)) => {
                // Both legs are independent of each other; run them together.
                let (view, state) =
                    tokio::join!(self.view_by_id(id), self.viewer_state(id, user));
                (view?, state)
            }
            (Some(id), None) => (self.view_by_id(id).await?, None),
            (None, _) => {
                // Cold slug path: the id is unknown until the aggregate
                // resolves, so personalization has to wait for it.
                let view = self.view_by_identifier(identifier).await?;
                let state = match viewer {
                    Some(user) => self.viewer_state(view.content.id, user).await,
                    None => None,
                };
                (view, state)
            }
        };

        Ok(ContentDetail {
            view,
            viewer: viewer_state,
        })
    }

    /// A write operation happened; enqueue its invalidation. Returns
    /// immediately, the purge rides the background drain.
    pub fn notify_mutation(&self, kind: TriggerKind, context: EventContext) {
        self.bus.publish(kind, context);
    }

    /// Rebuild one content detail aggregate and cache it, bypassing any
    /// cached copy. Used by write paths that want the next read warm.
    pub async fn refresh_content_detail(&self, content_id: Uuid) -> Result<(), EngineError> {
        let built_at = Instant::now();
        let identifier = ContentIdentifier::Id(content_id);
        let Some(view) = self.aggregate(&identifier).await? else {
            return Err(EngineError::NotFound);
        };
        self.write_back(&view, built_at).await
    }

    async fn view_by_id(&self, content_id: Uuid) -> Result<AggregatedView, EngineError> {
        if let Some(view) = self.cached_view(content_id).await {
            return Ok(view);
        }
        self.view_by_identifier(&ContentIdentifier::Id(content_id))
            .await
    }

    /// Cache miss path: aggregate live, then write back. A fenced write
    /// means an invalidation landed mid-build; the aggregate is rebuilt once
    /// so the cache can only ever hold post-purge data. The caller still
    /// gets the freshest build either way.
    async fn view_by_identifier(
        &self,
        identifier: &ContentIdentifier,
    ) -> Result<AggregatedView, EngineError> {
        let built_at = Instant::now();
        let Some(view) = self.aggregate(identifier).await? else {
            return Err(EngineError::NotFound);
        };

        match self.write_back(&view, built_at).await {
            Ok(()) => Ok(view),
            Err(EngineError::Conflict) => {
                debug!(content_id = %view.content.id, "cache write fenced, rebuilding once");
                let rebuilt_at = Instant::now();
                match self.aggregate(identifier).await? {
                    Some(fresh) => {
                        if let Err(err) = self.write_back(&fresh, rebuilt_at).await {
                            debug!(content_id = %fresh.content.id, error = %err, "second fence, serving uncached");
                        }
                        Ok(fresh)
                    }
                    // Deleted between the builds; the purge was the point.
                    None => Err(EngineError::NotFound),
                }
            }
            Err(err) => {
                warn!(error = %err, "cache write-back failed, serving uncached");
                Ok(view)
            }
        }
    }

    /// Run the aggregation with the retry policy: transient failures back
    /// off and retry, everything else surfaces immediately.
    async fn aggregate(
        &self,
        identifier: &ContentIdentifier,
    ) -> Result<Option<AggregatedView>, EngineError> {
        let mut last_err = None;
        for attempt in self.retry.attempts() {
            let delay = self.retry.delay_for(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match self.aggregate_once(identifier).await {
                Ok(view) => return Ok(view),
                Err(err) if err.is_retryable() => {
                    warn!(attempt, error = %err, "aggregation attempt failed");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err
            .unwrap_or_else(|| EngineError::unavailable("aggregation retries exhausted")))
    }

    /// One aggregation round trip under a pool checkout and the query
    /// timeout, feeding the circuit breaker with the outcome.
    async fn aggregate_once(
        &self,
        identifier: &ContentIdentifier,
    ) -> Result<Option<AggregatedView>, EngineError> {
        let guard = self.pool.acquire().await?;
        let plan = build_detail_plan(identifier, &DetailOptions::default());

        let outcome =
            tokio::time::timeout(self.query_timeout, self.executor.run_detail(&plan)).await;
        drop(guard);

        match outcome {
            Ok(Ok(view)) => {
                self.pool.record_success();
                Ok(view)
            }
            Ok(Err(err)) => {
                self.pool.record_failure();
                Err(err.into())
            }
            Err(_) => {
                self.pool.record_failure();
                Err(EngineError::timeout("content aggregation"))
            }
        }
    }

    async fn cached_view(&self, content_id: Uuid) -> Option<AggregatedView> {
        let key = self.keys.content_detail(content_id);
        match self.store.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(view) => Some(view),
                Err(err) => {
                    warn!(%key, error = %err, "cached payload failed to decode, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(%key, error = %err, "cache read failed, degrading to live aggregation");
                None
            }
        }
    }

    async fn resolve_slug(&self, slug: &str) -> Option<Uuid> {
        let key = self.keys.slug_mapping(slug);
        match self.store.get(&key).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).ok(),
            Ok(None) => None,
            Err(err) => {
                warn!(%key, error = %err, "slug mapping read failed, degrading to live lookup");
                None
            }
        }
    }

    /// Viewer state is never part of the cached payload; it is read live on
    /// every request and dropped on failure rather than failing the read.
    async fn viewer_state(&self, content_id: Uuid, viewer: Uuid) -> Option<ViewerReaction> {
        let outcome = tokio::time::timeout(
            self.query_timeout,
            self.reactions.viewer_reaction(content_id, viewer),
        )
        .await;
        match outcome {
            Ok(Ok(state)) => Some(state),
            Ok(Err(err)) => {
                warn!(%content_id, %viewer, error = %err, "viewer state lookup failed, serving unpersonalized");
                None
            }
            Err(_) => {
                warn!(%content_id, %viewer, "viewer state lookup timed out, serving unpersonalized");
                None
            }
        }
    }

    /// Write the aggregate and its slug mapping to the cache. Maps a fence
    /// rejection to [`EngineError::Conflict`] so callers can decide whether
    /// to rebuild.
    async fn write_back(&self, view: &AggregatedView, built_at: Instant) -> Result<(), EngineError> {
        let payload = serde_json::to_vec(view)
            .map_err(|err| EngineError::unavailable(format!("payload encoding: {err}")))?;

        let detail_key = self.keys.content_detail(view.content.id);
        self.store
            .set(&detail_key, Bytes::from(payload), CacheTier::Warm, built_at)
            .await
            .map_err(map_cache_write)?;

        let id_payload = serde_json::to_vec(&view.content.id)
            .map_err(|err| EngineError::unavailable(format!("payload encoding: {err}")))?;
        let slug_key = self.keys.slug_mapping(&view.content.slug);
        self.store
            .set(&slug_key, Bytes::from(id_payload), CacheTier::Frozen, built_at)
            .await
            .map_err(map_cache_write)?;

        Ok(())
    }
}

fn map_cache_write(err: CacheError) -> EngineError {
    match err {
        CacheError::Fenced => EngineError::Conflict,
        CacheError::Backend(detail) => EngineError::unavailable(detail),
    }
}
