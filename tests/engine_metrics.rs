//! Verifies that the engine's hot paths emit their metric keys.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use metrics_util::debugging::DebuggingRecorder;
use time::OffsetDateTime;
use uuid::Uuid;

use agora_engine::application::{
    BatchLoader, CommentsRepo, DocumentStore, ReactionsRepo, RepoError, UserLookup,
};
use agora_engine::cache::{
    CacheConfig, CacheKeyManager, CacheTier, EventContext, InvalidationBus, TieredStore,
    TriggerKind,
};
use agora_engine::domain::entities::{
    AuthorSummary, CommentAggregate, ContentRecord, ReactionAggregate, ViewerReaction,
};
use agora_engine::domain::types::{ContentIdentifier, ContentStatus};
use agora_engine::infra::MemoryBackend;
use agora_engine::pipeline::{DetailOptions, PipelineExecutor, build_detail_plan};

struct OnePost {
    record: ContentRecord,
}

#[async_trait]
impl DocumentStore for OnePost {
    async fn fetch_content(
        &self,
        identifier: &ContentIdentifier,
    ) -> Result<Option<ContentRecord>, RepoError> {
        Ok(match identifier {
            ContentIdentifier::Id(id) if *id == self.record.id => Some(self.record.clone()),
            ContentIdentifier::Slug(slug) if *slug == self.record.slug => {
                Some(self.record.clone())
            }
            _ => None,
        })
    }
}

struct NobodyHome;

#[async_trait]
impl UserLookup for NobodyHome {
    async fn get_users_by_ids(
        &self,
        _ids: &[Uuid],
    ) -> Result<HashMap<Uuid, AuthorSummary>, RepoError> {
        Ok(HashMap::new())
    }
}

#[async_trait]
impl CommentsRepo for NobodyHome {
    async fn count_and_preview(&self, _content_id: Uuid) -> Result<CommentAggregate, RepoError> {
        Ok(CommentAggregate::default())
    }
}

#[async_trait]
impl ReactionsRepo for NobodyHome {
    async fn tally(&self, _content_id: Uuid) -> Result<ReactionAggregate, RepoError> {
        Ok(ReactionAggregate::default())
    }

    async fn viewer_reaction(
        &self,
        _content_id: Uuid,
        _viewer: Uuid,
    ) -> Result<ViewerReaction, RepoError> {
        Ok(ViewerReaction::default())
    }
}

#[tokio::test]
async fn engine_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Tiered store hit, miss, and a fenced write.
    let config = CacheConfig {
        queue_capacity: 1,
        purge_backoff_ms: 1,
        ..Default::default()
    };
    let backend = Arc::new(MemoryBackend::new(&config));
    let store = Arc::new(TieredStore::new(backend, config.clone()));
    let keys = Arc::new(CacheKeyManager::new());

    let content_id = Uuid::new_v4();
    let detail_key = keys.content_detail(content_id);
    let stale_build = Instant::now();
    store
        .set(&detail_key, Bytes::from_static(b"{}"), CacheTier::Warm, stale_build)
        .await
        .expect("set");
    store.get(&detail_key).await.expect("hit");
    store.get("v1:content:detail:missing:anonymous").await.expect("miss");

    // Queue overflow (capacity 1) plus a drained purge batch.
    let bus = InvalidationBus::new(store.clone(), keys.clone(), config);
    bus.publish(TriggerKind::ReactionChanged, EventContext::for_content(content_id));
    bus.publish(TriggerKind::ReactionChanged, EventContext::for_content(content_id));
    bus.drain_now().await;

    // The purge fenced this key; a write built beforehand must bounce.
    assert!(
        store
            .set(&detail_key, Bytes::from_static(b"{}"), CacheTier::Warm, stale_build)
            .await
            .is_err()
    );

    // One aggregation round trip.
    let record = ContentRecord {
        id: content_id,
        slug: "metrics-post".to_string(),
        author_id: Uuid::new_v4(),
        title: "Metrics".to_string(),
        body: String::new(),
        status: ContentStatus::Published,
        metadata: Default::default(),
        created_at: OffsetDateTime::now_utc(),
        updated_at: OffsetDateTime::now_utc(),
    };
    let executor = PipelineExecutor::new(
        Arc::new(OnePost { record }),
        BatchLoader::new(Arc::new(NobodyHome)),
        Arc::new(NobodyHome),
        Arc::new(NobodyHome),
    );
    let plan = build_detail_plan(&ContentIdentifier::Id(content_id), &DetailOptions::default());
    executor.run_detail(&plan).await.expect("aggregate");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "agora_cache_hit_total",
        "agora_cache_miss_total",
        "agora_cache_fenced_total",
        "agora_invalidation_queue_len",
        "agora_invalidation_dropped_total",
        "agora_purge_batch_ms",
        "agora_aggregate_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
