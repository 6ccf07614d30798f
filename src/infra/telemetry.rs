use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "agora_cache_hit_total",
            Unit::Count,
            "Total number of cache hits across all tiers."
        );
        describe_counter!(
            "agora_cache_miss_total",
            Unit::Count,
            "Total number of cache misses across all tiers."
        );
        describe_counter!(
            "agora_cache_fenced_total",
            Unit::Count,
            "Total number of cache writes rejected by an invalidation fence."
        );
        describe_counter!(
            "agora_cache_evict_total",
            Unit::Count,
            "Total number of cache evictions due to capacity."
        );
        describe_gauge!(
            "agora_invalidation_queue_len",
            Unit::Count,
            "Current number of pending invalidation events in the queue."
        );
        describe_counter!(
            "agora_invalidation_dropped_total",
            Unit::Count,
            "Total number of invalidation events dropped due to queue overflow."
        );
        describe_histogram!(
            "agora_purge_batch_ms",
            Unit::Milliseconds,
            "Invalidation batch execution latency in milliseconds."
        );
        describe_histogram!(
            "agora_aggregate_ms",
            Unit::Milliseconds,
            "Aggregation pipeline execution latency in milliseconds."
        );
        describe_counter!(
            "agora_breaker_open_total",
            Unit::Count,
            "Total number of circuit breaker open transitions."
        );
    });
}
