use std::sync::Once;

use metrics::{Unit, describe_counter};
use thiserror::Error;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

static METRIC_DESCRIPTIONS: Once = Once::new();

#[derive(Debug, Error)]
#[error("telemetry setup failed: {0}")]
pub struct TelemetryError(String);

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), TelemetryError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::from(logging.level).into())
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
        .map_err(|err| TelemetryError(format!("failed to install tracing subscriber: {err}")))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "raffica_cache_hit_total",
            Unit::Count,
            "Total number of response-cache hits."
        );
        describe_counter!(
            "raffica_cache_miss_total",
            Unit::Count,
            "Total number of response-cache misses."
        );
        describe_counter!(
            "raffica_cache_not_modified_total",
            Unit::Count,
            "Total number of conditional GETs answered without a body."
        );
        describe_counter!(
            "raffica_cache_store_total",
            Unit::Count,
            "Total number of responses written to the cache."
        );
        describe_counter!(
            "raffica_cache_degraded_total",
            Unit::Count,
            "Total number of cache operations degraded by store failures."
        );
        describe_counter!(
            "raffica_invalidation_purged_total",
            Unit::Count,
            "Total number of cache keys purged through tag invalidation."
        );
        describe_counter!(
            "raffica_invalidation_failed_total",
            Unit::Count,
            "Total number of tags whose invalidation did not complete."
        );
        describe_counter!(
            "raffica_log_append_total",
            Unit::Count,
            "Total number of conversation turns appended."
        );
        describe_counter!(
            "raffica_log_degraded_total",
            Unit::Count,
            "Total number of conversation-log operations degraded by store failures."
        );
        describe_counter!(
            "raffica_rate_denied_total",
            Unit::Count,
            "Total number of requests denied by a rate window."
        );
        describe_counter!(
            "raffica_rate_degraded_total",
            Unit::Count,
            "Total number of rate checks allowed because the store was unreachable."
        );
        describe_counter!(
            "raffica_revocation_denied_total",
            Unit::Count,
            "Total number of credentials denied by the revocation set."
        );
        describe_counter!(
            "raffica_store_timeout_total",
            Unit::Count,
            "Total number of store calls cancelled at their deadline."
        );
    });
}
