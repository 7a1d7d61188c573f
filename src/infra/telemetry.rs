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
            "quire_cache_hit_total",
            Unit::Count,
            "Total number of read-through cache hits."
        );
        describe_counter!(
            "quire_cache_miss_total",
            Unit::Count,
            "Total number of read-through cache misses, labelled by reason."
        );
        describe_counter!(
            "quire_cache_decode_failure_total",
            Unit::Count,
            "Total number of cached payloads that failed to decode."
        );
        describe_counter!(
            "quire_cache_write_failure_total",
            Unit::Count,
            "Total number of cache writes that failed, labelled by stage."
        );
        describe_counter!(
            "quire_cache_version_bump_total",
            Unit::Count,
            "Total number of namespace version bumps, labelled by mode."
        );
        describe_gauge!(
            "quire_cache_background_pending",
            Unit::Count,
            "Current number of background cache writes in flight."
        );
        describe_histogram!(
            "quire_cache_compute_ms",
            Unit::Milliseconds,
            "Latency of computing a value on cache miss, in milliseconds."
        );
    });
}
