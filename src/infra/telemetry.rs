use std::sync::Once;

use metrics::{Unit, describe_counter};
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

/// Register descriptions for every counter the crate emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "lectern_content_cache_hit_total",
            Unit::Count,
            "Content cache hits, labelled by entry kind."
        );
        describe_counter!(
            "lectern_content_cache_miss_total",
            Unit::Count,
            "Content cache misses, labelled by entry kind."
        );
        describe_counter!(
            "lectern_counter_cache_hit_total",
            Unit::Count,
            "Interaction aggregate reads served from the counter cache."
        );
        describe_counter!(
            "lectern_counter_cache_miss_total",
            Unit::Count,
            "Interaction aggregate reads that fell through to the store."
        );
        describe_counter!(
            "lectern_write_back_completed_total",
            Unit::Count,
            "Detached cache write-backs that finished successfully."
        );
        describe_counter!(
            "lectern_write_back_failed_total",
            Unit::Count,
            "Detached cache write-backs that returned an error."
        );
        describe_counter!(
            "lectern_write_back_dropped_total",
            Unit::Count,
            "Write-backs dropped because the pool was saturated."
        );
        describe_counter!(
            "lectern_write_back_timed_out_total",
            Unit::Count,
            "Write-backs cut off by their timeout."
        );
        describe_counter!(
            "lectern_publish_retry_total",
            Unit::Count,
            "Failed published-copy writes in split publish mode."
        );
    });
}
