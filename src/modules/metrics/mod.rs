// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::LazyLock;

use crate::mailcast_version;
use crate::{
    modules::{context::Initialize, error::MailcastResult},
    utc_now,
};
use prometheus::{
    register_counter, register_gauge, register_gauge_vec, register_histogram_vec,
    register_int_counter, register_int_counter_vec, Counter, Gauge, GaugeVec, HistogramVec,
    IntCounter, IntCounterVec,
};

pub mod endpoint;

// Metric name constants
pub const METRIC_EMAILS_PROCESSED_TOTAL: &str = "campaign_emails_processed_total";
pub const METRIC_EMAILS_FAILED_TOTAL: &str = "campaign_emails_failed_total";
pub const METRIC_THROTTLE_EXCEPTIONS_TOTAL: &str = "campaign_throttle_exceptions_total";
pub const METRIC_ATTACHMENT_DELAYS_TOTAL: &str = "campaign_attachment_delays_total";
pub const METRIC_INCOMPLETE_COMPLETION_PERCENTAGE: &str =
    "campaign_incomplete_completion_percentage";
pub const METRIC_TRANSPORT_VALIDATION_ERRORS_TOTAL: &str =
    "campaign_transport_validation_errors_total";
pub const METRIC_SEND_DURATION_SECONDS: &str = "campaign_send_duration_seconds";
pub const METRIC_ATTACHMENT_BYTES_TOTAL: &str = "campaign_attachment_bytes_total";
pub const METRIC_BATCH_DELAY_SECONDS_TOTAL: &str = "campaign_batch_delay_seconds_total";
pub const METRIC_BUILD_INFO: &str = "mailcast_build_info";
pub const METRIC_START_TIMESTAMP: &str = "mailcast_start_timestamp";

pub static MAILCAST_BUILD_INFO: LazyLock<GaugeVec> = LazyLock::new(|| {
    register_gauge_vec!(
        METRIC_BUILD_INFO,
        "Build information including version and commit hash",
        &["version", "commit"]
    )
    .expect("Failed to register mailcast_build_info")
});

pub static MAILCAST_START_TIMESTAMP: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge!(
        METRIC_START_TIMESTAMP,
        "Unix timestamp when the worker started"
    )
    .expect("Failed to register mailcast_start_timestamp")
});

pub static CAMPAIGN_EMAILS_PROCESSED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        METRIC_EMAILS_PROCESSED_TOTAL,
        "Total number of campaign emails accepted by the transport"
    )
    .expect("Failed to register campaign_emails_processed_total")
});

pub static CAMPAIGN_EMAILS_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        METRIC_EMAILS_FAILED_TOTAL,
        "Total number of campaign emails that failed permanently"
    )
    .expect("Failed to register campaign_emails_failed_total")
});

pub static CAMPAIGN_THROTTLE_EXCEPTIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        METRIC_THROTTLE_EXCEPTIONS_TOTAL,
        "Total number of throttling responses returned by the transport"
    )
    .expect("Failed to register campaign_throttle_exceptions_total")
});

pub static CAMPAIGN_ATTACHMENT_DELAYS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        METRIC_ATTACHMENT_DELAYS_TOTAL,
        "Total number of sends whose delay was raised because of attachment size"
    )
    .expect("Failed to register campaign_attachment_delays_total")
});

pub static CAMPAIGN_INCOMPLETE_COMPLETION: LazyLock<GaugeVec> = LazyLock::new(|| {
    register_gauge_vec!(
        METRIC_INCOMPLETE_COMPLETION_PERCENTAGE,
        "Completion percentage of campaigns that are still being delivered",
        &["campaign_id"]
    )
    .expect("Failed to register campaign_incomplete_completion_percentage")
});

pub static CAMPAIGN_VALIDATION_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        METRIC_TRANSPORT_VALIDATION_ERRORS_TOTAL,
        "Validation errors detected before or during a send, grouped by error type",
        &["error_type"]
    )
    .expect("Failed to register campaign_transport_validation_errors_total")
});

pub static CAMPAIGN_SEND_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        METRIC_SEND_DURATION_SECONDS,
        "Distribution of transport send latency in seconds, grouped by outcome",
        &["status"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register campaign_send_duration_seconds")
});

pub static CAMPAIGN_ATTACHMENT_BYTES: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        METRIC_ATTACHMENT_BYTES_TOTAL,
        "Total attachment bytes handed to the transport"
    )
    .expect("Failed to register campaign_attachment_bytes_total")
});

pub static CAMPAIGN_BATCH_DELAY: LazyLock<Counter> = LazyLock::new(|| {
    register_counter!(
        METRIC_BATCH_DELAY_SECONDS_TOTAL,
        "Total rate-control delay applied by worker invocations, in seconds"
    )
    .expect("Failed to register campaign_batch_delay_seconds_total")
});

pub struct MetricsService;

impl Initialize for MetricsService {
    async fn initialize() -> MailcastResult<()> {
        let now = utc_now!();
        MAILCAST_START_TIMESTAMP.set(now as f64);
        let version = mailcast_version!();
        let commit = env!("GIT_HASH");
        MAILCAST_BUILD_INFO
            .with_label_values(&[version, commit])
            .set(1.0);
        Ok(())
    }
}
