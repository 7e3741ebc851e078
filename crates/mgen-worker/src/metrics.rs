//! Prometheus metrics for the workers.

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use mgen_models::JobType;

/// Install the Prometheus recorder with a scrape listener on `port`.
/// Must be called from inside a tokio runtime.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .install()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "mgen_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "mgen_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "mgen_jobs_failed_total";
    pub const JOBS_STALLED_TOTAL: &str = "mgen_jobs_stalled_total";
    pub const JOB_DURATION_SECONDS: &str = "mgen_job_duration_seconds";

    pub const DOWNLOAD_DURATION_SECONDS: &str = "mgen_download_duration_seconds";
    pub const MERGE_DURATION_SECONDS: &str = "mgen_merge_duration_seconds";
    pub const UPLOAD_DURATION_SECONDS: &str = "mgen_upload_duration_seconds";
}

pub fn record_job_started(queue: JobType) {
    let labels = [("queue", queue.as_str())];
    counter!(names::JOBS_STARTED_TOTAL, &labels).increment(1);
}

pub fn record_job_completed(queue: JobType, duration_secs: f64) {
    let labels = [("queue", queue.as_str())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a failed attempt; `will_retry` separates retries from final failures.
pub fn record_job_failed(queue: JobType, will_retry: bool, duration_secs: f64) {
    let labels = [
        ("queue", queue.as_str()),
        ("final", if will_retry { "false" } else { "true" }),
    ];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels[..1]).record(duration_secs);
}

pub fn record_job_stalled(queue: JobType) {
    let labels = [("queue", queue.as_str())];
    counter!(names::JOBS_STALLED_TOTAL, &labels).increment(1);
}

pub fn record_download_duration(duration_secs: f64) {
    histogram!(names::DOWNLOAD_DURATION_SECONDS).record(duration_secs);
}

pub fn record_merge_duration(duration_secs: f64) {
    histogram!(names::MERGE_DURATION_SECONDS).record(duration_secs);
}

pub fn record_upload_duration(duration_secs: f64) {
    histogram!(names::UPLOAD_DURATION_SECONDS).record(duration_secs);
}
