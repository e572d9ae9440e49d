//! Metric names mirroring the original `httpsd_*` series, registered once
//! at startup via `metrics::describe_*` so the Prometheus exporter carries
//! help text even before the first observation.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

pub const GENERATOR_REQUESTS_TOTAL: &str = "httpsd_generator_requests_total";
pub const GENERATOR_RUN_DURATION_SECONDS: &str = "httpsd_generator_run_duration_seconds";
pub const GENERATOR_LAST_GENERATED_TARGETS: &str = "httpsd_generator_last_generated_targets";

pub const TARGET_PATH_REQUESTS_TOTAL: &str = "httpsd_target_path_requests_total";
pub const TARGET_PATH_REQUEST_DURATION_SECONDS: &str =
    "httpsd_target_path_request_duration_seconds";
pub const PATH_LAST_GENERATED_TARGETS: &str = "httpsd_path_last_generated_targets";

pub const CACHE_OPERATIONS_TOTAL: &str = "httpsd_cache_operations_total";
pub const QUEUE_JOB_GAUGE: &str = "httpsd_queue_job_gauge";
pub const WORKER_JOBS_PROCESSED_TOTAL: &str = "httpsd_worker_jobs_processed_total";

pub const SINGLE_FLIGHT_ENTRIES: &str = "httpsd_single_flight_entries";
pub const SINGLE_FLIGHT_REAPED_TOTAL: &str = "httpsd_single_flight_reaped_total";
pub const SINGLE_FLIGHT_GC_DURATION_SECONDS: &str = "httpsd_single_flight_gc_duration_seconds";

pub fn describe_all() {
    describe_counter!(
        GENERATOR_REQUESTS_TOTAL,
        "Number of times a generator file was invoked, labeled by status"
    );
    describe_histogram!(
        GENERATOR_RUN_DURATION_SECONDS,
        "Wall-clock time spent running a single generator file"
    );
    describe_gauge!(
        GENERATOR_LAST_GENERATED_TARGETS,
        "Number of targets produced by the last successful run of a generator"
    );
    describe_counter!(
        TARGET_PATH_REQUESTS_TOTAL,
        "Number of /targets requests, labeled by l1_dir, l2_dir and status"
    );
    describe_histogram!(
        TARGET_PATH_REQUEST_DURATION_SECONDS,
        "Wall-clock time spent handling a /targets request"
    );
    describe_gauge!(
        PATH_LAST_GENERATED_TARGETS,
        "Number of targets in the last successful response for a path"
    );
    describe_counter!(
        CACHE_OPERATIONS_TOTAL,
        "Cache hit/miss/expired operations, labeled by status"
    );
    describe_gauge!(
        QUEUE_JOB_GAUGE,
        "Pending/processing job counts in the refresh queue"
    );
    describe_counter!(
        WORKER_JOBS_PROCESSED_TOTAL,
        "Jobs completed by split-mode workers, labeled by status"
    );
    describe_gauge!(
        SINGLE_FLIGHT_ENTRIES,
        "Live entries in a single-flight cache"
    );
    describe_counter!(
        SINGLE_FLIGHT_REAPED_TOTAL,
        "Entries evicted by single-flight cache garbage collection"
    );
    describe_histogram!(
        SINGLE_FLIGHT_GC_DURATION_SECONDS,
        "Duration of a single-flight cache garbage collection pass"
    );
}

/// Installs the Prometheus recorder and serves `/metrics` on its own
/// listener (used for the split-mode per-worker metrics endpoint; the
/// monolith and server-only binaries mount the same recorder's render
/// output under the main router instead, see `server::build_router`).
pub async fn serve_standalone(addr: SocketAddr) -> anyhow::Result<()> {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    builder.install()?;
    describe_all();
    Ok(())
}

/// Builds a recorder handle for embedding `/metrics` inside the main axum
/// router instead of a dedicated listener.
pub fn install_for_router() -> anyhow::Result<metrics_exporter_prometheus::PrometheusHandle> {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {e}"))?;
    describe_all();
    Ok(handle)
}
