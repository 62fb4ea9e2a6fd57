//! Prometheus recorder bootstrap.
//!
//! Installs the global recorder once at startup and registers descriptions
//! for the series the pipeline emits, so they show up on `/metrics` with
//! help text before the first increment. The exposition route itself lives
//! on the main router (`api::create_router`).

use metrics::{describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and return the render handle.
///
/// Ingest-side counters (`content_*`) are described lazily at the first
/// poll in `sources`; everything downstream is described here.
pub fn install_recorder(cache_ttl_secs: u64) -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("prometheus: install recorder");

    describe_counter!("alerts_fired_total", "Alerts produced by criteria evaluation.");
    describe_counter!("alerts_recorded_total", "Alerts accepted into the active list.");
    describe_counter!("alerts_expired_total", "Alerts retired by the staleness sweep.");
    describe_counter!("predictions_tracked_total", "Predictions registered with the tracker.");
    describe_counter!("predictions_evaluated_total", "Expired predictions scored into outcomes.");
    describe_counter!("scheduler_tasks_completed_total", "Tasks that reached completed.");
    describe_counter!("scheduler_tasks_failed_total", "Tasks that failed permanently.");
    describe_gauge!("scheduler_success_rate", "Completed over terminal task count.");

    // Static gauge with the current TTL (absolute TTL, no sliding refresh)
    gauge!("content_query_cache_ttl_secs").set(cache_ttl_secs as f64);

    handle
}
