use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::services::queue::JobQueue;

#[derive(Clone)]
pub struct MetricsState {
    pub handle: Arc<PrometheusHandle>,
    pub queue: Option<Arc<JobQueue>>,
}

/// Prometheus metrics scrape endpoint.
/// Refreshes the queue depth gauge, then renders the text exposition format.
pub async fn prometheus_metrics(State(state): State<MetricsState>) -> impl IntoResponse {
    if let Some(queue) = &state.queue {
        match queue.queue_depth().await {
            Ok(depth) => metrics::gauge!("faceswap_queue_depth").set(depth as f64),
            Err(e) => tracing::warn!(error = %e, "Failed to read queue depth"),
        }
    }
    state.handle.render()
}

/// Register descriptions for every metric the service emits.
pub fn describe_metrics() {
    metrics::describe_histogram!(
        "faceswap_generation_seconds",
        "Time spent in the remote face swap model per job"
    );
    metrics::describe_counter!("faceswap_jobs_total", "Total face swap jobs submitted");
    metrics::describe_counter!("faceswap_jobs_completed", "Total face swap jobs completed");
    metrics::describe_counter!("faceswap_jobs_failed", "Total face swap jobs that failed");
    metrics::describe_counter!(
        "faceswap_jobs_timed_out",
        "Face swap jobs that failed because the model did not answer in time"
    );
    metrics::describe_counter!(
        "faceswap_jobs_evicted",
        "Finished jobs removed after the retention window"
    );
    metrics::describe_counter!(
        "faceswap_queue_reclaimed",
        "Processing-list entries removed after their worker died"
    );
    metrics::describe_gauge!(
        "faceswap_queue_depth",
        "Jobs waiting in the Redis queue for a worker"
    );
}
