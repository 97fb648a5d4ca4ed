use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::services::queue::JobQueue;

/// State for the scrape endpoint, separate from the API state.
#[derive(Clone)]
pub struct MetricsState {
    pub handle: Arc<PrometheusHandle>,
    pub queue: Option<Arc<JobQueue>>,
}

/// GET /metrics: Prometheus text exposition. Samples the Redis queue depth
/// on every scrape when jobs are queued through Redis.
pub async fn prometheus_metrics(State(state): State<MetricsState>) -> impl IntoResponse {
    if let Some(queue) = &state.queue {
        match queue.queue_depth().await {
            Ok(depth) => metrics::gauge!("conversion_queue_depth").set(depth as f64),
            Err(e) => tracing::warn!(error = %e, "Failed to read queue depth"),
        }
    }
    state.handle.render()
}
