use axum::routing::{delete, get, post};
use axum::Router;

use crate::app_state::AppState;

pub mod convert;
pub mod error;
pub mod health;
pub mod metrics;

/// Application routes. Middleware and the metrics endpoint are layered on by
/// the server binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/", get(convert::api_root))
        .route("/api/convert", post(convert::submit_conversion))
        .route("/api/status/{job_id}", get(convert::get_conversion_status))
        .route("/api/download/{job_id}", get(convert::download_executable))
        .route("/api/jobs", get(convert::list_jobs))
        .route("/api/jobs/{job_id}", delete(convert::delete_job))
        .with_state(state)
}
