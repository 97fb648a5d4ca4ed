use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub registry: ComponentHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<ComponentHealth>,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

impl ComponentHealth {
    fn from_result<E>(result: Result<(), E>, start: std::time::Instant) -> Self {
        match result {
            Ok(()) => ComponentHealth {
                status: "ok".to_string(),
                latency_ms: Some(start.elapsed().as_millis() as u64),
            },
            Err(_) => ComponentHealth {
                status: "error".to_string(),
                latency_ms: None,
            },
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// GET /health: health check with dependency status.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();
    let registry_check = ComponentHealth::from_result(state.registry.health_check().await, start);

    let queue_check = match &state.queue {
        Some(queue) => {
            let queue_start = std::time::Instant::now();
            Some(ComponentHealth::from_result(queue.health_check().await, queue_start))
        }
        None => None,
    };

    let all_healthy =
        registry_check.is_ok() && queue_check.as_ref().map_or(true, ComponentHealth::is_ok);
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            registry: registry_check,
            queue: queue_check,
        },
    };

    (status_code, Json(response))
}
