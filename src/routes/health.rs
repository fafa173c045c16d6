use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::services::analysis::AnalysisService;
use crate::services::repository::ProductRepository;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize, Deserialize)]
pub struct HealthChecks {
    pub repository: ComponentHealth,
    pub tasks: TaskHealth,
}

#[derive(Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

#[derive(Serialize, Deserialize)]
pub struct TaskHealth {
    pub active: usize,
    pub tracked: usize,
}

/// GET /health: repository connectivity plus task counts.
pub async fn health_check<A: AnalysisService, R: ProductRepository>(
    State(state): State<AppState<A, R>>,
) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();

    let repository = match state.repository().health_check().await {
        Ok(_) => ComponentHealth {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Repository health check failed");
            ComponentHealth {
                status: "error".to_string(),
                latency_ms: None,
            }
        }
    };

    let healthy = repository.status == "ok";
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            repository,
            tasks: TaskHealth {
                active: state.store().active_count(),
                tracked: state.store().list().len(),
            },
        },
    };

    (status_code, Json(response))
}
