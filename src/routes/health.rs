use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub worker: WorkerHealth,
}

#[derive(Serialize)]
pub struct WorkerHealth {
    pub busy: bool,
    pub open_targets: usize,
}

/// GET /health: liveness plus a view of the worker.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let snapshot = state.orchestrator.status();

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        worker: WorkerHealth {
            busy: snapshot.is_active,
            open_targets: snapshot.active_handle_count,
        },
    };

    (StatusCode::OK, Json(response))
}
