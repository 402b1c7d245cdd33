use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;
use crate::models::OrchestratorStatus;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResponse {
    pub stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// GET /status: snapshot of the active job.
pub async fn get_status(State(state): State<AppState>) -> Json<OrchestratorStatus> {
    Json(state.orchestrator.status())
}

/// POST /stop: force-stop the active job.
pub async fn force_stop(State(state): State<AppState>) -> Json<StopResponse> {
    let job_id = state.orchestrator.force_stop().await;
    Json(StopResponse {
        stopped: job_id.is_some(),
        job_id,
    })
}
