use axum::extract::State;
use axum::response::IntoResponse;

use crate::app_state::AppState;

/// GET /metrics: Prometheus text exposition.
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.prometheus.render()
}
