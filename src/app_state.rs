use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::services::orchestrator::Orchestrator;

/// Shared state passed to the status route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub prometheus: Arc<PrometheusHandle>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, prometheus: PrometheusHandle) -> Self {
        Self {
            orchestrator,
            prometheus: Arc::new(prometheus),
        }
    }
}
