mod fixtures;
mod helpers;

use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;

use fixtures::{directory_items, sample_job, target_for};
use helpers::{fast_config, orchestrator, Behavior, MockQueue, ScriptedTargets};
use submission_worker::app_state::AppState;
use submission_worker::routes;
use submission_worker::services::orchestrator::JobResult;

async fn serve(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, routes::router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

fn prometheus() -> metrics_exporter_prometheus::PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

#[tokio::test]
async fn test_status_and_stop_endpoints() {
    let queue = MockQueue::new();
    let targets = ScriptedTargets::new();
    queue.set_catalog(directory_items(1));
    targets.script(&target_for(1), Behavior::Gated);

    let orch = orchestrator(&queue, &targets, fast_config());
    let base = serve(AppState::new(orch.clone(), prometheus())).await;
    let http = reqwest::Client::new();

    let idle: Value = http.get(format!("{base}/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(idle["isActive"], false);
    assert!(idle["activeJobId"].is_null());
    assert_eq!(idle["outcomesSoFar"].as_array().unwrap().len(), 0);

    let running = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.run_job(sample_job("job-a", "starter")).await })
    };
    targets.wait_for_invocations(1).await;

    let busy: Value = http.get(format!("{base}/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(busy["isActive"], true);
    assert_eq!(busy["activeJobId"], "job-a");
    assert_eq!(busy["activeHandleCount"], 1);

    let stop: Value = http.post(format!("{base}/stop")).send().await.unwrap().json().await.unwrap();
    assert_eq!(stop["stopped"], true);
    assert_eq!(stop["jobId"], "job-a");

    assert_eq!(running.await.unwrap().unwrap(), JobResult::Stopped);
    targets.open_gate(1);

    let after: Value = http.get(format!("{base}/status")).send().await.unwrap().json().await.unwrap();
    assert_eq!(after["isActive"], false);
}

#[tokio::test]
async fn test_health_reports_version() {
    let queue = MockQueue::new();
    let targets = ScriptedTargets::new();
    let orch = orchestrator(&queue, &targets, fast_config());
    let base = serve(AppState::new(orch, prometheus())).await;

    let response = reqwest::get(format!("{base}/health")).await.unwrap();
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["worker"]["busy"], false);

    let metrics = reqwest::get(format!("{base}/metrics")).await.unwrap();
    assert!(metrics.status().is_success());
}
