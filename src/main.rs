use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use submission_worker::{
    app_state::AppState,
    config::AppConfig,
    routes,
    services::{
        catalog::FallbackCatalog, orchestrator::Orchestrator, queue::HttpQueueClient,
        target::HttpTargetProvider,
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing submission worker");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");

    metrics::describe_counter!("orchestrator_jobs_total", "Jobs finished, by terminal status");
    metrics::describe_counter!("orchestrator_items_total", "Work items attempted, by outcome");
    metrics::describe_histogram!(
        "orchestrator_job_duration_seconds",
        "Wall time from job acceptance to terminal status"
    );
    metrics::describe_counter!(
        "orchestrator_queue_fetch_failures_total",
        "Failed attempts to fetch pending jobs"
    );
    metrics::describe_counter!(
        "orchestrator_status_push_failures_total",
        "Status updates the queue did not accept"
    );

    tracing::info!(url = %config.queue_api_url, "Initializing queue client");
    let queue = HttpQueueClient::new(
        &config.queue_api_url,
        config.queue_api_token.clone(),
        config.queue_timeout(),
    )
    .expect("Failed to initialize queue client");

    tracing::info!(url = %config.executor_url, "Initializing execution target provider");
    let targets =
        HttpTargetProvider::new(&config.executor_url).expect("Failed to initialize executor client");

    let scheduler_config = config.scheduler();
    tracing::info!(
        batch_size = scheduler_config.batch_size,
        max_in_flight = scheduler_config.max_in_flight,
        inter_batch_delay_ms = scheduler_config.inter_batch_delay.as_millis() as u64,
        "Scheduler configured"
    );

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(queue),
        Arc::new(targets),
        FallbackCatalog::builtin(),
        scheduler_config,
    ));

    let shutdown = CancellationToken::new();
    let poller = {
        let orchestrator = orchestrator.clone();
        let shutdown = shutdown.clone();
        let settings = config.polling();
        tokio::spawn(async move { orchestrator.run_polling(settings, shutdown).await })
    };

    let app = routes::router(AppState::new(orchestrator.clone(), prometheus_handle));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Status surface listening on {}", config.bind_addr);

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
            serve_shutdown.cancel();
        })
        .await
        .expect("Server error");

    shutdown.cancel();
    orchestrator.force_stop().await;
    if let Err(e) = poller.await {
        tracing::error!(error = %e, "Poll loop ended abnormally");
    }

    tracing::info!("Submission worker stopped");
}
