use serde::Deserialize;
use std::time::Duration;

use crate::services::orchestrator::PollSettings;
use crate::services::scheduler::SchedulerConfig;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Status surface bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Base URL of the remote queue API
    pub queue_api_url: String,

    /// Optional bearer token for the queue API
    #[serde(default)]
    pub queue_api_token: Option<String>,

    /// Per-request timeout for queue calls
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: u64,

    /// Base URL of the browser-automation service backing execution targets
    pub executor_url: String,

    /// Nominal delay between polls of the pending queue
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound for the poll delay after repeated queue failures
    #[serde(default = "default_max_poll_backoff_ms")]
    pub max_poll_backoff_ms: u64,

    /// Work items per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent sub-tasks within one batch
    #[serde(default = "default_batch_size")]
    pub max_in_flight: usize,

    /// Pause between consecutive batches
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,

    /// How long an execution target may take to become ready
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// Bound on a single invocation; 0 disables it
    #[serde(default = "default_invoke_timeout_ms")]
    pub invoke_timeout_ms: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_queue_timeout_ms() -> u64 {
    15_000
}

fn default_poll_interval_ms() -> u64 {
    30_000
}

fn default_max_poll_backoff_ms() -> u64 {
    300_000
}

fn default_batch_size() -> usize {
    3
}

fn default_inter_batch_delay_ms() -> u64 {
    5_000
}

fn default_ready_timeout_ms() -> u64 {
    30_000
}

fn default_invoke_timeout_ms() -> u64 {
    60_000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        let batch_size = self.batch_size.max(1);
        SchedulerConfig {
            batch_size,
            max_in_flight: self.max_in_flight.clamp(1, batch_size),
            inter_batch_delay: Duration::from_millis(self.inter_batch_delay_ms),
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
            invoke_timeout: (self.invoke_timeout_ms > 0)
                .then(|| Duration::from_millis(self.invoke_timeout_ms)),
        }
    }

    pub fn polling(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_backoff: Duration::from_millis(self.max_poll_backoff_ms.max(self.poll_interval_ms)),
        }
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }
}
