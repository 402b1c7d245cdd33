use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{JobProgress, JobStatus};
use super::outcome::Outcome;

/// Body of `POST /customer/{jobId}/status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<Outcome>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StatusUpdate {
    /// Job accepted; nothing has run yet.
    pub fn started() -> Self {
        Self::progress(JobProgress::starting(0))
    }

    /// Intermediate, non-terminal progress.
    pub fn progress(progress: JobProgress) -> Self {
        Self {
            status: JobStatus::InProgress,
            progress: Some(progress),
            results: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn completed(progress: JobProgress, results: Vec<Outcome>) -> Self {
        Self {
            status: JobStatus::Completed,
            progress: Some(progress),
            results: Some(results),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            progress: None,
            results: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Count outcomes into progress counters for a job of `total` items.
pub fn tally(total: usize, outcomes: &[Outcome]) -> JobProgress {
    let successful = outcomes.iter().filter(|o| o.is_success()).count();
    JobProgress {
        total,
        completed: outcomes.len(),
        successful,
        failed: outcomes.len() - successful,
        current_item: None,
    }
}

/// Read-only snapshot of the orchestrator, served by `GET /status`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorStatus {
    pub is_active: bool,
    pub active_job_id: Option<String>,
    pub active_job_label: Option<String>,
    pub outcomes_so_far: Vec<Outcome>,
    pub active_handle_count: usize,
}
