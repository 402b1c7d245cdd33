use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle status of a queued job.
///
/// A job moves `Pending -> InProgress -> Completed | Failed` and never
/// re-enters `Pending`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum JobStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Cumulative progress counters for a job.
///
/// `successful + failed == completed` holds for every value the scheduler
/// and orchestrator publish.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    pub failed: usize,
    /// Name of the last item processed in the most recent batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
}

impl JobProgress {
    pub fn starting(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }
}

/// Known service tiers. Parsing is case-insensitive so `"Starter"` and
/// `"starter"` select the same tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Tier {
    Starter,
    Growth,
    Professional,
    Enterprise,
}

impl Tier {
    /// Maximum number of work items a job of this tier may run.
    pub fn item_limit(self) -> usize {
        match self {
            Tier::Starter => 25,
            Tier::Growth => 75,
            Tier::Professional => 150,
            Tier::Enterprise => 500,
        }
    }
}

/// A unit of queued work as delivered by the remote queue.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[garde(length(min = 1, max = 200))]
    #[serde(alias = "customerId")]
    pub job_id: String,

    #[garde(length(min = 1, max = 64))]
    #[serde(alias = "packageType")]
    pub tier: String,

    /// Human-readable label, shown by the status surface.
    #[garde(skip)]
    #[serde(default, alias = "businessName")]
    pub label: Option<String>,

    /// Opaque data handed to every work item invocation.
    #[garde(skip)]
    #[serde(default, alias = "businessData")]
    pub payload: serde_json::Value,

    #[garde(skip)]
    #[serde(default)]
    pub status: JobStatus,

    #[garde(skip)]
    #[serde(default)]
    pub progress: JobProgress,

    #[garde(skip)]
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(job_id: impl Into<String>, tier: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            tier: tier.into(),
            label: None,
            payload: serde_json::Value::Null,
            status: JobStatus::Pending,
            progress: JobProgress::default(),
            created_at: Some(Utc::now()),
        }
    }

    /// The tier parsed against the known tier table, if it is one.
    pub fn known_tier(&self) -> Option<Tier> {
        self.tier.trim().parse().ok()
    }
}
