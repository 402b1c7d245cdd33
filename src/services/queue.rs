use async_trait::async_trait;
use garde::Validate;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::models::{Job, StatusUpdate, WorkItem};

/// Remote queue that hands out jobs and receives their status.
#[async_trait]
pub trait RemoteQueue: Send + Sync {
    /// Pending jobs, highest priority first.
    async fn fetch_pending(&self) -> Result<Vec<Job>, QueueError>;

    /// Ordered work items for a tier.
    async fn fetch_catalog(&self, tier: &str) -> Result<Vec<WorkItem>, QueueError>;

    async fn push_status(&self, job_id: &str, update: &StatusUpdate) -> Result<(), QueueError>;
}

/// Push a status update without letting a failure reach the caller.
///
/// Status reporting is a side channel: a rejected or unreachable endpoint is
/// logged and counted, and the job carries on.
pub async fn report_status(queue: &dyn RemoteQueue, job_id: &str, update: StatusUpdate) {
    if let Err(e) = queue.push_status(job_id, &update).await {
        metrics::counter!("orchestrator_status_push_failures_total").increment(1);
        tracing::warn!(
            job_id = %job_id,
            status = %update.status,
            error = %e,
            "Status push failed, continuing"
        );
    }
}

#[derive(Deserialize)]
struct PendingResponse {
    success: bool,
    #[serde(default)]
    customers: Vec<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct CatalogResponse {
    success: bool,
    #[serde(default)]
    directories: Vec<WorkItem>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct AckResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the remote queue API.
pub struct HttpQueueClient {
    http: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpQueueClient {
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, QueueError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("submission-worker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, QueueError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(QueueError::Status {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(QueueError::Parse)
    }
}

#[async_trait]
impl RemoteQueue for HttpQueueClient {
    async fn fetch_pending(&self) -> Result<Vec<Job>, QueueError> {
        let url = format!("{}/queue/pending", self.base_url);
        let response = self.authorize(self.http.get(&url)).send().await?;
        let body: PendingResponse = Self::read_json(response).await?;

        if !body.success {
            return Err(QueueError::Rejected(
                body.error.unwrap_or_else(|| "queue reported failure".to_string()),
            ));
        }

        let mut jobs = Vec::with_capacity(body.customers.len());
        for raw in body.customers {
            let job: Job = match serde_json::from_value(raw) {
                Ok(job) => job,
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping malformed job from pending queue");
                    continue;
                }
            };
            match job.validate() {
                Ok(()) => jobs.push(job),
                Err(report) => {
                    tracing::warn!(
                        job_id = %job.job_id,
                        error = %report,
                        "Dropping invalid job from pending queue"
                    );
                }
            }
        }

        tracing::debug!(count = jobs.len(), "Fetched pending jobs");
        Ok(jobs)
    }

    async fn fetch_catalog(&self, tier: &str) -> Result<Vec<WorkItem>, QueueError> {
        let url = format!("{}/directories", self.base_url);
        let response = self
            .authorize(self.http.get(&url).query(&[("packageType", tier)]))
            .send()
            .await?;
        let body: CatalogResponse = Self::read_json(response).await?;

        if !body.success {
            return Err(QueueError::Rejected(
                body.error.unwrap_or_else(|| "catalog request rejected".to_string()),
            ));
        }
        Ok(body.directories)
    }

    async fn push_status(&self, job_id: &str, update: &StatusUpdate) -> Result<(), QueueError> {
        let url = format!("{}/customer/{}/status", self.base_url, job_id);
        let response = self
            .authorize(self.http.post(&url).json(update))
            .send()
            .await?;
        let ack: AckResponse = Self::read_json(response).await?;

        if !ack.success {
            return Err(QueueError::Rejected(
                ack.error.unwrap_or_else(|| "status update rejected".to_string()),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Queue returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed queue response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Queue rejected request: {0}")]
    Rejected(String),
}
