//! Execution targets: ephemeral contexts in which one work item is carried out.
//!
//! A [`TargetProvider`] opens a context for a locator, the scheduler wraps it in
//! a [`TargetLease`], and the [`LeaseRegistry`] keeps every open lease reachable
//! so cleanup can release whatever a run left behind.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::models::WorkItem;

/// Structured result of a single invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResult {
    pub success: bool,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub filled_fields: Option<u32>,
}

/// One open execution context. `release` must be idempotent.
#[async_trait]
pub trait ExecutionTarget: Send + Sync {
    /// Resolve once the context can accept work. The caller bounds this with
    /// its own timeout; `timeout` is passed through for targets that honour it.
    async fn await_ready(&self, timeout: Duration) -> Result<(), TargetError>;

    async fn invoke(
        &self,
        item: &WorkItem,
        payload: &serde_json::Value,
    ) -> Result<InvokeResult, TargetError>;

    async fn release(&self) -> Result<(), TargetError>;
}

/// Opens execution targets.
#[async_trait]
pub trait TargetProvider: Send + Sync {
    async fn acquire(&self, target: &str) -> Result<Box<dyn ExecutionTarget>, TargetError>;
}

/// Exclusive lease on one execution target.
///
/// The underlying `release` runs exactly once no matter how many times, or
/// from where, the lease is released.
pub struct TargetLease {
    id: Uuid,
    locator: String,
    target: Box<dyn ExecutionTarget>,
    released: AtomicBool,
}

impl TargetLease {
    fn new(locator: &str, target: Box<dyn ExecutionTarget>) -> Self {
        Self {
            id: Uuid::new_v4(),
            locator: locator.to_string(),
            target,
            released: AtomicBool::new(false),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub async fn await_ready(&self, timeout: Duration) -> Result<(), TargetError> {
        if self.is_released() {
            return Err(TargetError::Released);
        }
        self.target.await_ready(timeout).await
    }

    pub async fn invoke(
        &self,
        item: &WorkItem,
        payload: &serde_json::Value,
    ) -> Result<InvokeResult, TargetError> {
        if self.is_released() {
            return Err(TargetError::Released);
        }
        self.target.invoke(item, payload).await
    }

    async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.target.release().await {
            tracing::warn!(lease_id = %self.id, target = %self.locator, error = %e, "Target release failed");
        }
    }
}

/// Tracks every open lease.
#[derive(Default)]
pub struct LeaseRegistry {
    leases: Mutex<HashMap<Uuid, Arc<TargetLease>>>,
}

impl LeaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a target and register the lease.
    pub async fn acquire(
        &self,
        provider: &dyn TargetProvider,
        locator: &str,
    ) -> Result<Arc<TargetLease>, TargetError> {
        let target = provider.acquire(locator).await?;
        let lease = Arc::new(TargetLease::new(locator, target));
        self.leases.lock().insert(lease.id, lease.clone());
        tracing::trace!(lease_id = %lease.id, target = %locator, "Target acquired");
        Ok(lease)
    }

    /// Release one lease and forget it.
    pub async fn release(&self, lease: &TargetLease) {
        self.leases.lock().remove(&lease.id);
        lease.release().await;
    }

    /// Release everything still open. Returns how many leases were released.
    pub async fn release_all(&self) -> usize {
        let leftover: Vec<Arc<TargetLease>> = self.leases.lock().drain().map(|(_, l)| l).collect();
        let count = leftover.len();
        for lease in leftover {
            lease.release().await;
        }
        if count > 0 {
            tracing::info!(count, "Released leftover execution targets");
        }
        count
    }

    pub fn active_count(&self) -> usize {
        self.leases.lock().len()
    }
}

#[derive(Serialize)]
struct OpenSessionRequest<'a> {
    target: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenSessionResponse {
    session_id: String,
}

#[derive(Deserialize)]
struct SessionState {
    ready: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct InvokeRequest<'a> {
    item: &'a WorkItem,
    payload: &'a serde_json::Value,
}

/// Opens sessions on a browser-automation service over HTTP.
pub struct HttpTargetProvider {
    http: Client,
    base_url: String,
    poll_interval: Duration,
}

impl HttpTargetProvider {
    pub fn new(base_url: &str) -> Result<Self, TargetError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_millis(500),
        })
    }

    /// How often a session is polled while waiting for it to become ready.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl TargetProvider for HttpTargetProvider {
    async fn acquire(&self, target: &str) -> Result<Box<dyn ExecutionTarget>, TargetError> {
        let response = self
            .http
            .post(format!("{}/sessions", self.base_url))
            .json(&OpenSessionRequest { target })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TargetError::Acquire(format!(
                "executor returned HTTP {} for {}",
                response.status(),
                target
            )));
        }

        let opened: OpenSessionResponse = response.json().await?;
        Ok(Box::new(HttpSession {
            http: self.http.clone(),
            url: format!("{}/sessions/{}", self.base_url, opened.session_id),
            poll_interval: self.poll_interval,
        }))
    }
}

/// A remote browser session.
struct HttpSession {
    http: Client,
    url: String,
    poll_interval: Duration,
}

#[async_trait]
impl ExecutionTarget for HttpSession {
    async fn await_ready(&self, timeout: Duration) -> Result<(), TargetError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let state: SessionState = self
                .http
                .get(&self.url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            if state.ready {
                return Ok(());
            }
            if let Some(error) = state.error {
                return Err(TargetError::NotReady(error));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(TargetError::ReadyTimeout(timeout));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn invoke(
        &self,
        item: &WorkItem,
        payload: &serde_json::Value,
    ) -> Result<InvokeResult, TargetError> {
        let response = self
            .http
            .post(format!("{}/invoke", self.url))
            .json(&InvokeRequest { item, payload })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TargetError::Invoke(format!("HTTP {status}: {body}")));
        }
        Ok(response.json().await?)
    }

    async fn release(&self) -> Result<(), TargetError> {
        let response = self.http.delete(&self.url).send().await?;
        // Already gone counts as released.
        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(TargetError::Invoke(format!(
                "session close returned HTTP {}",
                response.status()
            )))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("Failed to acquire execution target: {0}")]
    Acquire(String),

    #[error("Execution target not ready: {0}")]
    NotReady(String),

    #[error("Execution target not ready within {0:?}")]
    ReadyTimeout(Duration),

    #[error("Invocation did not finish within {0:?}")]
    InvokeTimeout(Duration),

    #[error("Invocation failed: {0}")]
    Invoke(String),

    #[error("Executor request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Execution target already released")]
    Released,

    #[error("Run was stopped before the target was invoked")]
    Cancelled,
}
