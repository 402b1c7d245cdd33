//! In-memory queue and scriptable execution targets for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use submission_worker::models::{Job, StatusUpdate, WorkItem};
use submission_worker::services::catalog::FallbackCatalog;
use submission_worker::services::orchestrator::Orchestrator;
use submission_worker::services::queue::{QueueError, RemoteQueue};
use submission_worker::services::scheduler::SchedulerConfig;
use submission_worker::services::target::{
    ExecutionTarget, InvokeResult, TargetError, TargetProvider,
};

/// Remote queue double that records every status push.
#[derive(Default)]
pub struct MockQueue {
    pending: Mutex<Vec<Job>>,
    fetch_failures: AtomicUsize,
    fetch_calls: AtomicUsize,
    catalog: Mutex<Option<Vec<WorkItem>>>,
    catalog_requests: Mutex<Vec<String>>,
    reject_pushes: Mutex<bool>,
    pushes: Mutex<Vec<(String, StatusUpdate)>>,
}

impl MockQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_pending(&self, jobs: Vec<Job>) {
        *self.pending.lock() = jobs;
    }

    /// The next `n` fetches fail.
    pub fn fail_next_fetches(&self, n: usize) {
        self.fetch_failures.store(n, Ordering::SeqCst);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn set_catalog(&self, items: Vec<WorkItem>) {
        *self.catalog.lock() = Some(items);
    }

    /// Catalog requests fail until `set_catalog` is called.
    pub fn catalog_unavailable(&self) {
        *self.catalog.lock() = None;
    }

    pub fn catalog_requests(&self) -> Vec<String> {
        self.catalog_requests.lock().clone()
    }

    pub fn reject_pushes(&self) {
        *self.reject_pushes.lock() = true;
    }

    pub fn pushes(&self) -> Vec<(String, StatusUpdate)> {
        self.pushes.lock().clone()
    }

    pub fn pushes_for(&self, job_id: &str) -> Vec<StatusUpdate> {
        self.pushes
            .lock()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, update)| update.clone())
            .collect()
    }

    /// Non-terminal pushes that carry batch progress (the acceptance push has
    /// nothing completed yet).
    pub fn progress_pushes_for(&self, job_id: &str) -> Vec<StatusUpdate> {
        self.pushes_for(job_id)
            .into_iter()
            .filter(|u| !u.is_terminal())
            .filter(|u| u.progress.as_ref().is_some_and(|p| p.completed > 0))
            .collect()
    }

    pub fn terminal_pushes_for(&self, job_id: &str) -> Vec<StatusUpdate> {
        self.pushes_for(job_id)
            .into_iter()
            .filter(|u| u.is_terminal())
            .collect()
    }
}

#[async_trait]
impl RemoteQueue for MockQueue {
    async fn fetch_pending(&self) -> Result<Vec<Job>, QueueError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fetch_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(QueueError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.pending.lock().clone())
    }

    async fn fetch_catalog(&self, tier: &str) -> Result<Vec<WorkItem>, QueueError> {
        self.catalog_requests.lock().push(tier.to_string());
        match self.catalog.lock().clone() {
            Some(items) => Ok(items),
            None => Err(QueueError::Rejected("catalog offline".to_string())),
        }
    }

    async fn push_status(&self, job_id: &str, update: &StatusUpdate) -> Result<(), QueueError> {
        self.pushes.lock().push((job_id.to_string(), update.clone()));
        if *self.reject_pushes.lock() {
            return Err(QueueError::Rejected("status endpoint down".to_string()));
        }
        Ok(())
    }
}

/// How a scripted target behaves.
#[derive(Clone)]
pub enum Behavior {
    Succeed,
    /// Invocation returns `success: false` with this detail.
    Decline(String),
    /// Invocation returns an error.
    FailInvoke(String),
    FailAcquire,
    /// Opening the target takes this long; the target then succeeds.
    SlowAcquire(Duration),
    NeverReady,
    /// Readiness takes this long.
    SlowReady(Duration),
    Delay(Duration),
    /// Invocation waits for a permit on the shared gate.
    Gated,
    Panic,
}

#[derive(Default)]
struct TargetLog {
    behaviors: Mutex<HashMap<String, Behavior>>,
    acquired: Mutex<Vec<String>>,
    released: Mutex<HashMap<String, usize>>,
    invoked: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Target provider whose targets follow per-locator scripts and record every
/// acquire, invoke and release.
pub struct ScriptedTargets {
    log: Arc<TargetLog>,
    gate: Arc<Semaphore>,
}

impl ScriptedTargets {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(TargetLog::default()),
            gate: Arc::new(Semaphore::new(0)),
        })
    }

    pub fn script(&self, target: &str, behavior: Behavior) {
        self.log
            .behaviors
            .lock()
            .insert(target.to_string(), behavior);
    }

    /// Let `n` gated invocations finish.
    pub fn open_gate(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn acquired(&self) -> Vec<String> {
        self.log.acquired.lock().clone()
    }

    pub fn invoked(&self) -> Vec<String> {
        self.log.invoked.lock().clone()
    }

    pub fn release_count(&self, target: &str) -> usize {
        self.log.released.lock().get(target).copied().unwrap_or(0)
    }

    pub fn total_releases(&self) -> usize {
        self.log.released.lock().values().sum()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.log.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` invocations have started.
    pub async fn wait_for_invocations(&self, n: usize) {
        for _ in 0..500 {
            if self.log.invoked.lock().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {n} invocations to start");
    }
}

#[async_trait]
impl TargetProvider for ScriptedTargets {
    async fn acquire(&self, target: &str) -> Result<Box<dyn ExecutionTarget>, TargetError> {
        let behavior = self
            .log
            .behaviors
            .lock()
            .get(target)
            .cloned()
            .unwrap_or(Behavior::Succeed);

        match behavior {
            Behavior::FailAcquire => {
                return Err(TargetError::Acquire(format!("no browser for {target}")));
            }
            Behavior::SlowAcquire(delay) => tokio::time::sleep(delay).await,
            _ => {}
        }

        self.log.acquired.lock().push(target.to_string());
        Ok(Box::new(ScriptedTarget {
            target: target.to_string(),
            behavior,
            log: self.log.clone(),
            gate: self.gate.clone(),
        }))
    }
}

struct ScriptedTarget {
    target: String,
    behavior: Behavior,
    log: Arc<TargetLog>,
    gate: Arc<Semaphore>,
}

/// Decrements the in-flight count even if the invocation is dropped.
struct InFlight(Arc<TargetLog>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExecutionTarget for ScriptedTarget {
    async fn await_ready(&self, _timeout: Duration) -> Result<(), TargetError> {
        match self.behavior {
            Behavior::NeverReady => std::future::pending::<()>().await,
            Behavior::SlowReady(delay) => tokio::time::sleep(delay).await,
            _ => {}
        }
        Ok(())
    }

    async fn invoke(
        &self,
        item: &WorkItem,
        _payload: &serde_json::Value,
    ) -> Result<InvokeResult, TargetError> {
        self.log.invoked.lock().push(self.target.clone());
        let now = self.log.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(self.log.clone());

        match &self.behavior {
            Behavior::Decline(detail) => Ok(InvokeResult {
                success: false,
                detail: detail.clone(),
                filled_fields: Some(0),
            }),
            Behavior::FailInvoke(message) => Err(TargetError::Invoke(message.clone())),
            Behavior::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(submitted(item))
            }
            Behavior::Gated => {
                let permit = self.gate.acquire().await;
                drop(permit);
                Ok(submitted(item))
            }
            Behavior::Panic => panic!("target crashed on {}", item.item_id),
            _ => Ok(submitted(item)),
        }
    }

    async fn release(&self) -> Result<(), TargetError> {
        *self
            .log
            .released
            .lock()
            .entry(self.target.clone())
            .or_insert(0) += 1;
        Ok(())
    }
}

fn submitted(item: &WorkItem) -> InvokeResult {
    InvokeResult {
        success: true,
        detail: format!("Submitted to {}", item.name),
        filled_fields: Some(7),
    }
}

/// Scheduler settings that keep tests fast.
pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        batch_size: 3,
        max_in_flight: 3,
        inter_batch_delay: Duration::ZERO,
        ready_timeout: Duration::from_millis(100),
        invoke_timeout: Some(Duration::from_secs(2)),
    }
}

pub fn orchestrator(
    queue: &Arc<MockQueue>,
    targets: &Arc<ScriptedTargets>,
    config: SchedulerConfig,
) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        queue.clone(),
        targets.clone(),
        FallbackCatalog::builtin(),
        config,
    ))
}
