//! Batch scheduler: runs a job's work items in fixed-size batches.
//!
//! Batches run strictly one after another. Items inside a batch run
//! concurrently, bounded by a semaphore, and every item settles on its own:
//! a failing or panicking item never cancels its siblings.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::models::status::tally;
use crate::models::{Job, Outcome, StatusUpdate, WorkItem};
use crate::services::queue::{report_status, RemoteQueue};
use crate::services::target::{
    InvokeResult, LeaseRegistry, TargetError, TargetLease, TargetProvider,
};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub batch_size: usize,
    pub max_in_flight: usize,
    pub inter_batch_delay: Duration,
    pub ready_timeout: Duration,
    pub invoke_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            max_in_flight: 3,
            inter_batch_delay: Duration::from_secs(5),
            ready_timeout: Duration::from_secs(30),
            invoke_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Live record of one job run, shared between the orchestrator (which may
/// stop it) and the scheduler (which fills it).
pub struct RunTracker {
    job_id: String,
    label: Option<String>,
    cancel: CancellationToken,
    outcomes: Mutex<Vec<Outcome>>,
}

impl RunTracker {
    pub fn new(job: &Job) -> Self {
        Self {
            job_id: job.job_id.clone(),
            label: job.label.clone(),
            cancel: CancellationToken::new(),
            outcomes: Mutex::new(Vec::new()),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Append an outcome unless the run has been stopped.
    pub fn record(&self, outcome: Outcome) -> bool {
        let mut outcomes = self.outcomes.lock();
        if self.cancel.is_cancelled() {
            tracing::debug!(
                job_id = %self.job_id,
                item_id = %outcome.item_id,
                "Discarding outcome for stopped run"
            );
            return false;
        }
        outcomes.push(outcome);
        true
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().clone()
    }

    pub fn outcome_count(&self) -> usize {
        self.outcomes.lock().len()
    }

    pub fn stop(&self) {
        // Hold the lock so no outcome lands after the flag flips.
        let _outcomes = self.outcomes.lock();
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn stopped(&self) {
        self.cancel.cancelled().await
    }

    fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

pub struct BatchScheduler {
    queue: Arc<dyn RemoteQueue>,
    targets: Arc<dyn TargetProvider>,
    leases: Arc<LeaseRegistry>,
    config: SchedulerConfig,
}

impl BatchScheduler {
    pub fn new(
        queue: Arc<dyn RemoteQueue>,
        targets: Arc<dyn TargetProvider>,
        leases: Arc<LeaseRegistry>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            queue,
            targets,
            leases,
            config,
        }
    }

    /// Run every item of `job`, returning outcomes in completion order.
    #[tracing::instrument(skip_all, fields(job_id = %job.job_id, items = items.len()))]
    pub async fn run(
        &self,
        job: &Job,
        items: &[WorkItem],
        tracker: &RunTracker,
    ) -> Result<Vec<Outcome>, SchedulerError> {
        let batch_size = self.config.batch_size.max(1);
        let batch_count = items.len().div_ceil(batch_size);

        for (index, batch) in items.chunks(batch_size).enumerate() {
            if tracker.is_stopped() {
                return Err(SchedulerError::Stopped);
            }

            tracing::info!(batch = index + 1, of = batch_count, size = batch.len(), "Starting batch");
            let last_item = self.run_batch(job, batch, tracker).await?;

            if tracker.is_stopped() {
                return Err(SchedulerError::Stopped);
            }

            let mut progress = tally(items.len(), &tracker.outcomes());
            progress.current_item = last_item;
            tracing::info!(
                batch = index + 1,
                completed = progress.completed,
                successful = progress.successful,
                failed = progress.failed,
                "Batch settled"
            );
            report_status(self.queue.as_ref(), &job.job_id, StatusUpdate::progress(progress)).await;

            if index + 1 < batch_count && !self.config.inter_batch_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.inter_batch_delay) => {}
                    _ = tracker.stopped() => return Err(SchedulerError::Stopped),
                }
            }
        }

        Ok(tracker.outcomes())
    }

    /// Run one batch to full settlement. Returns the name of the item that
    /// finished last.
    async fn run_batch(
        &self,
        job: &Job,
        batch: &[WorkItem],
        tracker: &RunTracker,
    ) -> Result<Option<String>, SchedulerError> {
        let permits = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut join_set = JoinSet::new();

        for (slot, item) in batch.iter().enumerate() {
            let task = SubTask {
                targets: self.targets.clone(),
                leases: self.leases.clone(),
                item: item.clone(),
                payload: job.payload.clone(),
                config: self.config.clone(),
                cancel: tracker.token(),
            };
            let permits = permits.clone();
            join_set.spawn(async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => task.execute().await,
                    Err(_) => Outcome::failed(&task.item, "scheduler permits closed"),
                };
                (slot, outcome)
            });
        }

        let mut settled = vec![false; batch.len()];
        let mut last_item = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = tracker.stopped() => None,
                joined = join_set.join_next() => Some(joined),
            };
            let Some(joined) = next else {
                // In-flight invocations keep running; their results are dropped.
                join_set.detach_all();
                return Err(SchedulerError::Stopped);
            };
            let Some(joined) = joined else { break };

            match joined {
                Ok((slot, outcome)) => {
                    settled[slot] = true;
                    last_item = Some(outcome.item_name.clone());
                    tracker.record(outcome);
                }
                Err(e) => {
                    tracing::error!(job_id = %job.job_id, error = %e, "Sub-task panicked");
                }
            }
        }

        for (item, _) in batch.iter().zip(&settled).filter(|(_, done)| !**done) {
            metrics::counter!("orchestrator_items_total", "status" => "failed").increment(1);
            last_item = Some(item.name.clone());
            tracker.record(Outcome::failed(item, "sub-task panicked"));
        }

        Ok(last_item)
    }
}

/// Everything one item needs, owned so it can move onto its own task.
struct SubTask {
    targets: Arc<dyn TargetProvider>,
    leases: Arc<LeaseRegistry>,
    item: WorkItem,
    payload: serde_json::Value,
    config: SchedulerConfig,
    cancel: CancellationToken,
}

impl SubTask {
    async fn execute(&self) -> Outcome {
        let item = &self.item;
        if self.cancel.is_cancelled() {
            return Outcome::failed(item, "run stopped before item started");
        }
        let lease = match self.leases.acquire(self.targets.as_ref(), &item.target).await {
            Ok(lease) => lease,
            Err(e) => return self.finish(Err(e)),
        };
        // A stop may land while the target is opening; its cleanup has
        // already run, so this lease is ours to close.
        if self.cancel.is_cancelled() {
            self.leases.release(&lease).await;
            return Outcome::failed(item, "run stopped before item started");
        }

        let result = self.attempt(&lease).await;
        self.leases.release(&lease).await;
        self.finish(result)
    }

    async fn attempt(&self, lease: &TargetLease) -> Result<InvokeResult, TargetError> {
        let ready_timeout = self.config.ready_timeout;
        tokio::time::timeout(ready_timeout, lease.await_ready(ready_timeout))
            .await
            .map_err(|_| TargetError::ReadyTimeout(ready_timeout))??;
        if self.cancel.is_cancelled() {
            return Err(TargetError::Cancelled);
        }

        let invocation = lease.invoke(&self.item, &self.payload);
        match self.config.invoke_timeout {
            Some(limit) => tokio::time::timeout(limit, invocation)
                .await
                .map_err(|_| TargetError::InvokeTimeout(limit))?,
            None => invocation.await,
        }
    }

    fn finish(&self, result: Result<InvokeResult, TargetError>) -> Outcome {
        let item = &self.item;
        let outcome = match result {
            Ok(r) if r.success => Outcome::success(item, r.detail, r.filled_fields),
            Ok(r) => {
                let detail = if r.detail.is_empty() {
                    "target reported failure".to_string()
                } else {
                    r.detail
                };
                Outcome::failed(item, detail)
            }
            Err(e) => Outcome::failed(item, e.to_string()),
        };

        if outcome.is_success() {
            metrics::counter!("orchestrator_items_total", "status" => "success").increment(1);
            tracing::debug!(item_id = %item.item_id, "Item succeeded");
        } else {
            metrics::counter!("orchestrator_items_total", "status" => "failed").increment(1);
            tracing::warn!(item_id = %item.item_id, error = %outcome.detail, "Item failed");
        }
        outcome
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Run was stopped before it finished")]
    Stopped,
}
