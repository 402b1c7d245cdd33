//! Job orchestrator: one active job at a time, from queue to final status.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::models::status::tally;
use crate::models::{Job, JobProgress, OrchestratorStatus, Outcome, StatusUpdate};
use crate::services::catalog::{CatalogProvider, FallbackCatalog};
use crate::services::queue::{report_status, QueueError, RemoteQueue};
use crate::services::scheduler::{BatchScheduler, RunTracker, SchedulerConfig, SchedulerError};
use crate::services::target::{LeaseRegistry, TargetProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_backoff: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_backoff: Duration::from_secs(300),
        }
    }
}

/// Poll delay that doubles on every queue failure, up to a cap, and snaps
/// back to the nominal interval after a success.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    settings: PollSettings,
    current: Duration,
}

impl PollBackoff {
    pub fn new(settings: PollSettings) -> Self {
        Self {
            settings,
            current: settings.interval,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn on_failure(&mut self) -> Duration {
        self.current = self
            .current
            .saturating_mul(2)
            .min(self.settings.max_backoff.max(self.settings.interval));
        self.current
    }

    pub fn on_success(&mut self) -> Duration {
        self.current = self.settings.interval;
        self.current
    }
}

/// What a single poll did.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Nothing pending.
    Idle,
    /// A job is already running; the pending head was left alone.
    Busy { active_job_id: String },
    /// The pending head was run to a terminal state (or stopped).
    Ran { job_id: String, result: JobResult },
}

/// Terminal result of one job run.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    Completed {
        progress: JobProgress,
        outcomes: Vec<Outcome>,
    },
    Failed {
        error: String,
    },
    /// Force-stopped; no terminal status was pushed.
    Stopped,
}

struct ActiveRun {
    run_id: u64,
    tracker: Arc<RunTracker>,
}

/// Clears the active slot if the run future is dropped before it finishes.
struct ActiveGuard<'a> {
    orchestrator: &'a Orchestrator,
    run_id: u64,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator.clear_active(self.run_id);
    }
}

pub struct Orchestrator {
    queue: Arc<dyn RemoteQueue>,
    catalog: CatalogProvider,
    scheduler: BatchScheduler,
    leases: Arc<LeaseRegistry>,
    active: Mutex<Option<ActiveRun>>,
    next_run_id: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        queue: Arc<dyn RemoteQueue>,
        targets: Arc<dyn TargetProvider>,
        fallback: FallbackCatalog,
        config: SchedulerConfig,
    ) -> Self {
        let leases = Arc::new(LeaseRegistry::new());
        Self {
            catalog: CatalogProvider::new(queue.clone(), fallback),
            scheduler: BatchScheduler::new(queue.clone(), targets, leases.clone(), config),
            queue,
            leases,
            active: Mutex::new(None),
            next_run_id: AtomicU64::new(1),
        }
    }

    /// Fetch pending jobs and run the head of the list if nothing is active.
    ///
    /// Only a queue fetch failure is returned as an error; everything that
    /// goes wrong inside a job is reported through that job's status.
    pub async fn poll_once(&self) -> Result<PollOutcome, QueueError> {
        let jobs = match self.queue.fetch_pending().await {
            Ok(jobs) => jobs,
            Err(e) => {
                metrics::counter!("orchestrator_queue_fetch_failures_total").increment(1);
                return Err(e);
            }
        };

        let Some(job) = jobs.into_iter().next() else {
            tracing::trace!("No pending jobs");
            return Ok(PollOutcome::Idle);
        };

        if let Some(active_job_id) = self.active_job_id() {
            tracing::info!(
                active_job_id = %active_job_id,
                pending_job_id = %job.job_id,
                "Job already in progress, skipping poll"
            );
            return Ok(PollOutcome::Busy { active_job_id });
        }

        let job_id = job.job_id.clone();
        match self.run_job(job).await {
            Ok(result) => Ok(PollOutcome::Ran { job_id, result }),
            Err(OrchestratorError::Busy { active_job_id }) => {
                tracing::info!(
                    active_job_id = %active_job_id,
                    pending_job_id = %job_id,
                    "Job already in progress, skipping poll"
                );
                Ok(PollOutcome::Busy { active_job_id })
            }
        }
    }

    /// Run one job to a terminal state.
    ///
    /// Fails with [`OrchestratorError::Busy`] if another job holds the active
    /// slot. Otherwise every exit path clears the slot and releases any
    /// execution targets the run left open.
    #[tracing::instrument(skip_all, fields(job_id = %job.job_id, tier = %job.tier))]
    pub async fn run_job(&self, job: Job) -> Result<JobResult, OrchestratorError> {
        let (run_id, tracker) = self.claim(&job)?;
        let guard = ActiveGuard {
            orchestrator: self,
            run_id,
        };
        let started = Instant::now();

        tracing::info!(label = job.label.as_deref().unwrap_or(""), "Starting job");
        report_status(self.queue.as_ref(), &job.job_id, StatusUpdate::started()).await;

        let result = match self.execute(&job, &tracker).await {
            Ok(_) | Err(JobError::Scheduler(SchedulerError::Stopped)) if tracker.is_stopped() => {
                tracing::info!("Job was force-stopped, no terminal status sent");
                JobResult::Stopped
            }
            Ok(outcomes) => {
                let progress = tally(outcomes.len(), &outcomes);
                tracing::info!(
                    total = progress.total,
                    successful = progress.successful,
                    failed = progress.failed,
                    "Job completed"
                );
                report_status(
                    self.queue.as_ref(),
                    &job.job_id,
                    StatusUpdate::completed(progress.clone(), outcomes.clone()),
                )
                .await;
                JobResult::Completed { progress, outcomes }
            }
            Err(e) => {
                let error = e.to_string();
                tracing::error!(error = %error, "Job failed");
                report_status(self.queue.as_ref(), &job.job_id, StatusUpdate::failed(&error)).await;
                JobResult::Failed { error }
            }
        };

        let status = match &result {
            JobResult::Completed { .. } => "completed",
            JobResult::Failed { .. } => "failed",
            JobResult::Stopped => "stopped",
        };
        metrics::counter!("orchestrator_jobs_total", "status" => status).increment(1);
        metrics::histogram!("orchestrator_job_duration_seconds").record(started.elapsed().as_secs_f64());

        let still_active = self.clear_active(run_id);
        drop(guard);
        // A force stop already released everything; a later run may own the
        // registry by now.
        if still_active {
            self.leases.release_all().await;
        }

        Ok(result)
    }

    async fn execute(&self, job: &Job, tracker: &RunTracker) -> Result<Vec<Outcome>, JobError> {
        let items = self.catalog.resolve(job).await;
        if items.is_empty() {
            return Err(JobError::EmptyCatalog {
                tier: job.tier.clone(),
            });
        }

        tracing::info!(items = items.len(), "Resolved work items");
        Ok(self.scheduler.run(job, &items, tracker).await?)
    }

    /// Snapshot for external observers.
    pub fn status(&self) -> OrchestratorStatus {
        let active = self.active.lock();
        let mut status = OrchestratorStatus {
            active_handle_count: self.leases.active_count(),
            ..OrchestratorStatus::default()
        };
        if let Some(run) = active.as_ref() {
            status.is_active = true;
            status.active_job_id = Some(run.tracker.job_id().to_string());
            status.active_job_label = run.tracker.label().map(str::to_string);
            status.outcomes_so_far = run.tracker.outcomes();
        }
        status
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn active_job_id(&self) -> Option<String> {
        self.active
            .lock()
            .as_ref()
            .map(|run| run.tracker.job_id().to_string())
    }

    /// Stop the active job without waiting for in-flight invocations.
    ///
    /// The active slot is cleared immediately, no further batches start, and
    /// outcomes that arrive afterwards are discarded. Returns the stopped job id.
    pub async fn force_stop(&self) -> Option<String> {
        let stopped = self.active.lock().take();
        let job_id = stopped.map(|run| {
            run.tracker.stop();
            run.tracker.job_id().to_string()
        });

        match &job_id {
            Some(id) => tracing::warn!(job_id = %id, "Force-stopping active job"),
            None => tracing::info!("Force stop requested with no active job"),
        }

        self.leases.release_all().await;
        job_id
    }

    /// Poll on a fixed interval until `shutdown` fires, backing off while the
    /// queue is unreachable.
    pub async fn run_polling(&self, settings: PollSettings, shutdown: CancellationToken) {
        let mut backoff = PollBackoff::new(settings);
        tracing::info!(interval_ms = settings.interval.as_millis() as u64, "Polling started");

        while !shutdown.is_cancelled() {
            let delay = match self.poll_once().await {
                Ok(outcome) => {
                    tracing::debug!(?outcome, "Poll finished");
                    backoff.on_success()
                }
                Err(e) => {
                    let delay = backoff.on_failure();
                    tracing::warn!(
                        error = %e,
                        next_poll_ms = delay.as_millis() as u64,
                        "Failed to fetch pending jobs, backing off"
                    );
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => {}
            }
        }

        tracing::info!("Polling stopped");
    }

    fn claim(&self, job: &Job) -> Result<(u64, Arc<RunTracker>), OrchestratorError> {
        let mut active = self.active.lock();
        if let Some(run) = active.as_ref() {
            return Err(OrchestratorError::Busy {
                active_job_id: run.tracker.job_id().to_string(),
            });
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let tracker = Arc::new(RunTracker::new(job));
        *active = Some(ActiveRun {
            run_id,
            tracker: tracker.clone(),
        });
        Ok((run_id, tracker))
    }

    /// Clear the active slot if it still belongs to `run_id`.
    fn clear_active(&self, run_id: u64) -> bool {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|run| run.run_id == run_id) {
            *active = None;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("No work items available for tier '{tier}'")]
    EmptyCatalog { tier: String },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Job {active_job_id} is already in progress")]
    Busy { active_job_id: String },
}
