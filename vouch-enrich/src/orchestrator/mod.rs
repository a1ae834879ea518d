//! Collection Orchestrator
//!
//! Creates one `CollectionTask` per registered source type, runs the tasks of a
//! submission concurrently under a global fetch ceiling, and drives each task
//! through its state machine:
//!
//! ```text
//! pending → collecting ─┬→ completed   (payload stored)
//!            ↺ retry    ├→ skipped     (not found / no identifier)
//!                       └→ failed      (auth, retry budget, second malformed)
//! ```
//!
//! Every transition is persisted before the next suspension point. `collect`
//! returns only after all tasks are terminal (the aggregation barrier).

pub mod backoff;

use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::collectors::{CollectorError, CollectorRegistry, SourceCollector};
use crate::config::OrchestratorConfig;
use crate::error::{EnrichError, EnrichResult};
use crate::events::{EnrichmentEvent, EnrichmentEventBus};
use crate::store::ProfileStore;
use crate::types::{
    CandidateSubmission, CollectionStatus, CollectionTask, SourcePayload, SourceRecord, SourceType,
    TaskStatus, TaskTransition,
};

/// Error message stored on tasks created without an identifier
pub const NO_IDENTIFIER: &str = "no identifier";

/// Error message stored on tasks left active by an interrupted run
pub const INTERRUPTED: &str = "interrupted before completion";

/// Coordinates collectors for candidate submissions
pub struct CollectionOrchestrator {
    store: Arc<dyn ProfileStore>,
    collectors: CollectorRegistry,
    fetch_permits: Arc<Semaphore>,
    fetch_timeout: Duration,
    events: EnrichmentEventBus,
    /// Submissions with a collection run in this process
    active: Mutex<HashSet<Uuid>>,
}

impl CollectionOrchestrator {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        collectors: CollectorRegistry,
        config: &OrchestratorConfig,
        events: EnrichmentEventBus,
    ) -> Self {
        let ceiling = config
            .max_concurrent_fetches
            .unwrap_or(2 * collectors.len())
            .max(1);

        tracing::info!(
            collectors = collectors.len(),
            max_concurrent_fetches = ceiling,
            "Collection orchestrator ready"
        );

        Self {
            store,
            collectors,
            fetch_permits: Arc::new(Semaphore::new(ceiling)),
            fetch_timeout: config.fetch_timeout(),
            events,
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn source_types(&self) -> Vec<SourceType> {
        self.collectors.source_types()
    }

    pub fn events(&self) -> &EnrichmentEventBus {
        &self.events
    }

    /// Run every registered collector for `submission` and wait for all tasks
    ///
    /// Returns the tasks of this run, all terminal. Cancellation stops the run
    /// at the next suspension point without writing terminal states.
    pub async fn collect(
        &self,
        submission: &CandidateSubmission,
        cancel: CancellationToken,
    ) -> EnrichResult<Vec<CollectionTask>> {
        let submission_id = submission.submission_id;
        let _guard = ActiveGuard::acquire(&self.active, submission_id)?;

        self.store.save_submission(submission).await?;
        self.close_interrupted_tasks(submission_id).await?;

        let mut tasks = Vec::new();
        let mut join_set = JoinSet::new();

        for source in self.collectors.source_types() {
            let Some(identifier) = submission.identifier_for(source) else {
                let task = CollectionTask::skipped(submission_id, source, NO_IDENTIFIER);
                self.store.insert_task(&task).await?;
                tracing::info!(submission_id = %submission_id, source = %source, "No identifier, task skipped");
                tasks.push(task);
                continue;
            };

            let Some(collector) = self.collectors.get(source) else {
                continue;
            };

            let task = CollectionTask::new(submission_id, source);
            self.store.insert_task(&task).await?;

            let runner = TaskRunner {
                task,
                identifier: identifier.to_string(),
                collector,
                store: Arc::clone(&self.store),
                permits: Arc::clone(&self.fetch_permits),
                fetch_timeout: self.fetch_timeout,
                events: self.events.clone(),
                cancel: cancel.clone(),
            };
            join_set.spawn(runner.run());
        }

        tracing::info!(
            submission_id = %submission_id,
            dispatched = join_set.len(),
            skipped = tasks.len(),
            "Collection started"
        );

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(task)) => tasks.push(task),
                Ok(Err(EnrichError::Cancelled(_))) => {}
                Ok(Err(e)) => {
                    tracing::error!(submission_id = %submission_id, error = %e, "Collection task aborted");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    tracing::error!(submission_id = %submission_id, error = %e, "Collection task panicked");
                    first_error.get_or_insert(EnrichError::Common(vouch_common::Error::Internal(
                        format!("collection task panicked: {}", e),
                    )));
                }
            }
        }

        if cancel.is_cancelled() {
            tracing::info!(submission_id = %submission_id, "Collection cancelled");
            return Err(EnrichError::Cancelled(submission_id));
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        tasks.sort_by_key(|t| t.source_type);
        let completed = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        tracing::info!(
            submission_id = %submission_id,
            completed,
            total = tasks.len(),
            "Collection finished"
        );
        self.events.emit_lossy(EnrichmentEvent::CollectionFinished {
            submission_id,
            completed,
            total: tasks.len(),
            timestamp: Utc::now(),
        });

        Ok(tasks)
    }

    /// Current collection progress (latest task per source type)
    pub async fn status(&self, submission_id: Uuid) -> EnrichResult<CollectionStatus> {
        if self.store.load_submission(submission_id).await?.is_none() {
            return Err(EnrichError::SubmissionNotFound(submission_id));
        }
        let tasks = latest_per_source(self.store.load_tasks(submission_id).await?);
        Ok(CollectionStatus::from_tasks(submission_id, tasks))
    }

    pub fn is_active(&self, submission_id: Uuid) -> bool {
        lock_set(&self.active).contains(&submission_id)
    }

    /// Fail tasks left non-terminal by a cancelled or crashed run
    async fn close_interrupted_tasks(&self, submission_id: Uuid) -> EnrichResult<()> {
        for mut task in self.store.load_tasks(submission_id).await? {
            if task.is_terminal() {
                continue;
            }
            if task.status == TaskStatus::Pending {
                task.transition_to(TaskStatus::Collecting)?;
            }
            task.error_message = Some(INTERRUPTED.to_string());
            task.transition_to(TaskStatus::Failed)?;
            self.store.update_task(&task).await?;
            tracing::warn!(
                submission_id = %submission_id,
                task_id = %task.task_id,
                source = %task.source_type,
                "Closed interrupted task"
            );
        }
        Ok(())
    }
}

/// Keep the most recent task of each source type
pub fn latest_per_source(tasks: Vec<CollectionTask>) -> Vec<CollectionTask> {
    let mut latest: BTreeMap<SourceType, CollectionTask> = BTreeMap::new();
    for task in tasks {
        latest.insert(task.source_type, task);
    }
    latest.into_values().collect()
}

fn lock_set(set: &Mutex<HashSet<Uuid>>) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
    match set.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Marks a submission active for the lifetime of one `collect` call
struct ActiveGuard<'a> {
    set: &'a Mutex<HashSet<Uuid>>,
    submission_id: Uuid,
}

impl<'a> ActiveGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<Uuid>>, submission_id: Uuid) -> EnrichResult<Self> {
        if !lock_set(set).insert(submission_id) {
            return Err(EnrichError::AlreadyRunning(submission_id));
        }
        Ok(Self { set, submission_id })
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        lock_set(self.set).remove(&self.submission_id);
    }
}

/// Single owner of one task for the duration of a run
struct TaskRunner {
    task: CollectionTask,
    identifier: String,
    collector: Arc<dyn SourceCollector>,
    store: Arc<dyn ProfileStore>,
    permits: Arc<Semaphore>,
    fetch_timeout: Duration,
    events: EnrichmentEventBus,
    cancel: CancellationToken,
}

impl TaskRunner {
    async fn run(mut self) -> EnrichResult<CollectionTask> {
        let policy = self.collector.retry_policy();
        let mut malformed_seen = false;

        self.transition(TaskStatus::Collecting).await?;

        loop {
            self.wait_for_quota().await?;

            let result = self.attempt().await?;
            let err = match result {
                Ok(payload) if payload.source_type() == self.task.source_type => {
                    return self.complete(payload).await;
                }
                Ok(payload) => CollectorError::MalformedResponse(format!(
                    "collector returned {} payload",
                    payload.source_type()
                )),
                Err(e) => e,
            };

            match err {
                CollectorError::NotFound(msg) => {
                    self.task.error_message = Some(msg);
                    self.transition(TaskStatus::Skipped).await?;
                    return Ok(self.task);
                }
                CollectorError::AuthFailure(_) => return self.fail(err.to_string()).await,
                CollectorError::MalformedResponse(_) if malformed_seen => {
                    return self.fail(err.to_string()).await;
                }
                retryable => {
                    if matches!(retryable, CollectorError::MalformedResponse(_)) {
                        malformed_seen = true;
                    }
                    if let CollectorError::RateLimited { reset_at } = &retryable {
                        self.task.rate_limit_reset_at = *reset_at;
                    }

                    self.task.retry_count += 1;
                    if self.task.retry_count >= policy.max_retries {
                        return self.fail(retryable.to_string()).await;
                    }

                    self.task.error_message = Some(retryable.to_string());
                    self.transition(TaskStatus::Collecting).await?;

                    let delay = backoff::retry_delay(
                        &policy,
                        self.task.retry_count,
                        self.task.rate_limit_reset_at,
                        Utc::now(),
                    );
                    tracing::warn!(
                        submission_id = %self.task.submission_id,
                        source = %self.task.source_type,
                        retry_count = self.task.retry_count,
                        delay_ms = delay.as_millis() as u64,
                        error = %retryable,
                        "Collection attempt failed, retrying"
                    );
                    self.sleep(delay).await?;
                }
            }
        }
    }

    /// One fetch under the global ceiling and the per-attempt timeout
    async fn attempt(&self) -> EnrichResult<Result<SourcePayload, CollectorError>> {
        let _permit = tokio::select! {
            _ = self.cancel.cancelled() => return Err(self.cancelled()),
            permit = Arc::clone(&self.permits).acquire_owned() => permit.map_err(|_| {
                EnrichError::Common(vouch_common::Error::Internal("fetch semaphore closed".into()))
            })?,
        };

        tracing::debug!(
            submission_id = %self.task.submission_id,
            source = %self.task.source_type,
            attempt = self.task.retry_count + 1,
            "Fetching"
        );

        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => return Err(self.cancelled()),
            outcome = tokio::time::timeout(self.fetch_timeout, self.collector.fetch(&self.identifier)) => outcome,
        };

        Ok(outcome.unwrap_or_else(|_| {
            Err(CollectorError::Transient(format!(
                "fetch timed out after {}s",
                self.fetch_timeout.as_secs_f64()
            )))
        }))
    }

    /// Defer dispatch while the collector reports an exhausted quota
    async fn wait_for_quota(&mut self) -> EnrichResult<()> {
        let now = Utc::now();
        let quota = self.collector.rate_limit_state();
        if !quota.is_exhausted(now) {
            return Ok(());
        }

        self.task.rate_limit_reset_at = quota.reset_at;
        self.store.update_task(&self.task).await?;

        let wait = backoff::until(quota.reset_at, now);
        tracing::info!(
            submission_id = %self.task.submission_id,
            source = %self.task.source_type,
            wait_ms = wait.as_millis() as u64,
            "Quota exhausted, deferring fetch"
        );
        self.sleep(wait).await
    }

    async fn complete(mut self, payload: SourcePayload) -> EnrichResult<CollectionTask> {
        self.task.error_message = None;
        self.task.rate_limit_reset_at = None;
        let transition = self.task.transition_to(TaskStatus::Completed)?;

        let record = SourceRecord::new(&self.task, payload);
        self.store.complete_task(&self.task, &record).await?;
        self.emit(transition);

        tracing::info!(
            submission_id = %self.task.submission_id,
            source = %self.task.source_type,
            retry_count = self.task.retry_count,
            "Collection task completed"
        );
        Ok(self.task)
    }

    async fn fail(mut self, message: String) -> EnrichResult<CollectionTask> {
        tracing::error!(
            submission_id = %self.task.submission_id,
            source = %self.task.source_type,
            retry_count = self.task.retry_count,
            error = %message,
            "Collection task failed"
        );
        self.task.error_message = Some(message);
        self.transition(TaskStatus::Failed).await?;
        Ok(self.task)
    }

    /// Apply and persist a transition, then publish it
    async fn transition(&mut self, status: TaskStatus) -> EnrichResult<()> {
        let transition = self.task.transition_to(status)?;
        self.store.update_task(&self.task).await?;
        self.emit(transition);
        Ok(())
    }

    fn emit(&self, transition: TaskTransition) {
        self.events.emit_lossy(EnrichmentEvent::TaskTransitioned {
            transition,
            retry_count: self.task.retry_count,
            error_message: self.task.error_message.clone(),
        });
    }

    async fn sleep(&self, duration: Duration) -> EnrichResult<()> {
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(self.cancelled()),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    fn cancelled(&self) -> EnrichError {
        tracing::debug!(
            submission_id = %self.task.submission_id,
            source = %self.task.source_type,
            "Collection task cancelled"
        );
        EnrichError::Cancelled(self.task.submission_id)
    }
}
