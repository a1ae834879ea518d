//! Enrichment work queue
//!
//! Bounded queue of submissions drained by a fixed pool of workers. Each job
//! owns a cancellation token registered under its submission id, so callers
//! can cancel or delete a submission whose enrichment is queued or running.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::error::{EnrichError, EnrichResult};
use crate::events::EnrichmentEvent;
use crate::pipeline::{EnrichmentOutcome, EnrichmentPipeline};
use crate::types::{CandidateSubmission, CollectionStatus};

type JobReply = oneshot::Sender<EnrichResult<EnrichmentOutcome>>;

struct Job {
    submission: CandidateSubmission,
    cancel: CancellationToken,
    done: CancellationToken,
    reply: JobReply,
}

/// Tokens of a queued or running job
#[derive(Clone)]
struct ActiveJob {
    cancel: CancellationToken,
    /// Cancelled by the worker once the job has stopped
    done: CancellationToken,
}

type ActiveJobs = Arc<RwLock<HashMap<Uuid, ActiveJob>>>;

/// Handle to an enqueued job
pub struct JobHandle {
    submission_id: Uuid,
    rx: oneshot::Receiver<EnrichResult<EnrichmentOutcome>>,
}

impl JobHandle {
    pub fn submission_id(&self) -> Uuid {
        self.submission_id
    }

    /// Wait for the job to finish
    pub async fn wait(self) -> EnrichResult<EnrichmentOutcome> {
        self.rx.await.map_err(|_| EnrichError::QueueClosed)?
    }
}

pub struct EnrichmentQueue {
    tx: mpsc::Sender<Job>,
    pipeline: Arc<EnrichmentPipeline>,
    active: ActiveJobs,
    workers: JoinSet<()>,
}

impl EnrichmentQueue {
    /// Start `queue_workers` workers behind a queue of `queue_capacity` jobs
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(pipeline: Arc<EnrichmentPipeline>, config: &OrchestratorConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let active: ActiveJobs = Arc::new(RwLock::new(HashMap::new()));

        let mut workers = JoinSet::new();
        for worker_id in 0..config.queue_workers.max(1) {
            workers.spawn(worker_loop(
                worker_id,
                Arc::clone(&rx),
                Arc::clone(&pipeline),
                Arc::clone(&active),
            ));
        }

        tracing::info!(
            workers = config.queue_workers.max(1),
            capacity = config.queue_capacity.max(1),
            "Enrichment queue started"
        );

        Self {
            tx,
            pipeline,
            active,
            workers,
        }
    }

    /// Queue a submission for enrichment
    ///
    /// Waits for queue space. Rejects a submission that is already queued or
    /// running.
    pub async fn enqueue(&self, submission: CandidateSubmission) -> EnrichResult<JobHandle> {
        let submission_id = submission.submission_id;
        let job = ActiveJob {
            cancel: CancellationToken::new(),
            done: CancellationToken::new(),
        };

        {
            let mut active = self.active.write().await;
            if active.contains_key(&submission_id) {
                return Err(EnrichError::AlreadyRunning(submission_id));
            }
            active.insert(submission_id, job.clone());
        }

        let (reply, rx) = oneshot::channel();
        let queued = Job {
            submission,
            cancel: job.cancel,
            done: job.done,
            reply,
        };
        if self.tx.send(queued).await.is_err() {
            self.active.write().await.remove(&submission_id);
            return Err(EnrichError::QueueClosed);
        }

        tracing::debug!(submission_id = %submission_id, "Submission queued");
        Ok(JobHandle { submission_id, rx })
    }

    /// Cancel queued or running work for a submission
    ///
    /// Returns false when nothing was in flight.
    pub async fn cancel(&self, submission_id: Uuid) -> bool {
        let Some(job) = self.active.read().await.get(&submission_id).cloned() else {
            return false;
        };

        job.cancel.cancel();
        tracing::info!(submission_id = %submission_id, "Enrichment cancellation requested");
        self.pipeline
            .events()
            .emit_lossy(EnrichmentEvent::SubmissionCancelled {
                submission_id,
                timestamp: Utc::now(),
            });
        true
    }

    /// Cancel any in-flight work, wait for it to stop, then delete the
    /// submission and every dependent row
    pub async fn delete_submission(&self, submission_id: Uuid) -> EnrichResult<bool> {
        let in_flight = self.active.read().await.get(&submission_id).cloned();
        if let Some(job) = in_flight {
            self.cancel(submission_id).await;
            job.done.cancelled().await;
        }

        let deleted = self.pipeline.store().delete_submission(submission_id).await?;
        if deleted {
            tracing::info!(submission_id = %submission_id, "Submission deleted");
            self.pipeline
                .events()
                .emit_lossy(EnrichmentEvent::SubmissionDeleted {
                    submission_id,
                    timestamp: Utc::now(),
                });
        }
        Ok(deleted)
    }

    pub async fn status(&self, submission_id: Uuid) -> EnrichResult<CollectionStatus> {
        self.pipeline.status(submission_id).await
    }

    pub async fn is_in_flight(&self, submission_id: Uuid) -> bool {
        self.active.read().await.contains_key(&submission_id)
    }

    /// Stop accepting jobs and wait for queued work to drain
    pub async fn shutdown(self) {
        let Self { tx, mut workers, .. } = self;
        drop(tx);
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Enrichment worker panicked");
            }
        }
        tracing::info!("Enrichment queue stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    pipeline: Arc<EnrichmentPipeline>,
    active: ActiveJobs,
) {
    loop {
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };
        let submission_id = job.submission.submission_id;

        let result = if job.cancel.is_cancelled() {
            Err(EnrichError::Cancelled(submission_id))
        } else {
            tracing::debug!(worker_id, submission_id = %submission_id, "Worker picked up submission");
            pipeline.run(&job.submission, job.cancel.clone()).await
        };

        match &result {
            Ok(_) => {}
            Err(EnrichError::Cancelled(_)) => {
                tracing::info!(worker_id, submission_id = %submission_id, "Enrichment cancelled");
            }
            Err(e) => {
                tracing::error!(worker_id, submission_id = %submission_id, error = %e, "Enrichment failed");
            }
        }

        active.write().await.remove(&submission_id);
        job.done.cancel();
        // Receiver may have been dropped; the result is persisted either way
        let _ = job.reply.send(result);
    }

    tracing::debug!(worker_id, "Enrichment worker exiting");
}
