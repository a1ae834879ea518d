//! Error types for vouch-enrich
//!
//! Collector failures have their own taxonomy (`collectors::CollectorError`)
//! and never escape the orchestrator. `EnrichError` covers what callers of the
//! engine can observe.

use thiserror::Error;
use uuid::Uuid;

use crate::types::TaskStatus;

/// Engine result type
pub type EnrichResult<T> = std::result::Result<T, EnrichError>;

/// Engine error type
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Store, config or I/O failure
    #[error(transparent)]
    Common(#[from] vouch_common::Error),

    /// Aggregation requested while tasks are still running
    #[error("Collection still in progress for submission {submission_id}: {pending} task(s) not terminal")]
    CollectionInProgress { submission_id: Uuid, pending: usize },

    /// A collection run is already active for this submission
    #[error("Collection already running for submission {0}")]
    AlreadyRunning(Uuid),

    /// Task state machine violation
    #[error("Invalid task transition for {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// Skill has no evidence; validation skipped
    #[error("Validation incomplete for skill '{0}': no evidence")]
    ValidationIncomplete(String),

    /// Work was cancelled before completion
    #[error("Enrichment cancelled for submission {0}")]
    Cancelled(Uuid),

    /// Work queue no longer accepts jobs
    #[error("Enrichment queue closed")]
    QueueClosed,

    /// Unknown submission
    #[error("Submission not found: {0}")]
    SubmissionNotFound(Uuid),

    /// Collector construction failed
    #[error("Collector setup failed: {0}")]
    CollectorSetup(String),
}
