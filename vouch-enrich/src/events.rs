//! Enrichment lifecycle events
//!
//! Broadcast over `vouch_common::events::EventBus`. Nothing in the engine
//! depends on a subscriber being present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vouch_common::events::EventBus;

use crate::types::TaskTransition;

/// Event bus carrying enrichment events
pub type EnrichmentEventBus = EventBus<EnrichmentEvent>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EnrichmentEvent {
    /// A collection task changed state (already persisted)
    TaskTransitioned {
        transition: TaskTransition,
        retry_count: u32,
        error_message: Option<String>,
    },

    /// Every task of the submission reached a terminal state
    CollectionFinished {
        submission_id: Uuid,
        completed: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// Aggregated profile stored
    ProfileAggregated {
        submission_id: Uuid,
        completeness_score: f64,
        quality_score: f64,
        timestamp: DateTime<Utc>,
    },

    /// Skill validations stored
    SkillsValidated {
        submission_id: Uuid,
        validated: usize,
        flagged: usize,
        timestamp: DateTime<Utc>,
    },

    /// In-flight work was cancelled
    SubmissionCancelled {
        submission_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Submission and all dependent rows deleted
    SubmissionDeleted {
        submission_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl EnrichmentEvent {
    pub fn submission_id(&self) -> Uuid {
        match self {
            EnrichmentEvent::TaskTransitioned { transition, .. } => transition.submission_id,
            EnrichmentEvent::CollectionFinished { submission_id, .. }
            | EnrichmentEvent::ProfileAggregated { submission_id, .. }
            | EnrichmentEvent::SkillsValidated { submission_id, .. }
            | EnrichmentEvent::SubmissionCancelled { submission_id, .. }
            | EnrichmentEvent::SubmissionDeleted { submission_id, .. } => *submission_id,
        }
    }
}
