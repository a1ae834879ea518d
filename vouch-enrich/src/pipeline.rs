//! Enrichment pipeline
//!
//! One full run for a submission: collect from every source, then aggregate
//! the profile and validate skills concurrently over the completed records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aggregation::Aggregator;
use crate::error::{EnrichError, EnrichResult};
use crate::events::{EnrichmentEvent, EnrichmentEventBus};
use crate::orchestrator::{latest_per_source, CollectionOrchestrator};
use crate::store::ProfileStore;
use crate::types::{
    AggregatedProfile, CandidateSubmission, CollectionStatus, CollectionTask, SkillValidation,
    SourceRecord,
};
use crate::validation::SkillValidator;

/// Result of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentOutcome {
    pub submission_id: Uuid,
    pub status: CollectionStatus,
    pub profile: AggregatedProfile,
    pub validations: Vec<SkillValidation>,
}

pub struct EnrichmentPipeline {
    store: Arc<dyn ProfileStore>,
    orchestrator: CollectionOrchestrator,
    aggregator: Aggregator,
    validator: SkillValidator,
    events: EnrichmentEventBus,
}

impl EnrichmentPipeline {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        orchestrator: CollectionOrchestrator,
        aggregator: Aggregator,
        validator: SkillValidator,
        events: EnrichmentEventBus,
    ) -> Self {
        Self {
            store,
            orchestrator,
            aggregator,
            validator,
            events,
        }
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    pub fn events(&self) -> &EnrichmentEventBus {
        &self.events
    }

    pub fn is_active(&self, submission_id: Uuid) -> bool {
        self.orchestrator.is_active(submission_id)
    }

    /// Collect, then aggregate and validate
    ///
    /// A submission that was enriched before keeps its earlier records; only
    /// the latest completed record per source feeds the new profile, and
    /// validations are recomputed over all accumulated evidence.
    pub async fn run(
        &self,
        submission: &CandidateSubmission,
        cancel: CancellationToken,
    ) -> EnrichResult<EnrichmentOutcome> {
        let submission_id = submission.submission_id;

        self.orchestrator.collect(submission, cancel.clone()).await?;
        if cancel.is_cancelled() {
            return Err(EnrichError::Cancelled(submission_id));
        }

        let tasks = latest_per_source(self.store.load_tasks(submission_id).await?);
        let records = self.store.load_records(submission_id).await?;

        self.validator
            .ingest(self.store.as_ref(), submission, &records)
            .await?;

        let now = Utc::now();
        let (profile, validations) = tokio::try_join!(
            self.aggregate(submission, &tasks, &records, now),
            self.validator
                .revalidate(self.store.as_ref(), submission, &tasks, now),
        )?;

        let flagged = validations
            .iter()
            .filter(|v| v.requires_manual_review)
            .count();
        self.events.emit_lossy(EnrichmentEvent::SkillsValidated {
            submission_id,
            validated: validations.len(),
            flagged,
            timestamp: Utc::now(),
        });

        tracing::info!(
            submission_id = %submission_id,
            completeness = profile.completeness_score,
            quality = profile.quality_score,
            skills = validations.len(),
            flagged,
            "Enrichment finished"
        );

        Ok(EnrichmentOutcome {
            submission_id,
            status: CollectionStatus::from_tasks(submission_id, tasks),
            profile,
            validations,
        })
    }

    async fn aggregate(
        &self,
        submission: &CandidateSubmission,
        tasks: &[CollectionTask],
        records: &[SourceRecord],
        as_of: DateTime<Utc>,
    ) -> EnrichResult<AggregatedProfile> {
        let aggregation = self.aggregator.aggregate(submission, tasks, records, as_of)?;
        self.store.upsert_profile(&aggregation.profile).await?;

        self.events.emit_lossy(EnrichmentEvent::ProfileAggregated {
            submission_id: submission.submission_id,
            completeness_score: aggregation.profile.completeness_score,
            quality_score: aggregation.profile.quality_score,
            timestamp: Utc::now(),
        });
        Ok(aggregation.profile)
    }

    /// Collection progress of a submission
    pub async fn status(&self, submission_id: Uuid) -> EnrichResult<CollectionStatus> {
        self.orchestrator.status(submission_id).await
    }
}
