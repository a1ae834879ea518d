//! Profile Store
//!
//! Persistence contract for every enrichment entity, keyed by submission.
//! Deleting a submission cascades to all dependent rows.

mod retry;
mod sqlite;

pub use retry::retry_on_lock;
pub use sqlite::SqliteProfileStore;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;
use vouch_common::Result;

use crate::types::{
    AggregatedProfile, CandidateSubmission, CollectionTask, ExtractedSkill, SkillCategory,
    SkillEvidence, SkillValidation, SourceRecord,
};

/// Storage contract used by the orchestrator, aggregator service and validator
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert or replace a submission
    async fn save_submission(&self, submission: &CandidateSubmission) -> Result<()>;
    async fn load_submission(&self, submission_id: Uuid) -> Result<Option<CandidateSubmission>>;
    /// Delete a submission and every dependent row; false if it did not exist
    async fn delete_submission(&self, submission_id: Uuid) -> Result<bool>;

    async fn insert_task(&self, task: &CollectionTask) -> Result<()>;
    async fn update_task(&self, task: &CollectionTask) -> Result<()>;
    /// Persist a completed task and its record atomically
    async fn complete_task(&self, task: &CollectionTask, record: &SourceRecord) -> Result<()>;
    /// All tasks of a submission, oldest first
    async fn load_tasks(&self, submission_id: Uuid) -> Result<Vec<CollectionTask>>;

    /// Records of a submission, oldest first
    async fn load_records(&self, submission_id: Uuid) -> Result<Vec<SourceRecord>>;

    async fn upsert_profile(&self, profile: &AggregatedProfile) -> Result<()>;
    async fn load_profile(&self, submission_id: Uuid) -> Result<Option<AggregatedProfile>>;

    /// Return the skill row for (submission, name), creating it if absent
    async fn ensure_skill(
        &self,
        submission_id: Uuid,
        name: &str,
        category: SkillCategory,
    ) -> Result<ExtractedSkill>;
    async fn update_skill_scores(
        &self,
        skill_id: Uuid,
        confidence_score: f64,
        evidence_count: u32,
    ) -> Result<()>;
    async fn load_skills(&self, submission_id: Uuid) -> Result<Vec<ExtractedSkill>>;

    /// Insert evidence, or refresh the row already stored for
    /// (skill, source, source identifier)
    ///
    /// Self-reported rows take the new strength and recency as-is; observed
    /// rows keep the strongest strength and the latest recency. Returns false
    /// when nothing changed.
    async fn upsert_evidence(&self, evidence: &SkillEvidence) -> Result<bool>;
    async fn load_evidence(&self, skill_id: Uuid) -> Result<Vec<SkillEvidence>>;

    async fn upsert_validation(&self, validation: &SkillValidation) -> Result<()>;
    async fn load_validations(&self, submission_id: Uuid) -> Result<Vec<SkillValidation>>;
}

/// Open (creating if needed) the SQLite database at `db_path` and apply the schema
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    tracing::debug!(path = %db_path.display(), "Connecting to database");
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;
    Ok(pool)
}

/// In-memory database for tests and one-shot runs
///
/// A single connection that never expires, so the schema outlives idle periods.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;
    Ok(pool)
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS submissions (
        submission_id TEXT PRIMARY KEY,
        identifiers TEXT NOT NULL,
        claimed_profile TEXT NOT NULL,
        claimed_skills TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS collection_tasks (
        task_id TEXT PRIMARY KEY,
        submission_id TEXT NOT NULL REFERENCES submissions(submission_id) ON DELETE CASCADE,
        source_type TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT,
        retry_count INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        rate_limit_reset_at TEXT
    )
    "#,
    // At most one active task per (submission, source type)
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_collection_tasks_active
        ON collection_tasks(submission_id, source_type)
        WHERE status IN ('pending', 'collecting')
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS source_records (
        record_id TEXT PRIMARY KEY,
        task_id TEXT NOT NULL UNIQUE REFERENCES collection_tasks(task_id) ON DELETE CASCADE,
        submission_id TEXT NOT NULL REFERENCES submissions(submission_id) ON DELETE CASCADE,
        source_type TEXT NOT NULL,
        payload TEXT NOT NULL,
        collected_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS aggregated_profiles (
        submission_id TEXT PRIMARY KEY REFERENCES submissions(submission_id) ON DELETE CASCADE,
        fields TEXT NOT NULL,
        sources_attempted INTEGER NOT NULL,
        sources_succeeded INTEGER NOT NULL,
        completeness_score REAL NOT NULL,
        quality_score REAL NOT NULL,
        freshness_score REAL NOT NULL,
        all_skills TEXT NOT NULL DEFAULT '[]',
        skills_cross_validated INTEGER NOT NULL DEFAULT 0,
        github_contributions INTEGER NOT NULL DEFAULT 0,
        web_mentions_count INTEGER NOT NULL DEFAULT 0,
        aggregated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS extracted_skills (
        skill_id TEXT PRIMARY KEY,
        submission_id TEXT NOT NULL REFERENCES submissions(submission_id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        category TEXT NOT NULL,
        confidence_score REAL NOT NULL DEFAULT 0.0,
        evidence_count INTEGER NOT NULL DEFAULT 0,
        UNIQUE (submission_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS skill_evidence (
        evidence_id TEXT PRIMARY KEY,
        skill_id TEXT NOT NULL REFERENCES extracted_skills(skill_id) ON DELETE CASCADE,
        source TEXT NOT NULL,
        source_identifier TEXT NOT NULL,
        evidence_text TEXT NOT NULL,
        strength REAL NOT NULL,
        recency TEXT,
        UNIQUE (skill_id, source, source_identifier)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS skill_validations (
        skill_id TEXT PRIMARY KEY REFERENCES extracted_skills(skill_id) ON DELETE CASCADE,
        skill_name TEXT NOT NULL,
        sources_found_in TEXT NOT NULL,
        source_count INTEGER NOT NULL,
        source_agreement_score REAL NOT NULL,
        is_hallucination INTEGER NOT NULL,
        hallucination_score REAL NOT NULL,
        is_outdated INTEGER NOT NULL,
        requires_manual_review INTEGER NOT NULL,
        risk_score INTEGER NOT NULL DEFAULT 0,
        risk_level TEXT NOT NULL DEFAULT 'minimal',
        risk_factors TEXT NOT NULL DEFAULT '[]',
        recommendation TEXT NOT NULL DEFAULT 'INCLUDE',
        validated_at TEXT NOT NULL
    )
    "#,
];

/// Create enrichment tables if they don't exist
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Database tables initialized");
    Ok(())
}
