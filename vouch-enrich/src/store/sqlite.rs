//! SQLite implementation of the Profile Store

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;
use vouch_common::{Error, Result};

use super::{retry_on_lock, ProfileStore};
use crate::types::{
    AggregatedProfile, CandidateSubmission, CollectionTask, ConfidenceLevel, EvidenceSource,
    ExtractedSkill, ProfileField, Recommendation, ResolvedField, RiskLevel, SkillCategory,
    SkillEvidence, SkillValidation, SourcePayload, SourceRecord, SourceType, TaskStatus,
};

/// Default maximum time to retry a locked write
const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Profile Store backed by a SQLite pool
#[derive(Clone)]
pub struct SqliteProfileStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteProfileStore {
    /// Create new store with database pool
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn write_task(&self, task: &CollectionTask) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE collection_tasks SET
                status = ?, started_at = ?, completed_at = ?, retry_count = ?,
                error_message = ?, rate_limit_reset_at = ?
            WHERE task_id = ?
            "#,
        )
        .bind(task.status.as_str())
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.retry_count as i64)
        .bind(&task.error_message)
        .bind(task.rate_limit_reset_at)
        .bind(task.task_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("collection task {}", task.task_id)));
        }
        Ok(())
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Decode(format!("Invalid UUID '{}': {}", value, e)))
}

fn uuid_col(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let value: String = row.try_get(column)?;
    parse_uuid(&value)
}

fn source_type_col(row: &SqliteRow, column: &str) -> Result<SourceType> {
    let value: String = row.try_get(column)?;
    SourceType::parse(&value)
        .ok_or_else(|| Error::Decode(format!("Unknown source type '{}'", value)))
}

fn task_from_row(row: &SqliteRow) -> Result<CollectionTask> {
    let status: String = row.try_get("status")?;
    let retry_count: i64 = row.try_get("retry_count")?;

    Ok(CollectionTask {
        task_id: uuid_col(row, "task_id")?,
        submission_id: uuid_col(row, "submission_id")?,
        source_type: source_type_col(row, "source_type")?,
        status: TaskStatus::parse(&status)
            .ok_or_else(|| Error::Decode(format!("Unknown task status '{}'", status)))?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        retry_count: retry_count.max(0) as u32,
        error_message: row.try_get("error_message")?,
        rate_limit_reset_at: row.try_get("rate_limit_reset_at")?,
    })
}

fn skill_from_row(row: &SqliteRow) -> Result<ExtractedSkill> {
    let category: String = row.try_get("category")?;
    let evidence_count: i64 = row.try_get("evidence_count")?;
    let confidence_score: f64 = row.try_get("confidence_score")?;

    Ok(ExtractedSkill {
        skill_id: uuid_col(row, "skill_id")?,
        submission_id: uuid_col(row, "submission_id")?,
        name: row.try_get("name")?,
        category: SkillCategory::parse(&category),
        confidence_score,
        confidence_level: ConfidenceLevel::from_score(confidence_score),
        evidence_count: evidence_count.max(0) as u32,
    })
}

#[async_trait::async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn save_submission(&self, submission: &CandidateSubmission) -> Result<()> {
        let identifiers = serde_json::to_string(&submission.identifiers)?;
        let claimed_profile = serde_json::to_string(&submission.claimed_profile)?;
        let claimed_skills = serde_json::to_string(&submission.claimed_skills)?;

        retry_on_lock("save submission", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO submissions (submission_id, identifiers, claimed_profile, claimed_skills, created_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(submission_id) DO UPDATE SET
                    identifiers = excluded.identifiers,
                    claimed_profile = excluded.claimed_profile,
                    claimed_skills = excluded.claimed_skills
                "#,
            )
            .bind(submission.submission_id.to_string())
            .bind(&identifiers)
            .bind(&claimed_profile)
            .bind(&claimed_skills)
            .bind(submission.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn load_submission(&self, submission_id: Uuid) -> Result<Option<CandidateSubmission>> {
        let row = sqlx::query(
            "SELECT identifiers, claimed_profile, claimed_skills, created_at FROM submissions WHERE submission_id = ?",
        )
        .bind(submission_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let identifiers: String = row.try_get("identifiers")?;
        let claimed_profile: String = row.try_get("claimed_profile")?;
        let claimed_skills: String = row.try_get("claimed_skills")?;

        Ok(Some(CandidateSubmission {
            submission_id,
            identifiers: serde_json::from_str(&identifiers)?,
            claimed_profile: serde_json::from_str(&claimed_profile)?,
            claimed_skills: serde_json::from_str(&claimed_skills)?,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn delete_submission(&self, submission_id: Uuid) -> Result<bool> {
        let result = retry_on_lock("delete submission", self.max_lock_wait_ms, || async {
            Ok(sqlx::query("DELETE FROM submissions WHERE submission_id = ?")
                .bind(submission_id.to_string())
                .execute(&self.pool)
                .await?)
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_task(&self, task: &CollectionTask) -> Result<()> {
        retry_on_lock("insert task", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO collection_tasks (
                    task_id, submission_id, source_type, status, created_at,
                    started_at, completed_at, retry_count, error_message, rate_limit_reset_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(task.task_id.to_string())
            .bind(task.submission_id.to_string())
            .bind(task.source_type.as_str())
            .bind(task.status.as_str())
            .bind(task.created_at)
            .bind(task.started_at)
            .bind(task.completed_at)
            .bind(task.retry_count as i64)
            .bind(&task.error_message)
            .bind(task.rate_limit_reset_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn update_task(&self, task: &CollectionTask) -> Result<()> {
        retry_on_lock("update task", self.max_lock_wait_ms, || self.write_task(task)).await
    }

    async fn complete_task(&self, task: &CollectionTask, record: &SourceRecord) -> Result<()> {
        let payload = serde_json::to_string(&record.payload)?;

        retry_on_lock("complete task", self.max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
                INSERT INTO source_records (record_id, task_id, submission_id, source_type, payload, collected_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.record_id.to_string())
            .bind(record.task_id.to_string())
            .bind(record.submission_id.to_string())
            .bind(record.source_type.as_str())
            .bind(&payload)
            .bind(record.collected_at)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                UPDATE collection_tasks SET
                    status = ?, started_at = ?, completed_at = ?, retry_count = ?,
                    error_message = ?, rate_limit_reset_at = ?
                WHERE task_id = ?
                "#,
            )
            .bind(task.status.as_str())
            .bind(task.started_at)
            .bind(task.completed_at)
            .bind(task.retry_count as i64)
            .bind(&task.error_message)
            .bind(task.rate_limit_reset_at)
            .bind(task.task_id.to_string())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn load_tasks(&self, submission_id: Uuid) -> Result<Vec<CollectionTask>> {
        let rows = sqlx::query(
            "SELECT * FROM collection_tasks WHERE submission_id = ? ORDER BY created_at, rowid",
        )
        .bind(submission_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(task_from_row).collect()
    }

    async fn load_records(&self, submission_id: Uuid) -> Result<Vec<SourceRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM source_records WHERE submission_id = ? ORDER BY collected_at, rowid",
        )
        .bind(submission_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let payload: String = row.try_get("payload")?;
                let payload: SourcePayload = serde_json::from_str(&payload)?;
                Ok(SourceRecord {
                    record_id: uuid_col(row, "record_id")?,
                    task_id: uuid_col(row, "task_id")?,
                    submission_id: uuid_col(row, "submission_id")?,
                    source_type: source_type_col(row, "source_type")?,
                    payload,
                    collected_at: row.try_get("collected_at")?,
                })
            })
            .collect()
    }

    async fn upsert_profile(&self, profile: &AggregatedProfile) -> Result<()> {
        let fields = serde_json::to_string(&profile.fields)?;
        let all_skills = serde_json::to_string(&profile.all_skills)?;

        retry_on_lock("upsert profile", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO aggregated_profiles (
                    submission_id, fields, sources_attempted, sources_succeeded,
                    completeness_score, quality_score, freshness_score, all_skills,
                    skills_cross_validated, github_contributions, web_mentions_count,
                    aggregated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(submission_id) DO UPDATE SET
                    fields = excluded.fields,
                    sources_attempted = excluded.sources_attempted,
                    sources_succeeded = excluded.sources_succeeded,
                    completeness_score = excluded.completeness_score,
                    quality_score = excluded.quality_score,
                    freshness_score = excluded.freshness_score,
                    all_skills = excluded.all_skills,
                    skills_cross_validated = excluded.skills_cross_validated,
                    github_contributions = excluded.github_contributions,
                    web_mentions_count = excluded.web_mentions_count,
                    aggregated_at = excluded.aggregated_at
                "#,
            )
            .bind(profile.submission_id.to_string())
            .bind(&fields)
            .bind(profile.sources_attempted as i64)
            .bind(profile.sources_succeeded as i64)
            .bind(profile.completeness_score)
            .bind(profile.quality_score)
            .bind(profile.freshness_score)
            .bind(&all_skills)
            .bind(profile.skills_cross_validated as i64)
            .bind(profile.github_contributions as i64)
            .bind(profile.web_mentions_count as i64)
            .bind(profile.aggregated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn load_profile(&self, submission_id: Uuid) -> Result<Option<AggregatedProfile>> {
        let row = sqlx::query("SELECT * FROM aggregated_profiles WHERE submission_id = ?")
            .bind(submission_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let fields: String = row.try_get("fields")?;
        let fields: BTreeMap<ProfileField, ResolvedField> = serde_json::from_str(&fields)?;
        let attempted: i64 = row.try_get("sources_attempted")?;
        let succeeded: i64 = row.try_get("sources_succeeded")?;
        let all_skills: String = row.try_get("all_skills")?;
        let cross_validated: i64 = row.try_get("skills_cross_validated")?;
        let contributions: i64 = row.try_get("github_contributions")?;
        let mentions: i64 = row.try_get("web_mentions_count")?;

        Ok(Some(AggregatedProfile {
            submission_id,
            fields,
            sources_attempted: attempted.max(0) as u32,
            sources_succeeded: succeeded.max(0) as u32,
            completeness_score: row.try_get("completeness_score")?,
            quality_score: row.try_get("quality_score")?,
            freshness_score: row.try_get("freshness_score")?,
            all_skills: serde_json::from_str(&all_skills)?,
            skills_cross_validated: cross_validated.max(0) as u32,
            github_contributions: contributions.max(0) as u32,
            web_mentions_count: mentions.max(0) as u32,
            aggregated_at: row.try_get("aggregated_at")?,
        }))
    }

    async fn ensure_skill(
        &self,
        submission_id: Uuid,
        name: &str,
        category: SkillCategory,
    ) -> Result<ExtractedSkill> {
        retry_on_lock("ensure skill", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO extracted_skills (skill_id, submission_id, name, category)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(submission_id, name) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(submission_id.to_string())
            .bind(name)
            .bind(category.as_str())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await?;

        let row = sqlx::query("SELECT * FROM extracted_skills WHERE submission_id = ? AND name = ?")
            .bind(submission_id.to_string())
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        skill_from_row(&row)
    }

    async fn update_skill_scores(
        &self,
        skill_id: Uuid,
        confidence_score: f64,
        evidence_count: u32,
    ) -> Result<()> {
        retry_on_lock("update skill scores", self.max_lock_wait_ms, || async {
            sqlx::query(
                "UPDATE extracted_skills SET confidence_score = ?, evidence_count = ? WHERE skill_id = ?",
            )
            .bind(confidence_score)
            .bind(evidence_count as i64)
            .bind(skill_id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn load_skills(&self, submission_id: Uuid) -> Result<Vec<ExtractedSkill>> {
        let rows = sqlx::query("SELECT * FROM extracted_skills WHERE submission_id = ? ORDER BY name")
            .bind(submission_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(skill_from_row).collect()
    }

    async fn upsert_evidence(&self, evidence: &SkillEvidence) -> Result<bool> {
        // Dates are stored as ISO-8601 text, so text comparison orders them
        let result = retry_on_lock("upsert evidence", self.max_lock_wait_ms, || async {
            Ok(sqlx::query(
                r#"
                INSERT INTO skill_evidence (
                    evidence_id, skill_id, source, source_identifier, evidence_text, strength, recency
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(skill_id, source, source_identifier) DO UPDATE SET
                    evidence_text = excluded.evidence_text,
                    strength = CASE
                        WHEN excluded.source = 'self_reported' THEN excluded.strength
                        ELSE MAX(skill_evidence.strength, excluded.strength)
                    END,
                    recency = CASE
                        WHEN excluded.source = 'self_reported' THEN excluded.recency
                        ELSE MAX(
                            COALESCE(skill_evidence.recency, excluded.recency),
                            COALESCE(excluded.recency, skill_evidence.recency)
                        )
                    END
                WHERE skill_evidence.evidence_text IS NOT excluded.evidence_text
                    OR (excluded.source = 'self_reported' AND (
                        skill_evidence.strength IS NOT excluded.strength
                        OR skill_evidence.recency IS NOT excluded.recency))
                    OR (excluded.source <> 'self_reported' AND (
                        excluded.strength > skill_evidence.strength
                        OR excluded.recency > skill_evidence.recency
                        OR (skill_evidence.recency IS NULL AND excluded.recency IS NOT NULL)))
                "#,
            )
            .bind(evidence.evidence_id.to_string())
            .bind(evidence.skill_id.to_string())
            .bind(evidence.source.as_str())
            .bind(&evidence.source_identifier)
            .bind(&evidence.evidence_text)
            .bind(evidence.strength)
            .bind(evidence.recency)
            .execute(&self.pool)
            .await?)
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_evidence(&self, skill_id: Uuid) -> Result<Vec<SkillEvidence>> {
        let rows = sqlx::query("SELECT * FROM skill_evidence WHERE skill_id = ? ORDER BY rowid")
            .bind(skill_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let source: String = row.try_get("source")?;
                let recency: Option<NaiveDate> = row.try_get("recency")?;
                Ok(SkillEvidence {
                    evidence_id: uuid_col(row, "evidence_id")?,
                    skill_id: uuid_col(row, "skill_id")?,
                    source: EvidenceSource::parse(&source).ok_or_else(|| {
                        Error::Decode(format!("Unknown evidence source '{}'", source))
                    })?,
                    source_identifier: row.try_get("source_identifier")?,
                    evidence_text: row.try_get("evidence_text")?,
                    strength: row.try_get("strength")?,
                    recency,
                })
            })
            .collect()
    }

    async fn upsert_validation(&self, validation: &SkillValidation) -> Result<()> {
        let sources = serde_json::to_string(&validation.sources_found_in)?;
        let risk_factors = serde_json::to_string(&validation.risk_factors)?;

        retry_on_lock("upsert validation", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO skill_validations (
                    skill_id, skill_name, sources_found_in, source_count, source_agreement_score,
                    is_hallucination, hallucination_score, is_outdated, requires_manual_review,
                    risk_score, risk_level, risk_factors, recommendation, validated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(skill_id) DO UPDATE SET
                    skill_name = excluded.skill_name,
                    sources_found_in = excluded.sources_found_in,
                    source_count = excluded.source_count,
                    source_agreement_score = excluded.source_agreement_score,
                    is_hallucination = excluded.is_hallucination,
                    hallucination_score = excluded.hallucination_score,
                    is_outdated = excluded.is_outdated,
                    requires_manual_review = excluded.requires_manual_review,
                    risk_score = excluded.risk_score,
                    risk_level = excluded.risk_level,
                    risk_factors = excluded.risk_factors,
                    recommendation = excluded.recommendation,
                    validated_at = excluded.validated_at
                "#,
            )
            .bind(validation.skill_id.to_string())
            .bind(&validation.skill_name)
            .bind(&sources)
            .bind(validation.source_count as i64)
            .bind(validation.source_agreement_score)
            .bind(validation.is_hallucination)
            .bind(validation.hallucination_score)
            .bind(validation.is_outdated)
            .bind(validation.requires_manual_review)
            .bind(validation.risk_score as i64)
            .bind(validation.risk_level.as_str())
            .bind(&risk_factors)
            .bind(validation.recommendation.as_str())
            .bind(validation.validated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn load_validations(&self, submission_id: Uuid) -> Result<Vec<SkillValidation>> {
        let rows = sqlx::query(
            r#"
            SELECT v.* FROM skill_validations v
            JOIN extracted_skills s ON s.skill_id = v.skill_id
            WHERE s.submission_id = ?
            ORDER BY v.skill_name
            "#,
        )
        .bind(submission_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let sources: String = row.try_get("sources_found_in")?;
                let sources_found_in: BTreeSet<EvidenceSource> = serde_json::from_str(&sources)?;
                let source_count: i64 = row.try_get("source_count")?;
                let risk_score: i64 = row.try_get("risk_score")?;
                let risk_level: String = row.try_get("risk_level")?;
                let risk_factors: String = row.try_get("risk_factors")?;
                let recommendation: String = row.try_get("recommendation")?;
                let validated_at: DateTime<Utc> = row.try_get("validated_at")?;
                Ok(SkillValidation {
                    skill_id: uuid_col(row, "skill_id")?,
                    skill_name: row.try_get("skill_name")?,
                    sources_found_in,
                    source_count: source_count.max(0) as u32,
                    source_agreement_score: row.try_get("source_agreement_score")?,
                    is_hallucination: row.try_get("is_hallucination")?,
                    hallucination_score: row.try_get("hallucination_score")?,
                    is_outdated: row.try_get("is_outdated")?,
                    requires_manual_review: row.try_get("requires_manual_review")?,
                    risk_score: risk_score.clamp(0, 100) as u32,
                    risk_level: RiskLevel::parse(&risk_level).ok_or_else(|| {
                        Error::Decode(format!("Unknown risk level '{}'", risk_level))
                    })?,
                    risk_factors: serde_json::from_str(&risk_factors)?,
                    recommendation: Recommendation::parse(&recommendation).ok_or_else(|| {
                        Error::Decode(format!("Unknown recommendation '{}'", recommendation))
                    })?,
                    validated_at,
                })
            })
            .collect()
    }
}
