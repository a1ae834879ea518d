//! SQLite profile store tests

mod helpers;

use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use helpers::{code_host_payload, memory_store, submission};
use vouch_enrich::store::{init_database_pool, ProfileStore, SqliteProfileStore};
use vouch_enrich::types::{
    AggregatedProfile, CollectionTask, ConfidenceLevel, EvidenceSource, ProfileSkill,
    Recommendation, RiskFactor, RiskLevel, SkillCategory, SkillEvidence, SkillValidation,
    SourceRecord, SourceType, TaskStatus,
};

fn evidence(skill_id: Uuid, source: EvidenceSource, identifier: &str) -> SkillEvidence {
    SkillEvidence {
        evidence_id: Uuid::new_v4(),
        skill_id,
        source,
        source_identifier: identifier.to_string(),
        evidence_text: "seen".into(),
        strength: 0.8,
        recency: NaiveDate::from_ymd_opt(2024, 5, 1),
    }
}

fn profile(submission_id: Uuid, completeness: f64) -> AggregatedProfile {
    AggregatedProfile {
        submission_id,
        fields: BTreeMap::new(),
        sources_attempted: 2,
        sources_succeeded: 1,
        completeness_score: completeness,
        quality_score: completeness,
        freshness_score: 100.0,
        all_skills: vec![ProfileSkill {
            name: "rust".into(),
            category: SkillCategory::ProgrammingLanguage,
            sources: BTreeSet::from([EvidenceSource::SelfReported, EvidenceSource::CodeHost]),
        }],
        skills_cross_validated: 1,
        github_contributions: 12,
        web_mentions_count: 3,
        aggregated_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_submission_round_trip() {
    let store = memory_store().await;
    let sub = submission(Some("ada"), Some("Ada Lovelace"));
    store.save_submission(&sub).await.unwrap();

    let loaded = store.load_submission(sub.submission_id).await.unwrap().unwrap();
    assert_eq!(loaded.identifiers, sub.identifiers);
    assert_eq!(loaded.claimed_skills, sub.claimed_skills);
    assert!(store.load_submission(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_completed_task_and_record_persist_together() {
    let store = memory_store().await;
    let sub = submission(Some("ada"), None);
    store.save_submission(&sub).await.unwrap();

    let mut task = CollectionTask::new(sub.submission_id, SourceType::CodeHost);
    store.insert_task(&task).await.unwrap();
    task.transition_to(TaskStatus::Collecting).unwrap();
    store.update_task(&task).await.unwrap();
    task.transition_to(TaskStatus::Completed).unwrap();
    let record = SourceRecord::new(&task, code_host_payload("ada"));
    store.complete_task(&task, &record).await.unwrap();

    let tasks = store.load_tasks(sub.submission_id).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Completed);
    assert!(tasks[0].started_at.is_some());

    let records = store.load_records(sub.submission_id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].task_id, task.task_id);
    assert_eq!(records[0].payload, record.payload);
}

#[tokio::test]
async fn test_one_active_task_per_source() {
    let store = memory_store().await;
    let sub = submission(Some("ada"), None);
    store.save_submission(&sub).await.unwrap();

    let first = CollectionTask::new(sub.submission_id, SourceType::CodeHost);
    store.insert_task(&first).await.unwrap();
    let second = CollectionTask::new(sub.submission_id, SourceType::CodeHost);
    assert!(store.insert_task(&second).await.is_err());

    // A terminal task does not block a new one
    let done = CollectionTask::skipped(sub.submission_id, SourceType::WebSearch, "no identifier");
    store.insert_task(&done).await.unwrap();
    let fresh = CollectionTask::new(sub.submission_id, SourceType::WebSearch);
    store.insert_task(&fresh).await.unwrap();
}

#[tokio::test]
async fn test_profile_upsert_overwrites() {
    let store = memory_store().await;
    let sub = submission(Some("ada"), None);
    store.save_submission(&sub).await.unwrap();

    store.upsert_profile(&profile(sub.submission_id, 50.0)).await.unwrap();
    store.upsert_profile(&profile(sub.submission_id, 100.0)).await.unwrap();

    let loaded = store.load_profile(sub.submission_id).await.unwrap().unwrap();
    assert_eq!(loaded.completeness_score, 100.0);
    assert_eq!(loaded.all_skills, profile(sub.submission_id, 0.0).all_skills);
    assert_eq!(loaded.skills_cross_validated, 1);
    assert_eq!(loaded.github_contributions, 12);
    assert_eq!(loaded.web_mentions_count, 3);
}

#[tokio::test]
async fn test_skills_and_evidence_deduplicate() {
    let store = memory_store().await;
    let sub = submission(Some("ada"), None);
    store.save_submission(&sub).await.unwrap();

    let skill = store
        .ensure_skill(sub.submission_id, "rust", SkillCategory::ProgrammingLanguage)
        .await
        .unwrap();
    let again = store
        .ensure_skill(sub.submission_id, "rust", SkillCategory::Other)
        .await
        .unwrap();
    assert_eq!(skill.skill_id, again.skill_id);
    assert_eq!(again.category, SkillCategory::ProgrammingLanguage);

    assert!(store
        .upsert_evidence(&evidence(skill.skill_id, EvidenceSource::CodeHost, "ada/languages/rust"))
        .await
        .unwrap());
    assert!(!store
        .upsert_evidence(&evidence(skill.skill_id, EvidenceSource::CodeHost, "ada/languages/rust"))
        .await
        .unwrap());
    assert!(store
        .upsert_evidence(&evidence(skill.skill_id, EvidenceSource::SelfReported, "claim"))
        .await
        .unwrap());

    let stored = store.load_evidence(skill.skill_id).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].recency, NaiveDate::from_ymd_opt(2024, 5, 1));

    store.update_skill_scores(skill.skill_id, 72.5, 2).await.unwrap();
    let skills = store.load_skills(sub.submission_id).await.unwrap();
    assert_eq!(skills[0].confidence_score, 72.5);
    assert_eq!(skills[0].confidence_level, ConfidenceLevel::Medium);
    assert_eq!(skills[0].evidence_count, 2);
}

#[tokio::test]
async fn test_observed_evidence_keeps_latest_recency_and_strongest_strength() {
    let store = memory_store().await;
    let sub = submission(Some("ada"), None);
    store.save_submission(&sub).await.unwrap();
    let skill = store
        .ensure_skill(sub.submission_id, "rust", SkillCategory::ProgrammingLanguage)
        .await
        .unwrap();

    let mut observed = evidence(skill.skill_id, EvidenceSource::CodeHost, "ada/languages/rust");
    observed.recency = NaiveDate::from_ymd_opt(2020, 1, 1);
    store.upsert_evidence(&observed).await.unwrap();

    // Fresher activity, weaker signal: recency moves forward, strength stays
    let mut fresher = evidence(skill.skill_id, EvidenceSource::CodeHost, "ada/languages/rust");
    fresher.recency = NaiveDate::from_ymd_opt(2024, 9, 1);
    fresher.strength = 0.72;
    assert!(store.upsert_evidence(&fresher).await.unwrap());

    // Older activity never rolls recency back
    let mut older = evidence(skill.skill_id, EvidenceSource::CodeHost, "ada/languages/rust");
    older.recency = NaiveDate::from_ymd_opt(2019, 1, 1);
    older.strength = 0.72;
    assert!(!store.upsert_evidence(&older).await.unwrap());

    let stored = store.load_evidence(skill.skill_id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].recency, NaiveDate::from_ymd_opt(2024, 9, 1));
    assert_eq!(stored[0].strength, 0.8);
}

#[tokio::test]
async fn test_self_reported_evidence_is_replaced() {
    let store = memory_store().await;
    let sub = submission(Some("ada"), None);
    store.save_submission(&sub).await.unwrap();
    let skill = store
        .ensure_skill(sub.submission_id, "perl", SkillCategory::ProgrammingLanguage)
        .await
        .unwrap();

    store
        .upsert_evidence(&evidence(skill.skill_id, EvidenceSource::SelfReported, "claim"))
        .await
        .unwrap();

    let mut corrected = evidence(skill.skill_id, EvidenceSource::SelfReported, "claim");
    corrected.recency = NaiveDate::from_ymd_opt(2015, 3, 1);
    corrected.strength = 0.5;
    assert!(store.upsert_evidence(&corrected).await.unwrap());

    let stored = store.load_evidence(skill.skill_id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].recency, NaiveDate::from_ymd_opt(2015, 3, 1));
    assert_eq!(stored[0].strength, 0.5);
}

#[tokio::test]
async fn test_validation_upsert_one_per_skill() {
    let store = memory_store().await;
    let sub = submission(Some("ada"), None);
    store.save_submission(&sub).await.unwrap();
    let skill = store
        .ensure_skill(sub.submission_id, "go", SkillCategory::ProgrammingLanguage)
        .await
        .unwrap();

    let mut validation = SkillValidation {
        skill_id: skill.skill_id,
        skill_name: "go".into(),
        sources_found_in: BTreeSet::from([EvidenceSource::SelfReported]),
        source_count: 1,
        source_agreement_score: 33.33,
        is_hallucination: true,
        hallucination_score: 66.67,
        is_outdated: false,
        requires_manual_review: true,
        risk_score: 30,
        risk_level: RiskLevel::Low,
        risk_factors: vec![RiskFactor::SingleSource],
        recommendation: Recommendation::Verify,
        validated_at: Utc::now(),
    };
    store.upsert_validation(&validation).await.unwrap();

    validation.sources_found_in.insert(EvidenceSource::CodeHost);
    validation.source_count = 2;
    validation.is_hallucination = false;
    validation.risk_score = 0;
    validation.risk_level = RiskLevel::Minimal;
    validation.risk_factors.clear();
    validation.recommendation = Recommendation::Include;
    store.upsert_validation(&validation).await.unwrap();

    let stored = store.load_validations(sub.submission_id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].source_count, 2);
    assert!(!stored[0].is_hallucination);
    assert_eq!(stored[0].sources_found_in, validation.sources_found_in);
    assert_eq!(stored[0].risk_level, RiskLevel::Minimal);
    assert!(stored[0].risk_factors.is_empty());
    assert_eq!(stored[0].recommendation, Recommendation::Include);
}

#[tokio::test]
async fn test_delete_cascades_to_everything() {
    let store = memory_store().await;
    let sub = submission(Some("ada"), None);
    store.save_submission(&sub).await.unwrap();

    let mut task = CollectionTask::new(sub.submission_id, SourceType::CodeHost);
    store.insert_task(&task).await.unwrap();
    task.transition_to(TaskStatus::Collecting).unwrap();
    task.transition_to(TaskStatus::Completed).unwrap();
    store
        .complete_task(&task, &SourceRecord::new(&task, code_host_payload("ada")))
        .await
        .unwrap();
    store.upsert_profile(&profile(sub.submission_id, 100.0)).await.unwrap();
    let skill = store
        .ensure_skill(sub.submission_id, "rust", SkillCategory::ProgrammingLanguage)
        .await
        .unwrap();
    store
        .upsert_evidence(&evidence(skill.skill_id, EvidenceSource::CodeHost, "x"))
        .await
        .unwrap();

    assert!(store.delete_submission(sub.submission_id).await.unwrap());
    assert!(!store.delete_submission(sub.submission_id).await.unwrap());

    assert!(store.load_submission(sub.submission_id).await.unwrap().is_none());
    assert!(store.load_tasks(sub.submission_id).await.unwrap().is_empty());
    assert!(store.load_records(sub.submission_id).await.unwrap().is_empty());
    assert!(store.load_profile(sub.submission_id).await.unwrap().is_none());
    assert!(store.load_skills(sub.submission_id).await.unwrap().is_empty());
    assert!(store.load_evidence(skill.skill_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_file_database_created_in_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("vouch.db");

    let pool = init_database_pool(&path).await.unwrap();
    let store = SqliteProfileStore::new(pool);
    let sub = submission(Some("ada"), None);
    store.save_submission(&sub).await.unwrap();

    assert!(path.exists());
    assert!(store.load_submission(sub.submission_id).await.unwrap().is_some());
}
