// Skill Validator
//
// Scores every skill of a submission for trustworthiness from its evidence.
//
// Per skill:
// - source_count: distinct evidence sources (self-reported, code host, web)
// - agreement: source_count / max(sources_collected, source_count) × 100
// - hallucination: sole self-reported evidence below the strength threshold
//   while at least two sources were collected for the submission
// - outdated: claimed current, latest dated evidence older than the window
// - manual review: hallucination, outdated, or agreement inside the review band
// - risk: weighted factors (single source, no primary source, unclaimed, vague
//   name, unbacked specialist skill, stale activity) banded into a risk level
//   and an include/verify/flag/exclude recommendation
// - confidence: mean of the strongest evidence per source, plus a bonus for
//   recent activity, banded into a named level
//
// Evidence accumulates across runs; a re-observed item refreshes its stored
// row. `revalidate` recomputes every validation from the full evidence set,
// so partial earlier runs never leak into the result.

pub mod extractor;
pub mod normalization;

use chrono::{DateTime, Months, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use uuid::Uuid;

use crate::config::ValidationConfig;
use crate::error::{EnrichError, EnrichResult};
use crate::store::ProfileStore;
use crate::types::{
    round2, CandidateSubmission, CollectionTask, ConfidenceLevel, EvidenceSource, ExtractedSkill,
    RiskFactor, RiskLevel, SkillEvidence, SkillValidation, SourceRecord, TaskStatus,
};

pub use extractor::{extract_observations, SkillObservation};
pub use normalization::{normalize_skill, NormalizedSkill};

use normalization::{is_vague, requires_evidence};

/// Evidence at most this old earns the full activity bonus
const RECENT_ACTIVITY_DAYS: i64 = 90;
/// Evidence at most this old earns the reduced activity bonus
const ACTIVE_ACTIVITY_DAYS: i64 = 180;

/// Submission-wide inputs shared by every skill evaluation
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// Sources that produced data: completed tasks, plus self-report when claims exist
    pub sources_collected: u32,
    /// Normalized names of skills claimed as currently used
    pub claimed_current: HashSet<String>,
    pub today: NaiveDate,
    pub validated_at: DateTime<Utc>,
}

impl ValidationContext {
    pub fn new(
        submission: &CandidateSubmission,
        tasks: &[CollectionTask],
        validated_at: DateTime<Utc>,
    ) -> Self {
        let completed = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count() as u32;
        let self_reported = u32::from(!submission.claimed_skills.is_empty());

        let claimed_current = submission
            .claimed_skills
            .iter()
            .filter(|c| c.current)
            .filter_map(|c| normalize_skill(&c.name, c.category.as_deref()))
            .map(|s| s.name)
            .collect();

        Self {
            sources_collected: completed + self_reported,
            claimed_current,
            today: validated_at.date_naive(),
            validated_at,
        }
    }
}

/// Validation verdict plus the skill scores derived alongside it
#[derive(Debug, Clone, PartialEq)]
pub struct SkillAssessment {
    pub validation: SkillValidation,
    /// Mean of the strongest evidence per source plus activity bonus, 0–100
    pub confidence_score: f64,
    pub confidence_level: ConfidenceLevel,
    pub evidence_count: u32,
}

pub struct SkillValidator {
    config: ValidationConfig,
}

impl Default for SkillValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

impl SkillValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Score one skill from its evidence
    ///
    /// Returns `ValidationIncomplete` when there is no evidence yet.
    pub fn evaluate(
        &self,
        skill: &ExtractedSkill,
        evidence: &[SkillEvidence],
        ctx: &ValidationContext,
    ) -> EnrichResult<SkillAssessment> {
        if evidence.is_empty() {
            return Err(EnrichError::ValidationIncomplete(skill.name.clone()));
        }

        // Strongest evidence per source
        let mut per_source: BTreeMap<EvidenceSource, f64> = BTreeMap::new();
        for e in evidence {
            let best = per_source.entry(e.source).or_insert(0.0);
            *best = best.max(e.strength);
        }
        let sources_found_in: BTreeSet<EvidenceSource> = per_source.keys().copied().collect();
        let source_count = sources_found_in.len() as u32;

        let agreement = agreement_score(source_count, ctx.sources_collected);

        let self_reported_only = source_count == 1
            && sources_found_in.contains(&EvidenceSource::SelfReported);
        let strongest = per_source.values().copied().fold(0.0, f64::max);
        let is_hallucination = self_reported_only
            && strongest < self.config.hallucination_strength_threshold
            && ctx.sources_collected >= 2;

        let latest = evidence.iter().filter_map(|e| e.recency).max();
        let is_outdated = ctx.claimed_current.contains(&skill.name)
            && self.is_stale(latest, ctx.today);

        let in_review_band = agreement >= self.config.review_band_low
            && agreement < self.config.review_band_high;
        let requires_manual_review = is_hallucination || is_outdated || in_review_band;

        let risk_factors = self.risk_factors(&skill.name, &sources_found_in, latest, ctx.today);
        let risk_score = risk_factors
            .iter()
            .map(RiskFactor::weight)
            .sum::<u32>()
            .min(100);
        let risk_level = RiskLevel::from_score(risk_score);

        let mean_strength = per_source.values().sum::<f64>() / per_source.len() as f64 * 100.0;
        let confidence =
            round2((mean_strength + self.activity_bonus(latest, ctx.today)).min(100.0));

        Ok(SkillAssessment {
            validation: SkillValidation {
                skill_id: skill.skill_id,
                skill_name: skill.name.clone(),
                sources_found_in,
                source_count,
                source_agreement_score: agreement,
                is_hallucination,
                hallucination_score: round2(100.0 - agreement),
                is_outdated,
                requires_manual_review,
                risk_score,
                risk_level,
                risk_factors,
                recommendation: risk_level.recommendation(),
                validated_at: ctx.validated_at,
            },
            confidence_score: confidence,
            confidence_level: ConfidenceLevel::from_score(confidence),
            evidence_count: evidence.len() as u32,
        })
    }

    /// True when the latest dated evidence is older than the staleness window
    ///
    /// Evidence without dates says nothing about staleness.
    fn is_stale(&self, latest: Option<NaiveDate>, today: NaiveDate) -> bool {
        let Some(latest) = latest else {
            return false;
        };
        let Some(cutoff) = today.checked_sub_months(Months::new(self.config.staleness_years * 12))
        else {
            return false;
        };
        latest < cutoff
    }

    /// Risk factors present for a skill, in weight-table order
    ///
    /// The self-report and the code host are the primary sources; web
    /// mentions alone never vouch for a skill.
    fn risk_factors(
        &self,
        name: &str,
        sources: &BTreeSet<EvidenceSource>,
        latest: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Vec<RiskFactor> {
        let mut factors = Vec::new();
        if sources.len() == 1 {
            factors.push(RiskFactor::SingleSource);
        }
        if !sources.contains(&EvidenceSource::SelfReported) {
            if sources.contains(&EvidenceSource::CodeHost) {
                factors.push(RiskFactor::NotClaimed);
            } else {
                factors.push(RiskFactor::NoPrimarySource);
            }
        }
        if is_vague(name) {
            factors.push(RiskFactor::VagueSkill);
        }
        let observed = sources.contains(&EvidenceSource::CodeHost)
            || sources.contains(&EvidenceSource::WebSearch);
        if requires_evidence(name) && !observed {
            factors.push(RiskFactor::NoConcreteEvidence);
        }
        if let Some(latest) = latest {
            if (today - latest).num_days() > self.config.stale_activity_days {
                factors.push(RiskFactor::StaleActivity);
            }
        }
        factors
    }

    /// Confidence bonus for recently dated evidence
    fn activity_bonus(&self, latest: Option<NaiveDate>, today: NaiveDate) -> f64 {
        let Some(latest) = latest else {
            return 0.0;
        };
        match (today - latest).num_days() {
            days if days <= RECENT_ACTIVITY_DAYS => self.config.recent_activity_bonus,
            days if days <= ACTIVE_ACTIVITY_DAYS => self.config.active_activity_bonus,
            _ => 0.0,
        }
    }

    /// Extract evidence from claims and records and upsert it into the store
    ///
    /// Returns the number of evidence rows that were new or refreshed.
    pub async fn ingest(
        &self,
        store: &dyn ProfileStore,
        submission: &CandidateSubmission,
        records: &[SourceRecord],
    ) -> EnrichResult<u32> {
        let observations =
            extract_observations(submission, records, self.config.self_reported_strength);

        let mut skill_ids: HashMap<String, Uuid> = HashMap::new();
        let mut changed = 0u32;

        for obs in observations {
            let skill_id = match skill_ids.get(&obs.skill.name) {
                Some(id) => *id,
                None => {
                    let skill = store
                        .ensure_skill(submission.submission_id, &obs.skill.name, obs.skill.category)
                        .await?;
                    skill_ids.insert(obs.skill.name.clone(), skill.skill_id);
                    skill.skill_id
                }
            };

            let evidence = SkillEvidence {
                evidence_id: Uuid::new_v4(),
                skill_id,
                source: obs.source,
                source_identifier: obs.source_identifier,
                evidence_text: obs.evidence_text,
                strength: obs.strength,
                recency: obs.recency,
            };
            if store.upsert_evidence(&evidence).await? {
                changed += 1;
            }
        }

        tracing::debug!(
            submission_id = %submission.submission_id,
            skills = skill_ids.len(),
            changed_evidence = changed,
            "Skill evidence ingested"
        );
        Ok(changed)
    }

    /// Recompute and persist every skill validation of a submission
    ///
    /// `tasks` is the latest task per source type. Skills without evidence
    /// are left unvalidated.
    pub async fn revalidate(
        &self,
        store: &dyn ProfileStore,
        submission: &CandidateSubmission,
        tasks: &[CollectionTask],
        validated_at: DateTime<Utc>,
    ) -> EnrichResult<Vec<SkillValidation>> {
        let ctx = ValidationContext::new(submission, tasks, validated_at);
        let skills = store.load_skills(submission.submission_id).await?;

        let mut validations = Vec::with_capacity(skills.len());
        for skill in &skills {
            let evidence = store.load_evidence(skill.skill_id).await?;
            let assessment = match self.evaluate(skill, &evidence, &ctx) {
                Ok(assessment) => assessment,
                Err(EnrichError::ValidationIncomplete(name)) => {
                    tracing::debug!(
                        submission_id = %submission.submission_id,
                        skill = %name,
                        "Skill has no evidence yet, skipping validation"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            store.upsert_validation(&assessment.validation).await?;
            store
                .update_skill_scores(
                    skill.skill_id,
                    assessment.confidence_score,
                    assessment.evidence_count,
                )
                .await?;
            validations.push(assessment.validation);
        }

        let flagged = validations
            .iter()
            .filter(|v| v.requires_manual_review)
            .count();
        tracing::info!(
            submission_id = %submission.submission_id,
            sources_collected = ctx.sources_collected,
            validated = validations.len(),
            flagged,
            "Skills validated"
        );

        Ok(validations)
    }
}

/// source_count / max(sources_collected, source_count) × 100
pub fn agreement_score(source_count: u32, sources_collected: u32) -> f64 {
    let denominator = sources_collected.max(source_count);
    if denominator == 0 {
        return 0.0;
    }
    round2(source_count as f64 / denominator as f64 * 100.0)
}
