// Multi-source Aggregator
//
// Merges the self-reported profile and every completed source record of a
// submission into one AggregatedProfile.
//
// Algorithm:
// 1. For each mergeable field, collect the value each source supplies
// 2. Group values by normalized form; the largest group wins, ties broken by
//    source priority (code host > self-reported > web search)
// 3. Consistency = winning group size / sources supplying the field × 100
// 4. Completeness, quality and freshness are computed over the task list
// 5. The skill summary lists every skill named by the claims or the usable
//    records; skills named by more than one source count as cross-validated
//
// Pure function of its inputs plus an explicit `as_of` instant.

pub mod normalize;

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use crate::config::AggregationConfig;
use crate::error::{EnrichError, EnrichResult};
use crate::types::{
    round2, AggregatedProfile, CandidateSubmission, CollectionTask, EvidenceSource, ProfileField,
    ProfileFields, ResolvedField, SourcePayload, SourceRecord, SourceType, TaskStatus,
};
use crate::validation::extractor::skill_summary;

pub use normalize::normalize_field;

/// A value that lost field resolution (informational)
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationConflict {
    pub field: ProfileField,
    pub kept: String,
    pub discarded: String,
    pub discarded_sources: Vec<EvidenceSource>,
    /// Normalized Levenshtein similarity of the two values, 0–1
    pub similarity: f64,
}

/// Aggregator output
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub profile: AggregatedProfile,
    pub conflicts: Vec<AggregationConflict>,
}

/// Profile aggregator
pub struct Aggregator {
    config: AggregationConfig,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(AggregationConfig::default())
    }
}

impl Aggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self { config }
    }

    /// Aggregate a submission whose collection has finished
    ///
    /// `tasks` is the latest task per source type. Records of tasks that are
    /// not in `tasks` or not completed are ignored. Any non-terminal task
    /// rejects the call with `CollectionInProgress`.
    pub fn aggregate(
        &self,
        submission: &CandidateSubmission,
        tasks: &[CollectionTask],
        records: &[SourceRecord],
        as_of: DateTime<Utc>,
    ) -> EnrichResult<Aggregation> {
        let submission_id = submission.submission_id;

        let pending = tasks.iter().filter(|t| !t.is_terminal()).count();
        if pending > 0 {
            return Err(EnrichError::CollectionInProgress {
                submission_id,
                pending,
            });
        }

        let records = usable_records(tasks, records);

        let mut candidates: Vec<(EvidenceSource, &ProfileFields)> =
            vec![(EvidenceSource::SelfReported, &submission.claimed_profile)];
        candidates.extend(
            records
                .iter()
                .map(|r| (EvidenceSource::from(r.source_type), r.payload.profile_fields())),
        );

        let mut fields = BTreeMap::new();
        let mut conflicts = Vec::new();
        for field in ProfileField::ALL {
            let (resolved, field_conflicts) = resolve_field(field, &candidates);
            if let Some(resolved) = resolved {
                fields.insert(field, resolved);
            }
            conflicts.extend(field_conflicts);
        }

        for conflict in &conflicts {
            tracing::warn!(
                submission_id = %submission_id,
                field = %conflict.field,
                kept = %conflict.kept,
                discarded = %conflict.discarded,
                similarity = conflict.similarity,
                "Aggregation conflict"
            );
        }

        let attempted = tasks.iter().filter(|t| t.was_attempted()).count() as u32;
        let succeeded = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count() as u32;
        let completeness = completeness_score(succeeded, attempted);
        let quality = self.quality_score(completeness, &fields);
        let freshness = self.freshness_score(&records, as_of);

        let all_skills = skill_summary(submission, records.iter().copied());
        let skills_cross_validated =
            all_skills.iter().filter(|s| s.sources.len() > 1).count() as u32;
        let (github_contributions, web_mentions_count) = activity_counts(&records);

        tracing::info!(
            submission_id = %submission_id,
            fields = fields.len(),
            conflicts = conflicts.len(),
            completeness,
            quality,
            freshness,
            skills = all_skills.len(),
            skills_cross_validated,
            "Profile aggregated"
        );

        Ok(Aggregation {
            profile: AggregatedProfile {
                submission_id,
                fields,
                sources_attempted: attempted,
                sources_succeeded: succeeded,
                completeness_score: completeness,
                quality_score: quality,
                freshness_score: freshness,
                all_skills,
                skills_cross_validated,
                github_contributions,
                web_mentions_count,
                aggregated_at: as_of,
            },
            conflicts,
        })
    }

    /// Weighted mean of completeness and mean field consistency
    fn quality_score(
        &self,
        completeness: f64,
        fields: &BTreeMap<ProfileField, ResolvedField>,
    ) -> f64 {
        if fields.is_empty() {
            return completeness;
        }

        let mean_consistency =
            fields.values().map(|f| f.consistency_score).sum::<f64>() / fields.len() as f64;
        let wc = self.config.completeness_weight;
        let wk = self.config.consistency_weight;
        round2((wc * completeness + wk * mean_consistency) / (wc + wk))
    }

    /// Mean linear decay of record age against the staleness threshold
    fn freshness_score(&self, records: &[&SourceRecord], as_of: DateTime<Utc>) -> f64 {
        if records.is_empty() {
            return 0.0;
        }

        let threshold_secs = self.config.staleness_days.max(1).saturating_mul(86_400) as f64;
        let total: f64 = records
            .iter()
            .map(|r| {
                let age_secs = (as_of - r.collected_at).num_seconds().max(0) as f64;
                (1.0 - age_secs / threshold_secs).max(0.0) * 100.0
            })
            .sum();
        round2(total / records.len() as f64)
    }
}

/// Completed / attempted × 100; 0 when nothing was attempted
pub fn completeness_score(succeeded: u32, attempted: u32) -> f64 {
    if attempted == 0 {
        return 0.0;
    }
    round2(succeeded as f64 / attempted as f64 * 100.0)
}

/// (public repositories, web mentions) from the usable records
fn activity_counts(records: &[&SourceRecord]) -> (u32, u32) {
    records
        .iter()
        .fold((0, 0), |(repos, mentions), record| match &record.payload {
            SourcePayload::CodeHost(profile) => (profile.public_repos, mentions),
            SourcePayload::WebSearch(results) => (repos, results.mentions.len() as u32),
        })
}

/// Latest record per source type among the completed tasks in `tasks`
fn usable_records<'a>(tasks: &[CollectionTask], records: &'a [SourceRecord]) -> Vec<&'a SourceRecord> {
    let completed: HashSet<Uuid> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .map(|t| t.task_id)
        .collect();

    let mut latest: BTreeMap<SourceType, &SourceRecord> = BTreeMap::new();
    for record in records.iter().filter(|r| completed.contains(&r.task_id)) {
        match latest.get(&record.source_type) {
            Some(existing) if existing.collected_at >= record.collected_at => {}
            _ => {
                latest.insert(record.source_type, record);
            }
        }
    }
    latest.into_values().collect()
}

/// Resolve one field across candidate sources
///
/// Returns the winning value (if any source supplied one) and every losing
/// value as a conflict.
pub fn resolve_field(
    field: ProfileField,
    candidates: &[(EvidenceSource, &ProfileFields)],
) -> (Option<ResolvedField>, Vec<AggregationConflict>) {
    // normalized value → (source, original text) in arrival order
    let mut groups: Vec<(String, Vec<(EvidenceSource, String)>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (source, fields) in candidates {
        let Some(value) = fields.get(field) else {
            continue;
        };
        let key = normalize_field(field, value);
        if key.is_empty() {
            continue;
        }
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push((*source, value.trim().to_string()));
    }

    let providers: usize = groups.iter().map(|(_, members)| members.len()).sum();
    if providers == 0 {
        return (None, Vec::new());
    }

    let best_priority = |members: &[(EvidenceSource, String)]| {
        members.iter().map(|(s, _)| s.priority()).max().unwrap_or(0)
    };

    let Some(winner_idx) = (0..groups.len()).max_by(|&a, &b| {
        let (ga, gb) = (&groups[a].1, &groups[b].1);
        ga.len()
            .cmp(&gb.len())
            .then_with(|| best_priority(ga).cmp(&best_priority(gb)))
    }) else {
        return (None, Vec::new());
    };

    let (winner_key, winner_members) = &groups[winner_idx];
    let mut agreeing: Vec<EvidenceSource> = winner_members.iter().map(|(s, _)| *s).collect();
    agreeing.sort_by(|a, b| b.priority().cmp(&a.priority()));
    agreeing.dedup();

    let (source, value) = winner_members
        .iter()
        .max_by_key(|(s, _)| s.priority())
        .cloned()
        .unwrap_or((EvidenceSource::SelfReported, String::new()));

    let consistency = round2(winner_members.len() as f64 / providers as f64 * 100.0);

    let conflicts = groups
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != winner_idx)
        .map(|(_, (key, members))| {
            let (_, discarded) = members
                .iter()
                .max_by_key(|(s, _)| s.priority())
                .cloned()
                .unwrap_or((EvidenceSource::SelfReported, String::new()));
            AggregationConflict {
                field,
                kept: value.clone(),
                discarded,
                discarded_sources: members.iter().map(|(s, _)| *s).collect(),
                similarity: strsim::normalized_levenshtein(winner_key, key),
            }
        })
        .collect();

    (
        Some(ResolvedField {
            value,
            source,
            agreeing_sources: agreeing,
            consistency_score: consistency,
        }),
        conflicts,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_location(location: &str) -> ProfileFields {
        ProfileFields {
            location: Some(location.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_two_of_three_locations_agree() {
        let self_reported = with_location("Austin, TX");
        let code_host = with_location("Austin, Texas");
        let web = with_location("Dallas, TX");
        let candidates = vec![
            (EvidenceSource::SelfReported, &self_reported),
            (EvidenceSource::CodeHost, &code_host),
            (EvidenceSource::WebSearch, &web),
        ];

        let (resolved, conflicts) = resolve_field(ProfileField::Location, &candidates);
        let resolved = resolved.unwrap();

        assert_eq!(resolved.value, "Austin, Texas");
        assert_eq!(resolved.source, EvidenceSource::CodeHost);
        assert_eq!(resolved.consistency_score, 66.67);
        assert_eq!(
            resolved.agreeing_sources,
            vec![EvidenceSource::CodeHost, EvidenceSource::SelfReported]
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].discarded, "Dallas, TX");
    }

    #[test]
    fn test_single_source_is_fully_consistent() {
        let only = with_location("Berlin");
        let empty = ProfileFields::default();
        let candidates = vec![
            (EvidenceSource::SelfReported, &empty),
            (EvidenceSource::WebSearch, &only),
        ];

        let (resolved, conflicts) = resolve_field(ProfileField::Location, &candidates);
        assert_eq!(resolved.unwrap().consistency_score, 100.0);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_tie_broken_by_source_priority() {
        let a = with_location("Paris");
        let b = with_location("Lyon");
        let candidates = vec![
            (EvidenceSource::WebSearch, &a),
            (EvidenceSource::SelfReported, &b),
        ];

        let (resolved, _) = resolve_field(ProfileField::Location, &candidates);
        let resolved = resolved.unwrap();
        assert_eq!(resolved.value, "Lyon");
        assert_eq!(resolved.consistency_score, 50.0);
    }

    #[test]
    fn test_no_values_no_field() {
        let empty = ProfileFields::default();
        let candidates = vec![(EvidenceSource::SelfReported, &empty)];
        let (resolved, conflicts) = resolve_field(ProfileField::Email, &candidates);
        assert!(resolved.is_none());
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_completeness() {
        assert_eq!(completeness_score(1, 1), 100.0);
        assert_eq!(completeness_score(1, 3), 33.33);
        assert_eq!(completeness_score(0, 0), 0.0);
    }
}
