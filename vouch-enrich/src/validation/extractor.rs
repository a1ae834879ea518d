//! Skill evidence extraction
//!
//! Turns self-reported claims and source records into per-skill observations.
//! Pure: no store access, no clock.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::normalization::{contains_term, lookup_key, normalize_skill, prose_vocabulary, NormalizedSkill};
use crate::types::{
    CandidateSubmission, CodeHostProfile, EvidenceSource, ProfileSkill, SkillCategory,
    SourcePayload, SourceRecord, WebSearchResults,
};

/// Strength of a repository topic naming the skill
const TOPIC_STRENGTH: f64 = 0.75;
/// Strength of a repository description or bio naming the skill
const DESCRIPTION_STRENGTH: f64 = 0.80;
/// Cap on language strength regardless of repository count
const LANGUAGE_STRENGTH_CAP: f64 = 0.95;

/// One piece of evidence for a normalized skill, before it has a skill id
#[derive(Debug, Clone, PartialEq)]
pub struct SkillObservation {
    pub skill: NormalizedSkill,
    pub source: EvidenceSource,
    pub source_identifier: String,
    pub evidence_text: String,
    /// 0–1
    pub strength: f64,
    pub recency: Option<NaiveDate>,
}

/// Language strength: 0.70 plus 0.02 per repository, capped
pub fn language_strength(repositories: usize) -> f64 {
    (0.70 + 0.02 * repositories as f64).min(LANGUAGE_STRENGTH_CAP)
}

/// Observations from every claim and record of a submission
///
/// Duplicate (skill, source, source identifier) observations collapse into
/// the strongest one, carrying the latest recency among them.
pub fn extract_observations<'a>(
    submission: &CandidateSubmission,
    records: impl IntoIterator<Item = &'a SourceRecord>,
    self_reported_strength: f64,
) -> Vec<SkillObservation> {
    let claimed = claimed_skills(submission);

    let mut observations = self_reported(submission, self_reported_strength);
    for record in records {
        match &record.payload {
            SourcePayload::CodeHost(profile) => {
                observations.extend(from_code_host(profile, &claimed));
            }
            SourcePayload::WebSearch(results) => {
                observations.extend(from_web_search(
                    results,
                    &claimed,
                    record.collected_at.date_naive(),
                ));
            }
        }
    }

    dedupe(observations)
}

/// Every skill seen in the claims or `records`, with the sources naming it,
/// sorted by name
pub fn skill_summary<'a>(
    submission: &CandidateSubmission,
    records: impl IntoIterator<Item = &'a SourceRecord>,
) -> Vec<ProfileSkill> {
    let mut skills: BTreeMap<String, ProfileSkill> = BTreeMap::new();
    // Strength plays no part in the summary
    for obs in extract_observations(submission, records, 0.0) {
        skills
            .entry(obs.skill.name.clone())
            .or_insert_with(|| ProfileSkill {
                name: obs.skill.name.clone(),
                category: obs.skill.category,
                sources: BTreeSet::new(),
            })
            .sources
            .insert(obs.source);
    }
    skills.into_values().collect()
}

fn claimed_skills(submission: &CandidateSubmission) -> Vec<NormalizedSkill> {
    submission
        .claimed_skills
        .iter()
        .filter_map(|c| normalize_skill(&c.name, c.category.as_deref()))
        .collect()
}

fn self_reported(submission: &CandidateSubmission, strength: f64) -> Vec<SkillObservation> {
    submission
        .claimed_skills
        .iter()
        .filter_map(|claim| {
            let skill = normalize_skill(&claim.name, claim.category.as_deref())?;
            Some(SkillObservation {
                skill,
                source: EvidenceSource::SelfReported,
                source_identifier: "claim".to_string(),
                evidence_text: format!("Self-reported: {}", claim.name.trim()),
                strength,
                recency: claim.last_used,
            })
        })
        .collect()
}

fn from_code_host(profile: &CodeHostProfile, claimed: &[NormalizedSkill]) -> Vec<SkillObservation> {
    let mut observations = Vec::new();
    let own_repos: Vec<_> = profile.repositories.iter().filter(|r| !r.fork).collect();

    // Primary languages
    let mut languages: BTreeMap<String, (NormalizedSkill, usize, Option<NaiveDate>)> = BTreeMap::new();
    for repo in &own_repos {
        let Some(language) = repo.language.as_deref() else {
            continue;
        };
        let Some(mut skill) = normalize_skill(language, None) else {
            continue;
        };
        if !skill.known {
            skill.category = SkillCategory::ProgrammingLanguage;
        }
        let pushed = repo.pushed_at.map(|d| d.date_naive());
        let entry = languages
            .entry(skill.name.clone())
            .or_insert((skill, 0, None));
        entry.1 += 1;
        entry.2 = entry.2.max(pushed);
    }
    for (name, (skill, count, recency)) in languages {
        observations.push(SkillObservation {
            skill,
            source: EvidenceSource::CodeHost,
            source_identifier: format!("{}/languages/{}", profile.username, name),
            evidence_text: format!("Primary language of {} repositories", count),
            strength: language_strength(count),
            recency,
        });
    }

    // Topics that name a known or claimed skill
    let mut topics: BTreeMap<String, (NormalizedSkill, Vec<String>, Option<NaiveDate>)> = BTreeMap::new();
    for repo in &own_repos {
        for topic in &repo.topics {
            let Some(skill) = normalize_skill(topic, None) else {
                continue;
            };
            if !skill.known && !claimed.iter().any(|c| c.name == skill.name) {
                continue;
            }
            let pushed = repo.pushed_at.map(|d| d.date_naive());
            let entry = topics
                .entry(skill.name.clone())
                .or_insert((skill, Vec::new(), None));
            entry.1.push(repo.name.clone());
            entry.2 = entry.2.max(pushed);
        }
    }
    for (name, (skill, repos, recency)) in topics {
        observations.push(SkillObservation {
            skill,
            source: EvidenceSource::CodeHost,
            source_identifier: format!("{}/topics/{}", profile.username, name),
            evidence_text: format!("Repository topic in: {}", repos.join(", ")),
            strength: TOPIC_STRENGTH,
            recency,
        });
    }

    // Descriptions and bio
    let vocabulary = prose_vocabulary(claimed);
    let mut described: BTreeMap<String, (NormalizedSkill, Vec<String>, Option<NaiveDate>)> = BTreeMap::new();
    let texts = own_repos
        .iter()
        .filter_map(|r| {
            r.description
                .as_deref()
                .map(|d| (r.name.clone(), d, r.pushed_at.map(|p| p.date_naive())))
        })
        .chain(profile.bio.as_deref().map(|b| ("bio".to_string(), b, None)));
    for (origin, text, recency) in texts {
        let haystack = lookup_key(text);
        for (term, skill) in &vocabulary {
            if contains_term(&haystack, term) {
                let entry = described
                    .entry(skill.name.clone())
                    .or_insert((skill.clone(), Vec::new(), None));
                if !entry.1.contains(&origin) {
                    entry.1.push(origin.clone());
                }
                entry.2 = entry.2.max(recency);
            }
        }
    }
    for (name, (skill, origins, recency)) in described {
        observations.push(SkillObservation {
            skill,
            source: EvidenceSource::CodeHost,
            source_identifier: format!("{}/descriptions/{}", profile.username, name),
            evidence_text: format!("Mentioned in: {}", origins.join(", ")),
            strength: DESCRIPTION_STRENGTH,
            recency,
        });
    }

    observations
}

fn from_web_search(
    results: &WebSearchResults,
    claimed: &[NormalizedSkill],
    collected_on: NaiveDate,
) -> Vec<SkillObservation> {
    let vocabulary = prose_vocabulary(claimed);
    let mut observations = Vec::new();

    for mention in &results.mentions {
        let haystack = lookup_key(&format!("{} {}", mention.title, mention.snippet));
        let strength =
            ((mention.relevance_score + mention.credibility_score) / 200.0).clamp(0.0, 1.0);

        for (term, skill) in &vocabulary {
            if contains_term(&haystack, term) {
                observations.push(SkillObservation {
                    skill: skill.clone(),
                    source: EvidenceSource::WebSearch,
                    source_identifier: mention.url.clone(),
                    evidence_text: format!("{} ({})", mention.title, mention.source_name),
                    strength,
                    recency: Some(mention.published_date.unwrap_or(collected_on)),
                });
            }
        }
    }

    observations
}

fn dedupe(observations: Vec<SkillObservation>) -> Vec<SkillObservation> {
    let mut order: Vec<(String, EvidenceSource, String)> = Vec::new();
    let mut best: HashMap<(String, EvidenceSource, String), SkillObservation> = HashMap::new();

    for obs in observations {
        let key = (obs.skill.name.clone(), obs.source, obs.source_identifier.clone());
        match best.get_mut(&key) {
            Some(existing) => {
                let recency = existing.recency.max(obs.recency);
                if obs.strength > existing.strength {
                    *existing = obs;
                }
                existing.recency = recency;
            }
            None => {
                order.push(key.clone());
                best.insert(key, obs);
            }
        }
    }

    order.into_iter().filter_map(|k| best.remove(&k)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ExternalIdentifiers, ProfileFields, RepositorySummary, SkillClaim, WebMention,
    };
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn repo(name: &str, language: Option<&str>, topics: &[&str], description: Option<&str>) -> RepositorySummary {
        RepositorySummary {
            name: name.into(),
            language: language.map(Into::into),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            description: description.map(Into::into),
            stars: 0,
            fork: false,
            pushed_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
        }
    }

    fn profile(repositories: Vec<RepositorySummary>) -> CodeHostProfile {
        CodeHostProfile {
            username: "ada".into(),
            profile_url: "https://github.com/ada".into(),
            fields: ProfileFields::default(),
            bio: Some("Kubernetes tinkerer".into()),
            public_repos: repositories.len() as u32,
            followers: 0,
            account_created_at: None,
            repositories,
        }
    }

    #[test]
    fn test_language_strength_formula() {
        assert!((language_strength(1) - 0.72).abs() < 1e-9);
        assert!((language_strength(5) - 0.80).abs() < 1e-9);
        assert_eq!(language_strength(50), 0.95);
    }

    #[test]
    fn test_code_host_languages_topics_descriptions() {
        let p = profile(vec![
            repo("a", Some("Rust"), &["tokio", "hacktoberfest"], Some("A PostgreSQL driver")),
            repo("b", Some("Rust"), &["docker"], None),
            repo("c", Some("Go"), &[], None),
        ]);

        let obs = from_code_host(&p, &[]);
        let rust = obs
            .iter()
            .find(|o| o.skill.name == "rust" && o.source_identifier.contains("languages"))
            .unwrap();
        assert!((rust.strength - 0.74).abs() < 1e-9);
        assert_eq!(rust.recency, NaiveDate::from_ymd_opt(2024, 3, 1));

        assert!(obs.iter().any(|o| o.skill.name == "go"));
        assert!(obs.iter().any(|o| o.skill.name == "docker" && o.strength == TOPIC_STRENGTH));
        assert!(!obs.iter().any(|o| o.skill.name.contains("hacktoberfest")));
        assert!(!obs.iter().any(|o| o.skill.name == "tokio"));
        assert!(obs
            .iter()
            .any(|o| o.skill.name == "postgresql" && o.strength == DESCRIPTION_STRENGTH));
        assert!(obs.iter().any(|o| o.skill.name == "kubernetes"));
    }

    #[test]
    fn test_forks_ignored() {
        let mut forked = repo("f", Some("Haskell"), &[], None);
        forked.fork = true;
        let obs = from_code_host(&profile(vec![forked]), &[]);
        assert!(!obs.iter().any(|o| o.skill.name == "haskell"));
    }

    #[test]
    fn test_claimed_topic_accepted() {
        let claimed = vec![normalize_skill("tokio", None).unwrap()];
        let obs = from_code_host(&profile(vec![repo("a", None, &["tokio"], None)]), &claimed);
        assert!(obs.iter().any(|o| o.skill.name == "tokio"));
    }

    #[test]
    fn test_web_mentions_and_self_reported() {
        let submission = CandidateSubmission::new(
            ExternalIdentifiers::default(),
            ProfileFields::default(),
            vec![SkillClaim::new("Golang").current(), SkillClaim::new("Kubernetes")],
        );
        let results = WebSearchResults {
            query_name: "Ada".into(),
            queries: vec![],
            mentions: vec![WebMention {
                title: "Ada talks Golang at GopherCon".into(),
                url: "https://conf.dev/ada".into(),
                snippet: "A deep dive into go schedulers".into(),
                source_name: "Conf".into(),
                relevance_score: 80.0,
                credibility_score: 50.0,
                published_date: NaiveDate::from_ymd_opt(2023, 10, 1),
            }],
            fields: ProfileFields::default(),
        };
        let record = SourceRecord {
            record_id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            submission_id: submission.submission_id,
            source_type: crate::types::SourceType::WebSearch,
            payload: SourcePayload::WebSearch(results),
            collected_at: Utc::now(),
        };

        let obs = extract_observations(&submission, &[record], 0.5);

        let self_reported: Vec<_> = obs
            .iter()
            .filter(|o| o.source == EvidenceSource::SelfReported)
            .collect();
        assert_eq!(self_reported.len(), 2);
        assert!(self_reported.iter().all(|o| o.strength == 0.5));

        let web: Vec<_> = obs
            .iter()
            .filter(|o| o.source == EvidenceSource::WebSearch)
            .collect();
        assert_eq!(web.len(), 1);
        assert_eq!(web[0].skill.name, "go");
        assert!((web[0].strength - 0.65).abs() < 1e-9);
        assert_eq!(web[0].recency, NaiveDate::from_ymd_opt(2023, 10, 1));
    }

    #[test]
    fn test_duplicate_claims_collapse() {
        let submission = CandidateSubmission::new(
            ExternalIdentifiers::default(),
            ProfileFields::default(),
            vec![SkillClaim::new("k8s"), SkillClaim::new("Kubernetes")],
        );
        let obs = extract_observations(&submission, std::iter::empty(), 0.5);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].skill.name, "kubernetes");
    }

    #[test]
    fn test_repeated_records_keep_latest_recency() {
        let submission = CandidateSubmission::new(
            ExternalIdentifiers::default(),
            ProfileFields::default(),
            vec![],
        );
        let record = |pushed| {
            let mut r = repo("a", Some("Rust"), &[], None);
            r.pushed_at = Some(pushed);
            SourceRecord {
                record_id: Uuid::new_v4(),
                task_id: Uuid::new_v4(),
                submission_id: submission.submission_id,
                source_type: crate::types::SourceType::CodeHost,
                payload: SourcePayload::CodeHost(profile(vec![r])),
                collected_at: Utc::now(),
            }
        };
        let old = record(Utc.with_ymd_and_hms(2019, 6, 1, 0, 0, 0).unwrap());
        let new = record(Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap());

        let obs = extract_observations(&submission, [&old, &new], 0.5);
        let rust: Vec<_> = obs.iter().filter(|o| o.skill.name == "rust").collect();
        assert_eq!(rust.len(), 1);
        assert_eq!(rust[0].recency, NaiveDate::from_ymd_opt(2024, 9, 1));
    }

    #[test]
    fn test_skill_summary_merges_sources() {
        let submission = CandidateSubmission::new(
            ExternalIdentifiers::default(),
            ProfileFields::default(),
            vec![SkillClaim::new("Rust"), SkillClaim::new("COBOL")],
        );
        let record = SourceRecord {
            record_id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            submission_id: submission.submission_id,
            source_type: crate::types::SourceType::CodeHost,
            payload: SourcePayload::CodeHost(profile(vec![
                repo("a", Some("Rust"), &[], None),
                repo("b", Some("Go"), &[], None),
            ])),
            collected_at: Utc::now(),
        };

        let summary = skill_summary(&submission, [&record]);
        let names: Vec<_> = summary.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["cobol", "go", "kubernetes", "rust"]);

        let rust = summary.iter().find(|s| s.name == "rust").unwrap();
        assert_eq!(
            rust.sources,
            BTreeSet::from([EvidenceSource::SelfReported, EvidenceSource::CodeHost])
        );
        assert_eq!(rust.category, SkillCategory::ProgrammingLanguage);
    }
}
