//! Core data model for candidate enrichment
//!
//! A `CandidateSubmission` fans out into one `CollectionTask` per registered
//! source type. Completed tasks own exactly one immutable `SourceRecord`.
//! Records and self-reported claims feed the `AggregatedProfile` and the
//! per-skill `SkillValidation` rows.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use crate::error::{EnrichError, EnrichResult};

// ============================================================================
// Sources and task lifecycle
// ============================================================================

/// External source type a collector fetches from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Code-hosting platform profile and repositories
    CodeHost,
    /// Web-search mentions of the candidate
    WebSearch,
}

impl SourceType {
    pub const ALL: [SourceType; 2] = [SourceType::CodeHost, SourceType::WebSearch];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::CodeHost => "code_host",
            SourceType::WebSearch => "web_search",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "code_host" => Some(SourceType::CodeHost),
            "web_search" => Some(SourceType::WebSearch),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collection task state
///
/// `pending → collecting → {completed | failed | skipped}`, with
/// `collecting → collecting` on retry. Never returns to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Collecting,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Collecting => "collecting",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TaskStatus::Pending),
            "collecting" => Some(TaskStatus::Collecting),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "skipped" => Some(TaskStatus::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    /// Whether the state machine permits `self → next`
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Pending, Collecting) | (Pending, Skipped) => true,
            (Collecting, Collecting)
            | (Collecting, Completed)
            | (Collecting, Failed)
            | (Collecting, Skipped) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one task state change, emitted after every transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTransition {
    pub task_id: Uuid,
    pub submission_id: Uuid,
    pub source_type: SourceType,
    pub old_status: TaskStatus,
    pub new_status: TaskStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// One (submission, source type) unit of collection work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionTask {
    pub task_id: Uuid,
    pub submission_id: Uuid,
    pub source_type: SourceType,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub error_message: Option<String>,
    /// Set while the task waits out an exhausted upstream quota
    pub rate_limit_reset_at: Option<DateTime<Utc>>,
}

impl CollectionTask {
    /// Create a new pending task
    pub fn new(submission_id: Uuid, source_type: SourceType) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            submission_id,
            source_type,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            error_message: None,
            rate_limit_reset_at: None,
        }
    }

    /// Create a task that is skipped without ever being dispatched
    pub fn skipped(submission_id: Uuid, source_type: SourceType, reason: &str) -> Self {
        let mut task = Self::new(submission_id, source_type);
        task.status = TaskStatus::Skipped;
        task.completed_at = Some(task.created_at);
        task.error_message = Some(reason.to_string());
        task
    }

    /// Transition to new state
    ///
    /// Entering `collecting` stamps `started_at` once; entering a terminal
    /// state stamps `completed_at`. Illegal transitions leave the task
    /// untouched.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> EnrichResult<TaskTransition> {
        if !self.status.can_transition_to(new_status) {
            return Err(EnrichError::InvalidTransition {
                task_id: self.task_id,
                from: self.status,
                to: new_status,
            });
        }

        let now = Utc::now();
        let transition = TaskTransition {
            task_id: self.task_id,
            submission_id: self.submission_id,
            source_type: self.source_type,
            old_status: self.status,
            new_status,
            transitioned_at: now,
        };
        self.status = new_status;

        if new_status == TaskStatus::Collecting && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if new_status.is_terminal() {
            self.completed_at = Some(now);
        }

        Ok(transition)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True once the task was dispatched to a collector at least once
    pub fn was_attempted(&self) -> bool {
        self.started_at.is_some()
    }
}

// ============================================================================
// Submission
// ============================================================================

/// Mergeable profile fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Name,
    Email,
    Location,
    Company,
    Website,
}

impl ProfileField {
    pub const ALL: [ProfileField; 5] = [
        ProfileField::Name,
        ProfileField::Email,
        ProfileField::Location,
        ProfileField::Company,
        ProfileField::Website,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileField::Name => "name",
            ProfileField::Email => "email",
            ProfileField::Location => "location",
            ProfileField::Company => "company",
            ProfileField::Website => "website",
        }
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile field values as reported by one source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl ProfileFields {
    /// Value of one field, ignoring blank strings
    pub fn get(&self, field: ProfileField) -> Option<&str> {
        let value = match field {
            ProfileField::Name => self.name.as_deref(),
            ProfileField::Email => self.email.as_deref(),
            ProfileField::Location => self.location.as_deref(),
            ProfileField::Company => self.company.as_deref(),
            ProfileField::Website => self.website.as_deref(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        ProfileField::ALL.iter().all(|f| self.get(*f).is_none())
    }
}

/// Skill as claimed by the candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillClaim {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Candidate claims to use this skill today
    #[serde(default)]
    pub current: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<NaiveDate>,
}

impl SkillClaim {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: None,
            current: false,
            last_used: None,
        }
    }

    pub fn current(mut self) -> Self {
        self.current = true;
        self
    }

    pub fn last_used(mut self, date: NaiveDate) -> Self {
        self.last_used = Some(date);
        self
    }
}

/// Identifiers used to look the candidate up in external sources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalIdentifiers {
    /// Code-host username or profile URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_host: Option<String>,
    /// Display name to search the web for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_name: Option<String>,
}

/// Candidate as handed over by the upstream document extraction step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSubmission {
    pub submission_id: Uuid,
    #[serde(default)]
    pub identifiers: ExternalIdentifiers,
    #[serde(default)]
    pub claimed_profile: ProfileFields,
    #[serde(default)]
    pub claimed_skills: Vec<SkillClaim>,
    pub created_at: DateTime<Utc>,
}

impl CandidateSubmission {
    pub fn new(
        identifiers: ExternalIdentifiers,
        claimed_profile: ProfileFields,
        claimed_skills: Vec<SkillClaim>,
    ) -> Self {
        Self {
            submission_id: Uuid::new_v4(),
            identifiers,
            claimed_profile,
            claimed_skills,
            created_at: Utc::now(),
        }
    }

    /// Identifier to hand to the collector for `source`
    ///
    /// Web search falls back to the self-reported name when no explicit
    /// search name was extracted, so a search is attempted whenever any name
    /// is known. Only a submission with neither a search name nor a claimed
    /// name skips web search.
    pub fn identifier_for(&self, source: SourceType) -> Option<&str> {
        let value = match source {
            SourceType::CodeHost => self.identifiers.code_host.as_deref(),
            SourceType::WebSearch => self
                .identifiers
                .search_name
                .as_deref()
                .or(self.claimed_profile.name.as_deref()),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }
}

// ============================================================================
// Raw source records
// ============================================================================

/// Repository summary from the code host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub name: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stars: u32,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
}

/// Code-host profile and repositories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeHostProfile {
    pub username: String,
    pub profile_url: String,
    #[serde(default)]
    pub fields: ProfileFields,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub public_repos: u32,
    #[serde(default)]
    pub followers: u32,
    #[serde(default)]
    pub account_created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub repositories: Vec<RepositorySummary>,
}

/// One scored web mention of the candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebMention {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Publication name derived from the URL's domain
    pub source_name: String,
    /// 0–100
    pub relevance_score: f64,
    /// 0–100
    pub credibility_score: f64,
    #[serde(default)]
    pub published_date: Option<NaiveDate>,
}

/// Deduplicated web-search results for the candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchResults {
    pub query_name: String,
    pub queries: Vec<String>,
    pub mentions: Vec<WebMention>,
    /// Profile fields inferred from mention text
    #[serde(default)]
    pub fields: ProfileFields,
}

/// Typed payload of one source record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "data", rename_all = "snake_case")]
pub enum SourcePayload {
    CodeHost(CodeHostProfile),
    WebSearch(WebSearchResults),
}

impl SourcePayload {
    pub fn source_type(&self) -> SourceType {
        match self {
            SourcePayload::CodeHost(_) => SourceType::CodeHost,
            SourcePayload::WebSearch(_) => SourceType::WebSearch,
        }
    }

    /// Profile fields this payload contributes to aggregation
    pub fn profile_fields(&self) -> &ProfileFields {
        match self {
            SourcePayload::CodeHost(profile) => &profile.fields,
            SourcePayload::WebSearch(results) => &results.fields,
        }
    }
}

/// Immutable raw output of one completed collection task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub record_id: Uuid,
    pub task_id: Uuid,
    pub submission_id: Uuid,
    pub source_type: SourceType,
    pub payload: SourcePayload,
    pub collected_at: DateTime<Utc>,
}

impl SourceRecord {
    pub fn new(task: &CollectionTask, payload: SourcePayload) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            task_id: task.task_id,
            submission_id: task.submission_id,
            source_type: payload.source_type(),
            payload,
            collected_at: Utc::now(),
        }
    }
}

// ============================================================================
// Aggregation output
// ============================================================================

/// Origin of a profile value or skill evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    SelfReported,
    CodeHost,
    WebSearch,
}

impl EvidenceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceSource::SelfReported => "self_reported",
            EvidenceSource::CodeHost => "code_host",
            EvidenceSource::WebSearch => "web_search",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "self_reported" => Some(EvidenceSource::SelfReported),
            "code_host" => Some(EvidenceSource::CodeHost),
            "web_search" => Some(EvidenceSource::WebSearch),
            _ => None,
        }
    }

    /// Tie-break priority for field resolution (higher wins)
    ///
    /// code host > self-reported > web search
    pub fn priority(&self) -> u8 {
        match self {
            EvidenceSource::CodeHost => 3,
            EvidenceSource::SelfReported => 2,
            EvidenceSource::WebSearch => 1,
        }
    }
}

impl From<SourceType> for EvidenceSource {
    fn from(source: SourceType) -> Self {
        match source {
            SourceType::CodeHost => EvidenceSource::CodeHost,
            SourceType::WebSearch => EvidenceSource::WebSearch,
        }
    }
}

impl fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verified value of one profile field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedField {
    /// Original (non-normalized) text from the chosen source
    pub value: String,
    pub source: EvidenceSource,
    /// Every source whose value agreed with the winner
    pub agreeing_sources: Vec<EvidenceSource>,
    /// 0–100
    pub consistency_score: f64,
}

/// Merged candidate profile, one per submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedProfile {
    pub submission_id: Uuid,
    pub fields: BTreeMap<ProfileField, ResolvedField>,
    pub sources_attempted: u32,
    pub sources_succeeded: u32,
    pub completeness_score: f64,
    pub quality_score: f64,
    pub freshness_score: f64,
    /// Every skill seen in the claims or the usable records
    pub all_skills: Vec<ProfileSkill>,
    /// Skills seen in more than one source
    pub skills_cross_validated: u32,
    /// Public repositories on the code host (0 without a code-host record)
    pub github_contributions: u32,
    pub web_mentions_count: u32,
    pub aggregated_at: DateTime<Utc>,
}

impl AggregatedProfile {
    pub fn field(&self, field: ProfileField) -> Option<&ResolvedField> {
        self.fields.get(&field)
    }
}

/// Skill summary entry on an aggregated profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSkill {
    pub name: String,
    pub category: SkillCategory,
    pub sources: BTreeSet<EvidenceSource>,
}

// ============================================================================
// Skills
// ============================================================================

/// Skill category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillCategory {
    ProgrammingLanguage,
    Frontend,
    Backend,
    Database,
    Cloud,
    Devops,
    MachineLearning,
    Testing,
    Other,
}

impl SkillCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillCategory::ProgrammingLanguage => "programming_language",
            SkillCategory::Frontend => "frontend",
            SkillCategory::Backend => "backend",
            SkillCategory::Database => "database",
            SkillCategory::Cloud => "cloud",
            SkillCategory::Devops => "devops",
            SkillCategory::MachineLearning => "machine_learning",
            SkillCategory::Testing => "testing",
            SkillCategory::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "programming_language" => SkillCategory::ProgrammingLanguage,
            "frontend" => SkillCategory::Frontend,
            "backend" => SkillCategory::Backend,
            "database" => SkillCategory::Database,
            "cloud" => SkillCategory::Cloud,
            "devops" => SkillCategory::Devops,
            "machine_learning" => SkillCategory::MachineLearning,
            "testing" => SkillCategory::Testing,
            _ => SkillCategory::Other,
        }
    }
}

/// Normalized skill attached to a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSkill {
    pub skill_id: Uuid,
    pub submission_id: Uuid,
    /// Canonical (normalized) name, unique per submission
    pub name: String,
    pub category: SkillCategory,
    /// 0–100
    pub confidence_score: f64,
    pub confidence_level: ConfidenceLevel,
    pub evidence_count: u32,
}

/// Named band of a 0–100 confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    VeryLow,
    Low,
    Medium,
    High,
    Expert,
}

impl ConfidenceLevel {
    /// expert ≥ 90, high ≥ 75, medium ≥ 60, low ≥ 40, else very low
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            ConfidenceLevel::Expert
        } else if score >= 75.0 {
            ConfidenceLevel::High
        } else if score >= 60.0 {
            ConfidenceLevel::Medium
        } else if score >= 40.0 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::VeryLow
        }
    }
}

/// One observation supporting a skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillEvidence {
    pub evidence_id: Uuid,
    pub skill_id: Uuid,
    pub source: EvidenceSource,
    /// Stable identifier within the source (repo name, URL, "claim")
    pub source_identifier: String,
    pub evidence_text: String,
    /// 0–1
    pub strength: f64,
    pub recency: Option<NaiveDate>,
}

/// Trustworthiness verdict for one skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillValidation {
    pub skill_id: Uuid,
    pub skill_name: String,
    pub sources_found_in: BTreeSet<EvidenceSource>,
    pub source_count: u32,
    /// 0–100
    pub source_agreement_score: f64,
    pub is_hallucination: bool,
    /// 0–100
    pub hallucination_score: f64,
    pub is_outdated: bool,
    pub requires_manual_review: bool,
    /// Sum of the weights of `risk_factors`, capped at 100
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<RiskFactor>,
    pub recommendation: Recommendation,
    pub validated_at: DateTime<Utc>,
}

/// Signal that a skill may be fabricated or inflated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    /// Found in exactly one source
    SingleSource,
    /// Neither claimed nor seen on the code host
    NoPrimarySource,
    /// Seen on the code host but not claimed
    NotClaimed,
    /// Generic name such as "programming" or "teamwork"
    VagueSkill,
    /// Specialist skill with no observed evidence at all
    NoConcreteEvidence,
    /// Latest dated evidence older than the activity window
    StaleActivity,
}

impl RiskFactor {
    pub fn weight(&self) -> u32 {
        match self {
            RiskFactor::SingleSource => 30,
            RiskFactor::NoPrimarySource => 40,
            RiskFactor::NotClaimed => 15,
            RiskFactor::VagueSkill => 25,
            RiskFactor::NoConcreteEvidence => 35,
            RiskFactor::StaleActivity => 15,
        }
    }
}

/// Risk band of a 0–100 risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// high ≥ 60, medium ≥ 40, low ≥ 20
    pub fn from_score(score: u32) -> Self {
        match score {
            60.. => RiskLevel::High,
            40..=59 => RiskLevel::Medium,
            20..=39 => RiskLevel::Low,
            _ => RiskLevel::Minimal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Minimal => "minimal",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "minimal" => Some(RiskLevel::Minimal),
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }

    /// What to do with the skill at this risk level
    pub fn recommendation(&self) -> Recommendation {
        match self {
            RiskLevel::High => Recommendation::Exclude,
            RiskLevel::Medium => Recommendation::Flag,
            RiskLevel::Low => Recommendation::Verify,
            RiskLevel::Minimal => Recommendation::Include,
        }
    }
}

/// Handling advice for a validated skill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    /// Low risk, keep on the profile
    Include,
    /// Keep, marked unverified
    Verify,
    /// Hold for manual verification
    Flag,
    /// Likely fabricated, drop from the profile
    Exclude,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Include => "INCLUDE",
            Recommendation::Verify => "VERIFY",
            Recommendation::Flag => "FLAG",
            Recommendation::Exclude => "EXCLUDE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INCLUDE" => Some(Recommendation::Include),
            "VERIFY" => Some(Recommendation::Verify),
            "FLAG" => Some(Recommendation::Flag),
            "EXCLUDE" => Some(Recommendation::Exclude),
            _ => None,
        }
    }
}

// ============================================================================
// Status
// ============================================================================

/// Collection progress for one submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStatus {
    pub submission_id: Uuid,
    /// Latest task per source type
    pub tasks: Vec<CollectionTask>,
    /// Terminal tasks / total tasks × 100
    pub percent_complete: f64,
    pub is_complete: bool,
}

impl CollectionStatus {
    /// Build from the latest task per source type
    pub fn from_tasks(submission_id: Uuid, tasks: Vec<CollectionTask>) -> Self {
        let total = tasks.len();
        let terminal = tasks.iter().filter(|t| t.is_terminal()).count();
        let percent_complete = if total > 0 {
            round2(terminal as f64 / total as f64 * 100.0)
        } else {
            0.0
        };

        Self {
            submission_id,
            is_complete: total > 0 && terminal == total,
            tasks,
            percent_complete,
        }
    }
}

/// Round a score to two decimals
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
