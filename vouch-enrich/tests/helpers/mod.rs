//! Shared test fixtures: scripted collectors, in-memory store, payloads

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vouch_common::events::EventBus;
use vouch_enrich::collectors::{
    CollectorError, CollectorRegistry, RateLimitState, RetryPolicy, SourceCollector,
};
use vouch_enrich::config::{EnrichConfig, OrchestratorConfig};
use vouch_enrich::events::EnrichmentEventBus;
use vouch_enrich::orchestrator::CollectionOrchestrator;
use vouch_enrich::pipeline::EnrichmentPipeline;
use vouch_enrich::store::{init_memory_pool, ProfileStore, SqliteProfileStore};
use vouch_enrich::types::{
    CandidateSubmission, CodeHostProfile, ExternalIdentifiers, ProfileFields, RepositorySummary,
    SkillClaim, SourcePayload, SourceType, WebMention, WebSearchResults,
};

type Outcome = Result<SourcePayload, CollectorError>;

/// Collector that replays a script of outcomes, then repeats a fallback
pub struct ScriptedCollector {
    source: SourceType,
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    delay: Duration,
    policy: RetryPolicy,
    rate: Mutex<RateLimitState>,
    calls: AtomicU32,
}

impl ScriptedCollector {
    pub fn new(source: SourceType, fallback: Outcome) -> Self {
        Self {
            source,
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            policy: RetryPolicy::new(3, 1, 5),
            rate: Mutex::new(RateLimitState::default()),
            calls: AtomicU32::new(0),
        }
    }

    /// Always succeed with the default payload for `source`
    pub fn succeeding(source: SourceType) -> Self {
        let payload = match source {
            SourceType::CodeHost => code_host_payload("ada"),
            SourceType::WebSearch => web_payload("Ada Lovelace"),
        };
        Self::new(source, Ok(payload))
    }

    /// Outcome returned before the fallback (in call order)
    pub fn then(self, outcome: Outcome) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(outcome);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.policy = RetryPolicy::new(max_retries, 1, 5);
        self
    }

    pub fn with_rate_limit(self, state: RateLimitState) -> Self {
        *self.rate.lock().unwrap() = state;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SourceCollector for ScriptedCollector {
    fn source_type(&self) -> SourceType {
        self.source
    }

    async fn fetch(&self, _identifier: &str) -> Result<SourcePayload, CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        // A fetch consumes the reported quota window
        *self.rate.lock().unwrap() = RateLimitState::default();

        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    fn rate_limit_state(&self) -> RateLimitState {
        *self.rate.lock().unwrap()
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }
}

pub async fn memory_store() -> Arc<SqliteProfileStore> {
    let pool = init_memory_pool().await.expect("in-memory pool");
    Arc::new(SqliteProfileStore::new(pool))
}

pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        fetch_timeout_secs: 5,
        ..Default::default()
    }
}

pub fn event_bus() -> EnrichmentEventBus {
    EventBus::new(256)
}

pub fn registry(collectors: Vec<Arc<ScriptedCollector>>) -> CollectorRegistry {
    collectors
        .into_iter()
        .fold(CollectorRegistry::new(), |registry, c| {
            registry.with(c as Arc<dyn SourceCollector>)
        })
}

pub fn orchestrator(
    store: Arc<SqliteProfileStore>,
    collectors: Vec<Arc<ScriptedCollector>>,
    config: &OrchestratorConfig,
) -> CollectionOrchestrator {
    CollectionOrchestrator::new(
        store as Arc<dyn ProfileStore>,
        registry(collectors),
        config,
        event_bus(),
    )
}

pub fn pipeline(
    store: Arc<SqliteProfileStore>,
    collectors: Vec<Arc<ScriptedCollector>>,
) -> EnrichmentPipeline {
    let config = EnrichConfig {
        orchestrator: fast_config(),
        ..Default::default()
    };
    vouch_enrich::build_pipeline(
        &config,
        store as Arc<dyn ProfileStore>,
        registry(collectors),
        event_bus(),
    )
}

pub fn submission(github: Option<&str>, name: Option<&str>) -> CandidateSubmission {
    CandidateSubmission::new(
        ExternalIdentifiers {
            code_host: github.map(Into::into),
            search_name: None,
        },
        ProfileFields {
            name: name.map(Into::into),
            location: Some("Austin, TX".into()),
            ..Default::default()
        },
        vec![SkillClaim::new("Rust").current(), SkillClaim::new("COBOL")],
    )
}

pub fn code_host_payload(username: &str) -> SourcePayload {
    code_host_payload_pushed(username, Utc::now() - chrono::Duration::days(30))
}

/// Code-host payload whose repositories were last pushed at `pushed`
pub fn code_host_payload_pushed(username: &str, pushed: DateTime<Utc>) -> SourcePayload {
    SourcePayload::CodeHost(CodeHostProfile {
        username: username.into(),
        profile_url: format!("https://github.com/{}", username),
        fields: ProfileFields {
            name: Some("Ada Lovelace".into()),
            location: Some("Austin, Texas".into()),
            company: Some("Analytical Engines".into()),
            ..Default::default()
        },
        bio: Some("Systems programmer".into()),
        public_repos: 2,
        followers: 10,
        account_created_at: Some(Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap()),
        repositories: vec![
            RepositorySummary {
                name: "engine".into(),
                language: Some("Rust".into()),
                topics: vec!["docker".into()],
                description: Some("Difference engine in Rust".into()),
                stars: 42,
                fork: false,
                pushed_at: Some(pushed),
            },
            RepositorySummary {
                name: "notes".into(),
                language: Some("Python".into()),
                topics: vec![],
                description: None,
                stars: 1,
                fork: false,
                pushed_at: Some(pushed),
            },
        ],
    })
}

pub fn web_payload(name: &str) -> SourcePayload {
    SourcePayload::WebSearch(WebSearchResults {
        query_name: name.into(),
        queries: vec![format!("\"{}\"", name)],
        mentions: vec![WebMention {
            title: format!("{} on Kubernetes operators", name),
            url: "https://blog.example.com/ada".into(),
            snippet: "A talk about writing operators".into(),
            source_name: "Example Blog".into(),
            relevance_score: 70.0,
            credibility_score: 50.0,
            published_date: None,
        }],
        fields: ProfileFields {
            location: Some("Dallas, TX".into()),
            ..Default::default()
        },
    })
}
