//! Configuration for vouch-enrich
//!
//! Loaded from TOML (see `vouch_common::config` for file discovery). Every
//! section and field has a default, so an absent or partial file is valid.
//! API secrets resolve ENV → TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use vouch_common::config::{load_toml_config, resolve_config_path, resolve_secret};
use vouch_common::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "VOUCH_CONFIG";
/// Environment variable naming the SQLite database
pub const DATABASE_ENV: &str = "VOUCH_DATABASE";
/// Code-host API token
pub const GITHUB_TOKEN_ENV: &str = "VOUCH_GITHUB_TOKEN";
/// Web-search API key
pub const SEARCH_API_KEY_ENV: &str = "VOUCH_SEARCH_API_KEY";

/// Upper bound on any day-count window (100 years)
pub const MAX_STALENESS_DAYS: i64 = 36_500;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub orchestrator: OrchestratorConfig,
    pub code_host: CodeHostConfig,
    pub web_search: WebSearchConfig,
    pub aggregation: AggregationConfig,
    pub validation: ValidationConfig,
    pub logging: LoggingConfig,
}

impl EnrichConfig {
    /// Load config from CLI path → `VOUCH_CONFIG` → platform config dir,
    /// then overlay secrets from the environment
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path, CONFIG_ENV);
        let mut config: EnrichConfig = load_toml_config(path.as_deref())?;
        config.resolve_secrets();
        config.validate()?;
        Ok(config)
    }

    /// Apply ENV → TOML priority to API secrets
    pub fn resolve_secrets(&mut self) {
        self.code_host.token = resolve_secret(
            "GitHub token",
            GITHUB_TOKEN_ENV,
            self.code_host.token.as_deref(),
        );
        self.web_search.api_key = resolve_secret(
            "Search API key",
            SEARCH_API_KEY_ENV,
            self.web_search.api_key.as_deref(),
        );
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        let agg = &self.aggregation;
        if agg.completeness_weight < 0.0 || agg.consistency_weight < 0.0 {
            return Err(Error::Config("aggregation weights must be non-negative".into()));
        }
        if agg.completeness_weight + agg.consistency_weight <= 0.0 {
            return Err(Error::Config("aggregation weights must not both be zero".into()));
        }
        if !(1..=MAX_STALENESS_DAYS).contains(&agg.staleness_days) {
            return Err(Error::Config(format!(
                "aggregation.staleness_days must be within 1..={}",
                MAX_STALENESS_DAYS
            )));
        }

        let val = &self.validation;
        if !(0.0..=1.0).contains(&val.self_reported_strength)
            || !(0.0..=1.0).contains(&val.hallucination_strength_threshold)
        {
            return Err(Error::Config("validation strengths must be within 0..=1".into()));
        }
        if !(1..=MAX_STALENESS_DAYS).contains(&val.stale_activity_days) {
            return Err(Error::Config(format!(
                "validation.stale_activity_days must be within 1..={}",
                MAX_STALENESS_DAYS
            )));
        }
        if val.recent_activity_bonus < 0.0 || val.active_activity_bonus < 0.0 {
            return Err(Error::Config("validation activity bonuses must be non-negative".into()));
        }
        if val.review_band_low > val.review_band_high {
            return Err(Error::Config(format!(
                "validation review band is inverted: [{}, {})",
                val.review_band_low, val.review_band_high
            )));
        }

        if self.orchestrator.queue_capacity == 0 || self.orchestrator.queue_workers == 0 {
            return Err(Error::Config("queue capacity and workers must be at least 1".into()));
        }
        if self.orchestrator.max_concurrent_fetches == Some(0) {
            return Err(Error::Config("orchestrator.max_concurrent_fetches must be at least 1".into()));
        }
        Ok(())
    }
}

/// Collection orchestration and work queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Global ceiling on in-flight fetches; default 2 × registered collectors
    pub max_concurrent_fetches: Option<usize>,
    /// Per-attempt fetch timeout
    pub fetch_timeout_secs: u64,
    /// Bounded work queue capacity
    pub queue_capacity: usize,
    /// Submissions processed concurrently by the queue
    pub queue_workers: usize,
    /// Maximum time to retry a locked database write
    pub db_max_lock_wait_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: None,
            fetch_timeout_secs: 60,
            queue_capacity: 64,
            queue_workers: 4,
            db_max_lock_wait_ms: 5000,
        }
    }
}

impl OrchestratorConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Code-host (GitHub REST API) collector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeHostConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub user_agent: String,
    pub requests_per_second: u32,
    pub request_timeout_secs: u64,
    /// Repositories requested per profile (API page size)
    pub max_repositories: u32,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for CodeHostConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            token: None,
            user_agent: format!("vouch-enrich/{}", env!("CARGO_PKG_VERSION")),
            requests_per_second: 5,
            request_timeout_secs: 15,
            max_repositories: 100,
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

/// Web-search (Tavily-style) collector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// "basic" or "advanced"
    pub search_depth: String,
    pub max_results: u32,
    /// Queries issued per candidate
    pub max_queries: usize,
    pub requests_per_second: u32,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tavily.com".to_string(),
            api_key: None,
            search_depth: "basic".to_string(),
            max_results: 10,
            max_queries: 3,
            requests_per_second: 2,
            request_timeout_secs: 20,
            max_retries: 2,
            backoff_base_ms: 1000,
            backoff_max_ms: 30_000,
        }
    }
}

/// Aggregator scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub completeness_weight: f64,
    pub consistency_weight: f64,
    /// Age at which a source record's freshness reaches 0
    pub staleness_days: i64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            completeness_weight: 1.0,
            consistency_weight: 1.0,
            staleness_days: 365,
        }
    }
}

/// Skill validation thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Strength assigned to self-reported claims
    pub self_reported_strength: f64,
    /// Sole self-reported evidence below this strength is a hallucination
    pub hallucination_strength_threshold: f64,
    /// Current skills without evidence newer than this are outdated
    pub staleness_years: u32,
    /// Agreement scores in `[low, high)` require manual review
    pub review_band_low: f64,
    pub review_band_high: f64,
    /// Latest evidence older than this raises the stale-activity risk factor
    pub stale_activity_days: i64,
    /// Confidence bonus for evidence from the last 90 days
    pub recent_activity_bonus: f64,
    /// Confidence bonus for evidence from the last 180 days
    pub active_activity_bonus: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            self_reported_strength: 0.5,
            hallucination_strength_threshold: 0.6,
            staleness_years: 3,
            review_band_low: 34.0,
            review_band_high: 67.0,
            stale_activity_days: 365,
            recent_activity_bonus: 10.0,
            active_activity_bonus: 5.0,
        }
    }
}

/// Logging defaults (RUST_LOG overrides)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "vouch_enrich=info,vouch_common=info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        EnrichConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: EnrichConfig = toml::from_str(
            r#"
            [validation]
            staleness_years = 5

            [code_host]
            max_retries = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.validation.staleness_years, 5);
        assert_eq!(config.validation.hallucination_strength_threshold, 0.6);
        assert_eq!(config.code_host.max_retries, 7);
        assert_eq!(config.web_search.max_retries, 2);
    }

    #[test]
    fn test_inverted_review_band_rejected() {
        let mut config = EnrichConfig::default();
        config.validation.review_band_low = 80.0;
        config.validation.review_band_high = 20.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_unbounded_staleness_rejected() {
        let mut config = EnrichConfig::default();
        config.aggregation.staleness_days = i64::MAX;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = EnrichConfig::default();
        config.validation.stale_activity_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_weights_rejected() {
        let mut config = EnrichConfig::default();
        config.aggregation.completeness_weight = 0.0;
        config.aggregation.consistency_weight = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_environment_secret_overrides_toml() {
        std::env::set_var(GITHUB_TOKEN_ENV, "env-token");
        std::env::remove_var(SEARCH_API_KEY_ENV);

        let mut config = EnrichConfig::default();
        config.code_host.token = Some("toml-token".into());
        config.web_search.api_key = Some("   ".into());
        config.resolve_secrets();

        assert_eq!(config.code_host.token.as_deref(), Some("env-token"));
        assert_eq!(config.web_search.api_key, None);

        std::env::remove_var(GITHUB_TOKEN_ENV);
    }

    #[test]
    #[serial_test::serial]
    fn test_load_from_file_validates() {
        use std::io::Write;

        std::env::remove_var(GITHUB_TOKEN_ENV);
        std::env::remove_var(SEARCH_API_KEY_ENV);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[code_host]\ntoken = \"file-token\"").unwrap();
        let config = EnrichConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.code_host.token.as_deref(), Some("file-token"));

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "[validation]\nreview_band_low = 90.0\nreview_band_high = 10.0").unwrap();
        assert!(EnrichConfig::load(Some(bad.path())).is_err());
    }
}
