//! Source collectors
//!
//! A `SourceCollector` performs one external retrieval for a candidate
//! identifier and reports its own quota and retry policy. The orchestrator is
//! the only caller; it decides what each `CollectorError` does to the task.

pub mod code_host;
pub mod web_search;

pub use code_host::CodeHostCollector;
pub use web_search::WebSearchCollector;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use crate::config::EnrichConfig;
use crate::error::{EnrichError, EnrichResult};
use crate::types::{SourcePayload, SourceType};

/// Collector failure taxonomy
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollectorError {
    /// Identifier does not exist at the source (task → skipped)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upstream quota exhausted (task deferred, retried)
    #[error("Rate limited (reset at {reset_at:?})")]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    /// Network error, timeout or 5xx (retried with backoff)
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Credentials rejected (task → failed, no retry)
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// Response could not be understood (retried once, then failed)
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl CollectorError {
    /// Classify a transport-level reqwest error
    pub fn from_request(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            CollectorError::MalformedResponse(err.to_string())
        } else {
            CollectorError::Transient(err.to_string())
        }
    }
}

/// Upstream quota as last observed
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateLimitState {
    /// Requests left in the current window, if the source reports it
    pub remaining: Option<u32>,
    /// When the window resets
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitState {
    /// True when no requests remain and the window has not reset yet
    pub fn is_exhausted(&self, now: DateTime<Utc>) -> bool {
        self.remaining == Some(0) && self.reset_at.map_or(false, |reset| reset > now)
    }
}

/// Retry budget and backoff bounds for one collector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base_ms: u64, backoff_max_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_base: Duration::from_millis(backoff_base_ms),
            backoff_max: Duration::from_millis(backoff_max_ms.max(backoff_base_ms)),
        }
    }
}

/// Uniform contract for fetching evidence from one external source type
///
/// `fetch` is safe to call concurrently for different identifiers; the only
/// shared state it touches is the collector's own rate-limit tracker.
#[async_trait::async_trait]
pub trait SourceCollector: Send + Sync {
    /// Source type this collector serves
    fn source_type(&self) -> SourceType;

    /// One external retrieval for `identifier`
    async fn fetch(&self, identifier: &str) -> Result<SourcePayload, CollectorError>;

    /// Last observed upstream quota
    fn rate_limit_state(&self) -> RateLimitState;

    /// Retry budget the orchestrator applies to this collector's tasks
    fn retry_policy(&self) -> RetryPolicy;
}

/// Mutex-guarded quota tracker owned by one collector
#[derive(Debug, Default)]
pub struct RateLimitTracker {
    state: Mutex<RateLimitState>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RateLimitState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Record quota headers from a response
    pub fn update(&self, remaining: Option<u32>, reset_at: Option<DateTime<Utc>>) {
        if remaining.is_none() && reset_at.is_none() {
            return;
        }
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.remaining = remaining;
        state.reset_at = reset_at;
    }

    /// Record an explicit rate-limit rejection
    pub fn mark_exhausted(&self, reset_at: Option<DateTime<Utc>>) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.remaining = Some(0);
        state.reset_at = reset_at;
    }
}

/// Parse an integer header value
pub(crate) fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// `Retry-After` (delta seconds) as an absolute instant
pub(crate) fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    header_u64(headers, "retry-after").map(|secs| now + chrono::Duration::seconds(secs as i64))
}

/// Epoch-seconds header as an absolute instant
pub(crate) fn epoch_header(headers: &HeaderMap, name: &str) -> Option<DateTime<Utc>> {
    header_u64(headers, name).and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
}

/// Map a non-success HTTP status to the collector taxonomy
///
/// `quota` is the rate-limit state parsed from the same response.
pub(crate) fn classify_status(
    status: StatusCode,
    quota: RateLimitState,
    retry_at: Option<DateTime<Utc>>,
    context: &str,
) -> CollectorError {
    let quota_exhausted = quota.remaining == Some(0);
    match status.as_u16() {
        404 => CollectorError::NotFound(context.to_string()),
        401 => CollectorError::AuthFailure(format!("{}: {}", context, status)),
        403 | 429 if quota_exhausted || retry_at.is_some() => CollectorError::RateLimited {
            reset_at: retry_at.or(quota.reset_at),
        },
        429 => CollectorError::RateLimited { reset_at: None },
        403 => CollectorError::AuthFailure(format!("{}: {}", context, status)),
        code if code >= 500 => CollectorError::Transient(format!("{}: {}", context, status)),
        _ => CollectorError::MalformedResponse(format!("{}: unexpected status {}", context, status)),
    }
}

/// Registered collectors, at most one per source type
#[derive(Clone, Default)]
pub struct CollectorRegistry {
    collectors: BTreeMap<SourceType, Arc<dyn SourceCollector>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the shipped collectors from configuration
    pub fn from_config(config: &EnrichConfig) -> EnrichResult<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(CodeHostCollector::new(&config.code_host)?));
        registry.register(Arc::new(WebSearchCollector::new(&config.web_search)?));
        Ok(registry)
    }

    /// Register a collector, replacing any previous one for the same source type
    pub fn register(&mut self, collector: Arc<dyn SourceCollector>) {
        let source = collector.source_type();
        if self.collectors.insert(source, collector).is_some() {
            tracing::warn!(source = %source, "Replaced previously registered collector");
        }
    }

    pub fn with(mut self, collector: Arc<dyn SourceCollector>) -> Self {
        self.register(collector);
        self
    }

    pub fn get(&self, source: SourceType) -> Option<Arc<dyn SourceCollector>> {
        self.collectors.get(&source).cloned()
    }

    /// Registered source types in stable order
    pub fn source_types(&self) -> Vec<SourceType> {
        self.collectors.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

pub(crate) fn build_http_client(
    user_agent: &str,
    timeout_secs: u64,
) -> EnrichResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| EnrichError::CollectorSetup(format!("HTTP client: {}", e)))
}
