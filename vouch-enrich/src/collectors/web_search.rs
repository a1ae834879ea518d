// Web-search collector: Tavily-style search API
//
// Issues a small set of name-based queries, scores each hit for relevance to
// the candidate and for publisher credibility, and infers profile fields
// (email, location, company) from the snippets.
//
// API Documentation: https://docs.tavily.com/docs/rest-api/api-reference

use chrono::{DateTime, NaiveDate, Utc};
use governor::{Quota, RateLimiter};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;

use super::{
    build_http_client, classify_status, retry_after, CollectorError, RateLimitState,
    RateLimitTracker, RetryPolicy, SourceCollector,
};
use crate::config::WebSearchConfig;
use crate::error::EnrichResult;
use crate::types::{ProfileFields, SourcePayload, SourceType, WebMention, WebSearchResults};

const HIGH_CREDIBILITY_DOMAINS: &[&str] = &[
    "techcrunch", "medium", "github", "stackoverflow", "dev.to", "arxiv", "ieee", "acm",
    "springer", "forbes", "wired", "thenextweb", "venturebeat", "arstechnica", "zdnet",
];

const MEDIUM_CREDIBILITY_DOMAINS: &[&str] = &[
    "reddit", "hackernoon", "towardsdatascience", "analytics", "linkedin", "twitter",
    "facebook", "youtube",
];

/// Words that suggest a professional (rather than incidental) mention
const PROFESSIONAL_KEYWORDS: &[&str] = &[
    "engineer", "developer", "software", "programmer", "architect", "founder", "cto",
    "speaker", "author", "maintainer", "contributor", "open source",
];

/// Query suffixes issued after the bare quoted name
const QUERY_SUFFIXES: &[&str] = &["software engineer", "developer"];

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern is valid")
});

static LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:[Bb]ased|[Ll]ocated|[Ll]ives) in ([A-Z][A-Za-z.'-]*(?: [A-Z][A-Za-z.'-]*)*(?:, ?[A-Z][A-Za-z.'-]*(?: [A-Z][A-Za-z.'-]*)*)?)",
    )
    .expect("location pattern is valid")
});

static COMPANY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:works|working|engineer|developer) at ([A-Z][A-Za-z0-9&-]*(?: [A-Z][A-Za-z0-9&-]*)*)")
        .expect("company pattern is valid")
});

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    max_results: u32,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RawResult>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    published_date: Option<String>,
}

/// Web-search collector
pub struct WebSearchCollector {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    search_depth: String,
    max_results: u32,
    max_queries: usize,
    retry_policy: RetryPolicy,
    tracker: RateLimitTracker,
    pacer: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl WebSearchCollector {
    pub fn new(config: &WebSearchConfig) -> EnrichResult<Self> {
        let user_agent = format!("vouch-enrich/{}", env!("CARGO_PKG_VERSION"));
        let client = build_http_client(&user_agent, config.request_timeout_secs)?;
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        if config.api_key.is_none() {
            tracing::warn!("Search API key not configured; web-search tasks will fail");
        }

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            search_depth: config.search_depth.clone(),
            max_results: config.max_results,
            max_queries: config.max_queries.max(1),
            retry_policy: RetryPolicy::new(
                config.max_retries,
                config.backoff_base_ms,
                config.backoff_max_ms,
            ),
            tracker: RateLimitTracker::new(),
            pacer: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    async fn search(&self, api_key: &str, query: &str) -> Result<Vec<RawResult>, CollectorError> {
        self.pacer.until_ready().await;

        let body = SearchRequest {
            api_key,
            query,
            search_depth: &self.search_depth,
            max_results: self.max_results,
            include_answer: false,
        };

        tracing::debug!(query, "Querying search API");
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| CollectorError::from_request(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_at = retry_after(response.headers(), Utc::now());
            let err = classify_status(status, RateLimitState::default(), retry_at, query);
            if let CollectorError::RateLimited { reset_at } = &err {
                self.tracker.mark_exhausted(*reset_at);
            }
            return Err(err);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| CollectorError::MalformedResponse(format!("search response: {}", e)))?;
        Ok(parsed.results)
    }
}

#[async_trait::async_trait]
impl SourceCollector for WebSearchCollector {
    fn source_type(&self) -> SourceType {
        SourceType::WebSearch
    }

    async fn fetch(&self, identifier: &str) -> Result<SourcePayload, CollectorError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CollectorError::AuthFailure("search API key not configured".into()))?;

        let name = identifier.trim();
        let queries = build_queries(name, self.max_queries);

        let mut raw = Vec::new();
        for query in &queries {
            raw.extend(self.search(api_key, query).await?);
        }

        let results = build_results(name, queries, raw, Utc::now().date_naive());
        if results.mentions.is_empty() {
            return Err(CollectorError::NotFound(format!("no web mentions for {}", name)));
        }

        tracing::info!(
            name,
            mentions = results.mentions.len(),
            "Collected web-search mentions"
        );
        Ok(SourcePayload::WebSearch(results))
    }

    fn rate_limit_state(&self) -> RateLimitState {
        self.tracker.snapshot()
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }
}

fn build_queries(name: &str, max_queries: usize) -> Vec<String> {
    std::iter::once(format!("\"{}\"", name))
        .chain(QUERY_SUFFIXES.iter().map(|s| format!("\"{}\" {}", name, s)))
        .take(max_queries)
        .collect()
}

/// Score, deduplicate (by URL, best relevance wins) and sort raw hits
fn build_results(
    name: &str,
    queries: Vec<String>,
    raw: Vec<RawResult>,
    today: NaiveDate,
) -> WebSearchResults {
    let mut by_url: HashMap<String, WebMention> = HashMap::new();

    for hit in raw {
        let mention = WebMention {
            relevance_score: relevance_score(name, &hit),
            credibility_score: credibility_score(&hit.url),
            source_name: source_name(&hit.url),
            published_date: hit
                .published_date
                .as_deref()
                .and_then(parse_published_date)
                .filter(|d| *d <= today),
            title: hit.title,
            url: hit.url,
            snippet: hit.content,
        };

        match by_url.get(&mention.url) {
            Some(existing) if existing.relevance_score >= mention.relevance_score => {}
            _ => {
                by_url.insert(mention.url.clone(), mention);
            }
        }
    }

    let mut mentions: Vec<WebMention> = by_url.into_values().collect();
    mentions.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| a.url.cmp(&b.url))
    });

    let fields = infer_fields(name, &mentions);
    WebSearchResults {
        query_name: name.to_string(),
        queries,
        mentions,
        fields,
    }
}

/// 0–100 relevance of a hit to the candidate
///
/// Half the provider score, +30 when the title names the candidate, +10 when
/// the snippet does, +5 per professional keyword (capped at 20).
fn relevance_score(name: &str, hit: &RawResult) -> f64 {
    let name = name.to_lowercase();
    let title = hit.title.to_lowercase();
    let content = hit.content.to_lowercase();

    let mut score = hit.score.clamp(0.0, 1.0) * 100.0 * 0.5;
    if !name.is_empty() && title.contains(&name) {
        score += 30.0;
    }
    if !name.is_empty() && content.contains(&name) {
        score += 10.0;
    }
    let keyword_hits = PROFESSIONAL_KEYWORDS
        .iter()
        .filter(|k| content.contains(*k) || title.contains(*k))
        .count();
    score += (keyword_hits as f64 * 5.0).min(20.0);

    score.min(100.0)
}

fn domain_of(url: &str) -> String {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    let host = without_scheme.split(['/', '?', '#']).next().unwrap_or("");
    let host = host.split(':').next().unwrap_or("");
    host.trim_start_matches("www.").to_lowercase()
}

/// 0–100 publisher credibility by domain
fn credibility_score(url: &str) -> f64 {
    let domain = domain_of(url);
    if HIGH_CREDIBILITY_DOMAINS.iter().any(|d| domain.contains(d)) {
        90.0
    } else if MEDIUM_CREDIBILITY_DOMAINS.iter().any(|d| domain.contains(d)) {
        70.0
    } else {
        50.0
    }
}

/// Publication name: first domain label, capitalized
fn source_name(url: &str) -> String {
    let domain = domain_of(url);
    let label = domain.split('.').next().unwrap_or("");
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Unknown".to_string(),
    }
}

fn parse_published_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.date_naive());
    }
    value
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Profile fields stated in the mentions, most relevant mention first
fn infer_fields(name: &str, mentions: &[WebMention]) -> ProfileFields {
    let lowered = name.to_lowercase();
    let mut fields = ProfileFields::default();

    if !lowered.is_empty()
        && mentions
            .iter()
            .any(|m| m.title.to_lowercase().contains(&lowered))
    {
        fields.name = Some(name.to_string());
    }

    for mention in mentions {
        let text = format!("{} {}", mention.title, mention.snippet);
        if fields.email.is_none() {
            fields.email = EMAIL.find(&text).map(|m| m.as_str().to_string());
        }
        if fields.location.is_none() {
            fields.location = LOCATION
                .captures(&text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim_end_matches('.').to_string());
        }
        if fields.company.is_none() {
            fields.company = COMPANY
                .captures(&text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim_end_matches('.').to_string());
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(title: &str, url: &str, content: &str, score: f64) -> RawResult {
        RawResult {
            title: title.into(),
            url: url.into(),
            content: content.into(),
            score,
            published_date: None,
        }
    }

    #[test]
    fn test_relevance_score_components() {
        let h = hit(
            "Ada Lovelace - Software Engineer",
            "https://example.com/ada",
            "Ada Lovelace is a developer and open source maintainer",
            0.8,
        );
        // 40 + 30 (title) + 10 (content) + 20 (keywords capped)
        assert_eq!(relevance_score("Ada Lovelace", &h), 100.0);

        let h = hit("Unrelated", "https://example.com", "nothing here", 0.5);
        assert_eq!(relevance_score("Ada Lovelace", &h), 25.0);
    }

    #[test]
    fn test_credibility_tiers() {
        assert_eq!(credibility_score("https://www.techcrunch.com/a"), 90.0);
        assert_eq!(credibility_score("https://dev.to/ada/post"), 90.0);
        assert_eq!(credibility_score("https://old.reddit.com/r/rust"), 70.0);
        assert_eq!(credibility_score("https://ada.blog/about"), 50.0);
    }

    #[test]
    fn test_source_name() {
        assert_eq!(source_name("https://www.forbes.com/x"), "Forbes");
        assert_eq!(source_name("http://medium.com:443/@ada"), "Medium");
        assert_eq!(source_name(""), "Unknown");
    }

    #[test]
    fn test_build_results_dedupes_by_url() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let raw = vec![
            hit("Ada Lovelace", "https://a.com/1", "", 0.2),
            hit("Ada Lovelace", "https://a.com/1", "", 0.9),
            hit("Other", "https://b.com/2", "", 0.1),
        ];
        let results = build_results("Ada Lovelace", vec![], raw, today);

        assert_eq!(results.mentions.len(), 2);
        assert_eq!(results.mentions[0].url, "https://a.com/1");
        assert_eq!(results.mentions[0].relevance_score, 75.0);
        assert_eq!(results.fields.name.as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn test_infer_fields_from_snippets() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let raw = vec![hit(
            "Talk by Ada",
            "https://conf.io/ada",
            "Ada is based in Austin, Texas and works at Analytical Engines. Contact ada@example.org.",
            0.6,
        )];
        let results = build_results("Ada Lovelace", vec![], raw, today);

        assert_eq!(results.fields.location.as_deref(), Some("Austin, Texas"));
        assert_eq!(results.fields.company.as_deref(), Some("Analytical Engines"));
        assert_eq!(results.fields.email.as_deref(), Some("ada@example.org"));
        assert_eq!(results.fields.name, None);
    }

    #[test]
    fn test_parse_published_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 3, 14);
        assert_eq!(parse_published_date("2023-03-14"), expected);
        assert_eq!(parse_published_date("2023-03-14T08:00:00Z"), expected);
        assert_eq!(parse_published_date("Tue, 14 Mar 2023 08:00:00 GMT"), expected);
        assert_eq!(parse_published_date("last week"), None);
    }

    #[test]
    fn test_queries_limited() {
        assert_eq!(build_queries("Ada", 1), vec!["\"Ada\"".to_string()]);
        assert_eq!(build_queries("Ada", 5).len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_without_key_is_auth_failure() {
        let collector = WebSearchCollector::new(&WebSearchConfig::default()).unwrap();
        let err = collector.fetch("Ada Lovelace").await.unwrap_err();
        assert!(matches!(err, CollectorError::AuthFailure(_)));
    }
}
