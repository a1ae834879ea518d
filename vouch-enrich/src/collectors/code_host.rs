// Code-host collector: GitHub REST API
//
// Fetches the public user profile plus the most recently updated
// repositories. Quota comes from the x-ratelimit-* response headers.
//
// API Documentation: https://docs.github.com/en/rest/users/users

use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;

use super::{
    build_http_client, classify_status, epoch_header, header_u64, retry_after, CollectorError,
    RateLimitState, RateLimitTracker, RetryPolicy, SourceCollector,
};
use crate::config::CodeHostConfig;
use crate::error::EnrichResult;
use crate::types::{CodeHostProfile, ProfileFields, RepositorySummary, SourcePayload, SourceType};

static PROFILE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.)?github\.com/([A-Za-z0-9-]+)/?$")
        .expect("profile URL pattern is valid")
});

static USERNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,38})$")
        .expect("username pattern is valid")
});

/// GitHub user response
#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    blog: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    public_repos: u32,
    #[serde(default)]
    followers: u32,
    html_url: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

/// GitHub repository response (subset)
#[derive(Debug, Deserialize)]
struct GhRepo {
    name: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u32,
    #[serde(default)]
    fork: bool,
    #[serde(default)]
    pushed_at: Option<DateTime<Utc>>,
}

/// GitHub profile collector
pub struct CodeHostCollector {
    client: Client,
    base_url: String,
    token: Option<String>,
    max_repositories: u32,
    retry_policy: RetryPolicy,
    tracker: RateLimitTracker,
    /// Local request pacing, independent of the upstream quota
    pacer: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl CodeHostCollector {
    pub fn new(config: &CodeHostConfig) -> EnrichResult<Self> {
        let client = build_http_client(&config.user_agent, config.request_timeout_secs)?;
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            max_repositories: config.max_repositories.clamp(1, 100),
            retry_policy: RetryPolicy::new(
                config.max_retries,
                config.backoff_base_ms,
                config.backoff_max_ms,
            ),
            tracker: RateLimitTracker::new(),
            pacer: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    /// GET `url`, record quota headers, map failures
    async fn get_json<T: DeserializeOwned>(&self, url: &str, context: &str) -> Result<T, CollectorError> {
        self.pacer.until_ready().await;

        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        tracing::debug!(url, "Querying code host API");
        let response = request
            .send()
            .await
            .map_err(|e| CollectorError::from_request(&e))?;

        let response = self.check_status(response, context)?;
        response
            .json::<T>()
            .await
            .map_err(|e| CollectorError::MalformedResponse(format!("{}: {}", context, e)))
    }

    fn check_status(&self, response: Response, context: &str) -> Result<Response, CollectorError> {
        let headers = response.headers();
        let quota = RateLimitState {
            remaining: header_u64(headers, "x-ratelimit-remaining").map(|v| v as u32),
            reset_at: epoch_header(headers, "x-ratelimit-reset"),
        };
        self.tracker.update(quota.remaining, quota.reset_at);
        let retry_at = retry_after(headers, Utc::now());

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let err = classify_status(status, quota, retry_at, context);
        if let CollectorError::RateLimited { reset_at } = &err {
            self.tracker.mark_exhausted(*reset_at);
        }
        Err(err)
    }
}

#[async_trait::async_trait]
impl SourceCollector for CodeHostCollector {
    fn source_type(&self) -> SourceType {
        SourceType::CodeHost
    }

    async fn fetch(&self, identifier: &str) -> Result<SourcePayload, CollectorError> {
        let username = extract_username(identifier).ok_or_else(|| {
            CollectorError::NotFound(format!("not a code-host username or profile URL: {}", identifier))
        })?;

        let user: GhUser = self
            .get_json(
                &format!("{}/users/{}", self.base_url, username),
                &format!("user {}", username),
            )
            .await?;

        let repos: Vec<GhRepo> = self
            .get_json(
                &format!(
                    "{}/users/{}/repos?sort=updated&per_page={}",
                    self.base_url, username, self.max_repositories
                ),
                &format!("repositories of {}", username),
            )
            .await?;

        let profile = build_profile(user, repos);
        tracing::info!(
            username = %profile.username,
            repositories = profile.repositories.len(),
            "Collected code-host profile"
        );
        Ok(SourcePayload::CodeHost(profile))
    }

    fn rate_limit_state(&self) -> RateLimitState {
        self.tracker.snapshot()
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }
}

/// Username from a bare handle or a profile URL
pub fn extract_username(identifier: &str) -> Option<String> {
    let identifier = identifier.trim();
    if let Some(caps) = PROFILE_URL.captures(identifier) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }
    let handle = identifier.trim_start_matches('@');
    USERNAME.is_match(handle).then(|| handle.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn build_profile(user: GhUser, repos: Vec<GhRepo>) -> CodeHostProfile {
    let website = non_blank(user.blog);
    // "@acme" is how GitHub users commonly write an organization
    let company = non_blank(user.company).map(|c| c.trim_start_matches('@').to_string());

    CodeHostProfile {
        username: user.login,
        profile_url: user.html_url,
        fields: ProfileFields {
            name: non_blank(user.name),
            email: non_blank(user.email),
            location: non_blank(user.location),
            company,
            website,
        },
        bio: non_blank(user.bio),
        public_repos: user.public_repos,
        followers: user.followers,
        account_created_at: user.created_at,
        repositories: repos
            .into_iter()
            .map(|r| RepositorySummary {
                name: r.name,
                language: non_blank(r.language),
                topics: r.topics,
                description: non_blank(r.description),
                stars: r.stargazers_count,
                fork: r.fork,
                pushed_at: r.pushed_at,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_username() {
        assert_eq!(extract_username("octocat").as_deref(), Some("octocat"));
        assert_eq!(extract_username("@octocat").as_deref(), Some("octocat"));
        assert_eq!(
            extract_username("https://github.com/octo-cat/").as_deref(),
            Some("octo-cat")
        );
        assert_eq!(
            extract_username("github.com/octocat").as_deref(),
            Some("octocat")
        );
        assert_eq!(extract_username("https://github.com/octocat/repo"), None);
        assert_eq!(extract_username("not a handle"), None);
        assert_eq!(extract_username(""), None);
    }

    #[test]
    fn test_build_profile_from_api_json() {
        let user: GhUser = serde_json::from_str(
            r#"{
                "login": "octocat",
                "name": "The Octocat",
                "email": null,
                "location": "San Francisco, CA",
                "company": "@github",
                "blog": "",
                "bio": "  ",
                "public_repos": 8,
                "followers": 100,
                "html_url": "https://github.com/octocat",
                "created_at": "2011-01-25T18:44:36Z"
            }"#,
        )
        .unwrap();
        let repos: Vec<GhRepo> = serde_json::from_str(
            r#"[{
                "name": "hello-world",
                "language": "Rust",
                "topics": ["tokio", "cli"],
                "description": "demo",
                "stargazers_count": 3,
                "fork": false,
                "pushed_at": "2024-05-01T10:00:00Z"
            }]"#,
        )
        .unwrap();

        let profile = build_profile(user, repos);
        assert_eq!(profile.fields.name.as_deref(), Some("The Octocat"));
        assert_eq!(profile.fields.company.as_deref(), Some("github"));
        assert_eq!(profile.fields.website, None);
        assert_eq!(profile.bio, None);
        assert_eq!(profile.repositories[0].language.as_deref(), Some("Rust"));
        assert_eq!(profile.repositories[0].topics.len(), 2);
    }

    #[test]
    fn test_construct_with_defaults() {
        let collector = CodeHostCollector::new(&CodeHostConfig::default()).unwrap();
        assert_eq!(collector.source_type(), SourceType::CodeHost);
        assert_eq!(collector.retry_policy().max_retries, 3);
        assert_eq!(collector.rate_limit_state(), RateLimitState::default());
    }
}
