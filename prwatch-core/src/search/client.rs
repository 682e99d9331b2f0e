//! HTTP client for the search API

use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::agents::AgentMeta;
use crate::config::GithubConfig;
use crate::error::{Error, Result};
use crate::types::AgentCounts;

use super::PrCounter;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Response from GET /search/issues (only the fields we use)
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    /// Number of matching items across all pages
    pub total_count: u64,
    /// Set when the search timed out server-side and the count may be low
    #[serde(default)]
    pub incomplete_results: bool,
}

/// Outcome of a single request.
enum Attempt {
    Done(SearchResponse),
    /// Rate limited; wait hint from the response headers, if any
    RateLimited {
        wait: Option<Duration>,
        message: String,
    },
    /// Transient failure worth retrying
    Retryable(String),
    /// Permanent failure (bad query, bad token, ...)
    Fatal(String),
}

/// Async HTTP client for the search API
pub struct SearchClient {
    config: GithubConfig,
    http_client: reqwest::Client,
    base_url: String,
    /// Set when the last response reported an exhausted quota
    throttle_until: Mutex<Option<Instant>>,
}

impl SearchClient {
    /// Create a new search client from configuration
    pub fn new(config: GithubConfig) -> Result<Self> {
        let base_url = config.api_url.trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| Error::Config(format!("invalid user_agent: {}", e)))?,
        );

        if let Some(token) = config.resolved_token() {
            let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|e| Error::Config(format!("invalid token: {}", e)))?;
            auth_value.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth_value);
        } else {
            tracing::warn!("No API token configured; unauthenticated search limits apply");
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            base_url,
            throttle_until: Mutex::new(None),
        })
    }

    /// Fetch total and merged counts for one agent
    pub async fn fetch_agent(&self, agent: &AgentMeta) -> Result<AgentCounts> {
        let total = self.count(&agent.key, &agent.total_query).await?;
        let merged = self.count(&agent.key, &agent.merged_query).await?;
        tracing::info!(agent = %agent.key, total, merged, "Fetched PR counts");
        Ok(AgentCounts { total, merged })
    }

    /// Run one search query with rate-limit handling and retries
    ///
    /// Returns the query's `total_count`.
    pub async fn count(&self, agent: &str, query: &str) -> Result<u64> {
        let max_wait = Duration::from_secs(self.config.max_rate_limit_wait_secs);
        let mut delay = INITIAL_BACKOFF;
        let mut last_error = String::from("no attempt made");

        for attempt in 0..=self.config.max_retries {
            self.wait_for_throttle(max_wait).await;

            let (message, wait) = match self.attempt(query).await {
                Attempt::Done(response) => {
                    if response.incomplete_results {
                        tracing::warn!(agent, query, "Search reported incomplete results");
                    }
                    return Ok(response.total_count);
                }
                Attempt::Fatal(message) => {
                    return Err(Error::Api {
                        agent: agent.to_string(),
                        message,
                    });
                }
                Attempt::RateLimited { wait, message } => {
                    let wait = wait.unwrap_or(delay);
                    if wait > max_wait {
                        return Err(Error::TransientFetch {
                            agent: agent.to_string(),
                            message: format!(
                                "{message}; reset in {}s exceeds max wait of {}s",
                                wait.as_secs(),
                                max_wait.as_secs()
                            ),
                        });
                    }
                    (message, wait)
                }
                Attempt::Retryable(message) => (message, delay),
            };

            last_error = message;
            if attempt == self.config.max_retries {
                break;
            }

            tracing::warn!(
                agent,
                attempt = attempt + 1,
                max_attempts = self.config.max_retries + 1,
                wait_ms = wait.as_millis() as u64,
                error = %last_error,
                "Retrying search query"
            );
            tokio::time::sleep(wait).await;
            delay = std::cmp::min(delay * 2, MAX_BACKOFF);
        }

        Err(Error::TransientFetch {
            agent: agent.to_string(),
            message: format!(
                "{} (gave up after {} attempts)",
                last_error,
                self.config.max_retries + 1
            ),
        })
    }

    async fn attempt(&self, query: &str) -> Attempt {
        let url = format!(
            "{}/search/issues?q={}&per_page=1",
            self.base_url,
            urlencoding::encode(query)
        );

        let response = match self.http_client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Retryable(format!("HTTP request failed: {}", e)),
        };

        let status = response.status();
        let headers = response.headers().clone();

        if status.is_success() {
            self.note_quota(&headers);
            return match response.json::<SearchResponse>().await {
                Ok(parsed) => Attempt::Done(parsed),
                Err(e) => Attempt::Retryable(format!("failed to parse response: {}", e)),
            };
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown".to_string());

        if is_rate_limited(status, &headers, &body) {
            Attempt::RateLimited {
                wait: rate_limit_wait(&headers, chrono::Utc::now().timestamp()),
                message: format!("rate limited ({})", status),
            }
        } else if status.is_server_error() {
            Attempt::Retryable(format!("API error ({}): {}", status, truncate(&body)))
        } else {
            Attempt::Fatal(format!("API error ({}): {}", status, truncate(&body)))
        }
    }

    /// Remember an exhausted quota so the next request waits for the reset.
    fn note_quota(&self, headers: &HeaderMap) {
        if header_u64(headers, "x-ratelimit-remaining") != Some(0) {
            return;
        }
        if let Some(wait) = rate_limit_wait(headers, chrono::Utc::now().timestamp()) {
            tracing::info!(wait_secs = wait.as_secs(), "Search quota exhausted; throttling");
            if let Ok(mut guard) = self.throttle_until.lock() {
                *guard = Some(Instant::now() + wait);
            }
        }
    }

    async fn wait_for_throttle(&self, max_wait: Duration) {
        let deadline = match self.throttle_until.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(deadline) = deadline {
            let wait = deadline.saturating_duration_since(Instant::now()).min(max_wait);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }
    }
}

/// Blocking wrapper for [`SearchClient`]
///
/// Owns a current-thread runtime so the synchronous pipeline can drive the
/// async client.
pub struct BlockingSearchClient {
    inner: SearchClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingSearchClient {
    pub fn new(config: GithubConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Config(format!("failed to create runtime: {}", e)))?;

        Ok(Self {
            inner: SearchClient::new(config)?,
            runtime,
        })
    }

    /// Run one search query (blocking)
    pub fn count(&self, agent: &str, query: &str) -> Result<u64> {
        self.runtime.block_on(self.inner.count(agent, query))
    }
}

impl PrCounter for BlockingSearchClient {
    fn fetch(&self, agent: &AgentMeta) -> Result<AgentCounts> {
        self.runtime.block_on(self.inner.fetch_agent(agent))
    }
}

/// Whether a non-success response is a rate-limit rejection
fn is_rate_limited(status: StatusCode, headers: &HeaderMap, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    if status != StatusCode::FORBIDDEN {
        return false;
    }
    header_u64(headers, "x-ratelimit-remaining") == Some(0)
        || headers.contains_key("retry-after")
        || body.to_ascii_lowercase().contains("rate limit")
}

/// How long to wait before the rate limit resets
///
/// Prefers `retry-after`, then `x-ratelimit-reset` (epoch seconds) plus one
/// second of slack.
fn rate_limit_wait(headers: &HeaderMap, now_epoch: i64) -> Option<Duration> {
    if let Some(secs) = header_u64(headers, "retry-after") {
        return Some(Duration::from_secs(secs));
    }
    let reset = header_u64(headers, "x-ratelimit-reset")? as i64;
    let secs = (reset - now_epoch).max(0) + 1;
    Some(Duration::from_secs(secs as u64))
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_client_builds_from_default_config() {
        assert!(SearchClient::new(GithubConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_user_agent_is_config_error() {
        let config = GithubConfig {
            user_agent: "bad\nagent".to_string(),
            ..Default::default()
        };
        assert!(matches!(SearchClient::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_is_rate_limited() {
        let empty = HeaderMap::new();
        assert!(is_rate_limited(StatusCode::TOO_MANY_REQUESTS, &empty, ""));
        assert!(is_rate_limited(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "0")]),
            ""
        ));
        assert!(is_rate_limited(
            StatusCode::FORBIDDEN,
            &empty,
            r#"{"message":"You have exceeded a secondary rate limit"}"#
        ));
        assert!(!is_rate_limited(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "12")]),
            "Resource not accessible"
        ));
        assert!(!is_rate_limited(StatusCode::UNPROCESSABLE_ENTITY, &empty, ""));
    }

    #[test]
    fn test_rate_limit_wait_prefers_retry_after() {
        let h = headers(&[("retry-after", "7"), ("x-ratelimit-reset", "1000")]);
        assert_eq!(rate_limit_wait(&h, 900), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_rate_limit_wait_from_reset() {
        let h = headers(&[("x-ratelimit-reset", "1060")]);
        assert_eq!(rate_limit_wait(&h, 1000), Some(Duration::from_secs(61)));
        // A reset in the past still waits the slack second.
        assert_eq!(rate_limit_wait(&h, 2000), Some(Duration::from_secs(1)));
        assert_eq!(rate_limit_wait(&HeaderMap::new(), 1000), None);
    }

    #[test]
    fn test_truncate() {
        let long = "x".repeat(500);
        assert_eq!(truncate(&long).len(), 200);
        assert_eq!(truncate("short"), "short");
    }
}
