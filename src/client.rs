use crate::error::{CreditError, Result};
use crate::utils::retry::{rate_limit_wait, RetryPolicy};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Header carrying the epoch second at which the rate-limit window resets
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Accept header sent to the GitHub-like API
pub const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// Accept header sent to the package index
pub const JSON_ACCEPT: &str = "application/json";

const USER_AGENT_VALUE: &str = concat!("autocredit/", env!("CARGO_PKG_VERSION"));

/// Settings for one [`RequestClient`]
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Value of the injected `Accept` header
    pub accept: String,
    /// Bearer token, injected as `Authorization` when present
    pub token: Option<String>,
    /// Timeout of a single HTTP call
    pub timeout: Duration,
    /// Attempt budget and backoff
    pub retry: RetryPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            accept: JSON_ACCEPT.to_string(),
            token: None,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// A successful (2xx) response, fully read
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body as text
    pub body: String,
}

impl ApiResponse {
    /// Parses the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// HTTP client with authentication, rate-limit handling and retries
///
/// Waits between attempts use `tokio::time::sleep` and only suspend the
/// calling task.
#[derive(Clone)]
pub struct RequestClient {
    client: Client,
    settings: ClientSettings,
}

impl RequestClient {
    /// Builds a client with the given settings
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| CreditError::Transport(e.to_string()))?;

        Ok(Self { client, settings })
    }

    /// The retry policy this client applies
    pub fn retry_policy(&self) -> RetryPolicy {
        self.settings.retry
    }

    /// GET `url`
    pub async fn get(&self, url: &str, deadline: Option<Instant>) -> Result<ApiResponse> {
        self.send(Method::GET, url, None, None, deadline).await
    }

    /// POST `url`, with an optional JSON body
    pub async fn post(&self, url: &str, body: Option<&Value>, deadline: Option<Instant>) -> Result<ApiResponse> {
        self.send(Method::POST, url, body, None, deadline).await
    }

    /// Sends one logical request, retrying until it succeeds or the budget runs out
    ///
    /// Rate-limited responses are waited out and resend the same attempt, at
    /// most `max_rate_limit_waits` times per call. Any other non-2xx status
    /// or transport error consumes an attempt. Nothing is sent once
    /// `deadline` has passed.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        extra_headers: Option<&HeaderMap>,
        deadline: Option<Instant>,
    ) -> Result<ApiResponse> {
        let headers = self.build_headers(extra_headers)?;
        let policy = self.settings.retry;
        let mut attempt: u32 = 0;
        let mut rate_limit_waits: u32 = 0;

        loop {
            if deadline.map_or(false, |d| Instant::now() >= d) {
                return Err(CreditError::DeadlineExceeded { url: url.to_string() });
            }

            let delay = policy.backoff_delay(attempt);
            if !delay.is_zero() {
                if exceeds_deadline(deadline, delay) {
                    return Err(CreditError::DeadlineExceeded { url: url.to_string() });
                }
                debug!(url, attempt, delay_ms = delay.as_millis() as u64, "backing off before retry");
                sleep(delay).await;
            }

            let error = match self.execute(method.clone(), url, body, &headers).await {
                Ok(response) if response.status.is_success() => return Ok(response),
                Ok(response) => {
                    if let Some(wait) = rate_limit_delay(&response) {
                        let pause = policy.rate_limit_sleep(wait);
                        if !policy.allows_rate_limit_wait(rate_limit_waits) || exceeds_deadline(deadline, pause) {
                            return Err(CreditError::RateLimited {
                                url: url.to_string(),
                                wait_secs: wait.as_secs(),
                            });
                        }
                        rate_limit_waits += 1;
                        warn!(url, wait_secs = wait.as_secs(), rate_limit_waits, "rate limited, waiting for reset");
                        sleep(pause).await;
                        continue;
                    }
                    status_error(url, &response)
                }
                Err(e) => e,
            };

            attempt += 1;
            warn!(url, attempt, error = %error, "request attempt failed");
            if !policy.allows_another(attempt) {
                return Err(CreditError::RequestExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    source: Box::new(error),
                });
            }
        }
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        headers: &HeaderMap,
    ) -> Result<ApiResponse> {
        let mut request = self.client.request(method, url).headers(headers.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(ApiResponse { status, headers, body })
    }

    /// Caller headers first, then the injected ones on top
    fn build_headers(&self, extra: Option<&HeaderMap>) -> Result<HeaderMap> {
        let mut headers = extra.cloned().unwrap_or_default();
        if !headers.contains_key(USER_AGENT) {
            headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        }
        headers.insert(ACCEPT, header_value(&self.settings.accept)?);
        if let Some(token) = self.settings.token.as_deref().filter(|t| !t.trim().is_empty()) {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
        }
        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| CreditError::Config(format!("invalid header value: {}", e)))
}

fn exceeds_deadline(deadline: Option<Instant>, wait: Duration) -> bool {
    deadline.map_or(false, |d| Instant::now() + wait > d)
}

/// Wait duration if `response` is a rate-limit rejection with a reset time
fn rate_limit_delay(response: &ApiResponse) -> Option<Duration> {
    if !is_rate_limited(response.status, &response.body) {
        return None;
    }
    let reset = response
        .headers
        .get(HeaderName::from_static(RATE_LIMIT_RESET_HEADER))?
        .to_str()
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()?;
    Some(rate_limit_wait(reset, chrono::Utc::now().timestamp()))
}

/// Whether a status/body pair signals rate limiting
pub fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    matches!(status, StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS)
        && body.to_lowercase().contains("rate limit")
}

fn status_error(url: &str, response: &ApiResponse) -> CreditError {
    if response.status == StatusCode::NOT_FOUND {
        return CreditError::UpstreamNotFound { url: url.to_string() };
    }
    CreditError::Upstream {
        url: url.to_string(),
        status: response.status.as_u16(),
        message: response.body.chars().take(200).collect(),
    }
}
