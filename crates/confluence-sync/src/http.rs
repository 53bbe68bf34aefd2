//! # Rate-Limited HTTP Client
//!
//! Shared request path for every Confluence and Unique call of one tenant.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Request Lifecycle                                 │
//! │                                                                         │
//! │  send(url, build)                                                       │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  ┌──────────────┐  depleted  ┌───────────────────────┐                 │
//! │  │ limiter.check├───────────►│ until_ready (queued)  │── timeout ──► ✗  │
//! │  └──────┬───────┘            └──────────┬────────────┘  RateLimitDropped│
//! │         │ ok                            │                               │
//! │         ▼◄──────────────────────────────┘                               │
//! │  ┌──────────────┐                                                       │
//! │  │ reqwest send │  redirects followed, 60s request timeout              │
//! │  │              │  (streaming: 60s idle read timeout, no total cap)     │
//! │  └──────┬───────┘                                                       │
//! │         │                                                               │
//! │    2xx ─┴─ non-2xx → HttpStatus { url, status, body }                   │
//! │         │                                                               │
//! │  retryable (network, 429, 502-504)? → exponential backoff, max 3       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::num::NonZeroU32;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{SyncError, SyncResult};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for one rate-limited client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Upstream name used in log lines ("Confluence", "Unique").
    pub name: &'static str,

    /// Requests allowed per minute.
    pub requests_per_minute: u32,

    /// Longest a request may wait for a rate-limit permit.
    pub queue_timeout: Duration,

    /// Per-request timeout.
    pub request_timeout: Duration,

    /// Idle timeout between reads on streamed downloads, which have no total cap.
    pub read_timeout: Duration,

    pub connect_timeout: Duration,

    /// Initial retry delay.
    pub initial_backoff: Duration,

    /// Maximum retry delay.
    pub max_backoff: Duration,

    /// Retries after the first attempt.
    pub max_retries: u32,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        HttpClientConfig {
            name: "upstream",
            requests_per_minute: 100,
            queue_timeout: Duration::from_secs(300),
            request_timeout: Duration::from_secs(60),
            read_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_secs(3),
            max_backoff: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

impl HttpClientConfig {
    pub fn new(name: &'static str, requests_per_minute: u32, queue_timeout: Duration) -> Self {
        Self {
            name,
            requests_per_minute,
            queue_timeout,
            ..Default::default()
        }
    }
}

// =============================================================================
// Rate-Limited Client
// =============================================================================

/// reqwest client behind a per-minute rate limiter with retries.
pub struct RateLimitedHttpClient {
    client: reqwest::Client,

    /// Same limiter and retries, but only connect and idle-read timeouts, so
    /// large downloads are not cut off.
    streaming: reqwest::Client,

    limiter: Limiter,
    config: HttpClientConfig,
}

impl RateLimitedHttpClient {
    pub fn new(config: HttpClientConfig) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {}", e)))?;
        let streaming = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP streaming client: {}", e)))?;

        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            client,
            streaming,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
            config,
        })
    }

    /// The underlying client, for calls that bypass rate limiting.
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Sends a request built by `build`, retrying transient failures.
    ///
    /// `build` runs once per attempt. Non-2xx responses become
    /// [`SyncError::HttpStatus`].
    pub async fn send<F>(&self, url: &str, build: F) -> SyncResult<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        self.send_with(&self.client, url, build).await
    }

    /// Like [`send`](Self::send), for responses whose body is streamed.
    pub async fn send_streaming<F>(&self, url: &str, build: F) -> SyncResult<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        self.send_with(&self.streaming, url, build).await
    }

    async fn send_with<F>(
        &self,
        client: &reqwest::Client,
        url: &str,
        build: F,
    ) -> SyncResult<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let mut backoff = self.create_backoff();
        let mut attempt = 0u32;

        loop {
            let result = self.send_once(client, url, &build).await;
            match result {
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or(self.config.max_backoff);
                    warn!(
                        client = self.config.name,
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    /// GET returning a JSON body.
    pub async fn get_json<T>(&self, url: &str, headers: &[(String, String)]) -> SyncResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self
            .send(url, |client| with_headers(client.get(url), headers))
            .await?;
        read_json(url, response).await
    }

    /// POST with a JSON body, returning a JSON body.
    pub async fn post_json<B, T>(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &B,
    ) -> SyncResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(url, |client| with_headers(client.post(url), headers).json(body))
            .await?;
        read_json(url, response).await
    }

    async fn send_once<F>(
        &self,
        client: &reqwest::Client,
        url: &str,
        build: &F,
    ) -> SyncResult<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        self.acquire_permit(url).await?;

        let response = build(client).send().await?;
        self.log_rate_limit_headers(&response);

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(SyncError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn acquire_permit(&self, url: &str) -> SyncResult<()> {
        if self.limiter.check().is_ok() {
            return Ok(());
        }

        info!(client = self.config.name, "Rate limit reservoir depleted, queuing request");
        match tokio::time::timeout(self.config.queue_timeout, self.limiter.until_ready()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                error!(
                    client = self.config.name,
                    url,
                    waited_secs = self.config.queue_timeout.as_secs(),
                    "Request dropped by rate limiter"
                );
                Err(SyncError::RateLimitDropped {
                    url: url.to_string(),
                    waited_secs: self.config.queue_timeout.as_secs(),
                })
            }
        }
    }

    fn log_rate_limit_headers(&self, response: &reqwest::Response) {
        let headers = response.headers();
        let remaining = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok());
        let limit = headers.get("x-ratelimit-limit").and_then(|v| v.to_str().ok());
        if remaining.is_some() || limit.is_some() {
            info!(
                client = self.config.name,
                remaining = remaining.unwrap_or("-"),
                limit = limit.unwrap_or("-"),
                "Upstream rate limit headers"
            );
        }
    }

    /// Creates the exponential backoff configuration.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Applies `(name, value)` header pairs to a request.
pub fn with_headers(
    mut request: reqwest::RequestBuilder,
    headers: &[(String, String)],
) -> reqwest::RequestBuilder {
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    request
}

async fn read_json<T: DeserializeOwned>(url: &str, response: reqwest::Response) -> SyncResult<T> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        debug!(url, error = %e, "Response body is not the expected JSON");
        SyncError::InvalidResponse(format!("{}: {}", url, e))
    })
}
