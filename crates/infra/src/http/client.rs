//! Shared HTTP client for the GraphQL and token endpoints
//!
//! [`HttpClient::send_once`] makes exactly one attempt: GraphQL calls run
//! under the rate governor, which owns their retry budget. Token requests sit
//! outside the governor and go through [`HttpClient::send_with_retry`], which
//! repeats throttled (429), 5xx and connection failures. A `Retry-After`
//! header sets the wait when present, capped at the backoff ceiling;
//! otherwise the wait is the jittered [`ExponentialBackoff`] delay.

use std::sync::Arc;
use std::time::Duration;

use crawlsync_common::{ExponentialBackoff, Sleeper, TokioSleeper};
use crawlsync_domain::{CrawlSyncError, Result};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use crate::errors::InfraError;

const USER_AGENT: &str = concat!("crawlsync/", env!("CARGO_PKG_VERSION"));

/// How [`HttpClient::send_with_retry`] repeats a failed exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub backoff: ExponentialBackoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: ExponentialBackoff::new(Duration::from_millis(200), Duration::from_secs(5))
                .unwrap_or_default(),
        }
    }
}

/// reqwest client plus the retry policy used for token requests.
#[derive(Clone)]
pub struct HttpClient {
    inner: Client,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl HttpClient {
    /// Client whose requests time out after `timeout` unless a request sets
    /// its own.
    pub fn new(timeout: Duration) -> Result<Self> {
        let inner = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .no_proxy()
            .build()
            .map_err(|err| CrawlSyncError::from(InfraError::from(err)))?;
        Ok(Self { inner, retry: RetryPolicy::default(), sleeper: Arc::new(TokioSleeper) })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = RetryPolicy { max_attempts: retry.max_attempts.max(1), ..retry };
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub const fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.inner.post(url)
    }

    /// Send `builder` once; any HTTP status is returned as a response.
    pub async fn send_once(&self, builder: RequestBuilder) -> Result<Response> {
        builder.send().await.map_err(|err| {
            debug!(error = %err, "HTTP request failed");
            CrawlSyncError::from(InfraError::from(err))
        })
    }

    /// Send `builder`, repeating throttled, 5xx and connection failures up to
    /// the policy's attempt limit. The last response is returned as-is so
    /// callers can read its status and body.
    pub async fn send_with_retry(&self, builder: RequestBuilder) -> Result<Response> {
        let mut attempt: u32 = 0;
        loop {
            let request = builder.try_clone().ok_or_else(|| {
                CrawlSyncError::Internal("streamed request bodies cannot be retried".into())
            })?;
            attempt += 1;
            let last = attempt >= self.retry.max_attempts;

            let wait = match request.send().await {
                Ok(response) if !last && is_retryable_status(response.status()) => {
                    let status = response.status();
                    let wait = self.wait_before_retry(attempt, retry_after(response.headers()));
                    warn!(attempt, %status, wait_ms = millis(wait), "retrying HTTP request");
                    wait
                }
                Ok(response) => return Ok(response),
                Err(err) if !last && (err.is_connect() || err.is_timeout()) => {
                    let wait = self.wait_before_retry(attempt, None);
                    warn!(attempt, error = %err, wait_ms = millis(wait), "retrying HTTP request");
                    wait
                }
                Err(err) => return Err(InfraError::from(err).into()),
            };
            self.sleeper.sleep(wait).await;
        }
    }

    fn wait_before_retry(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.retry.backoff;
        match retry_after {
            Some(requested) => requested.min(backoff.max()),
            None => backoff.delay(attempt - 1),
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").field("retry", &self.retry).finish_non_exhaustive()
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// `Retry-After` in delta-seconds form; HTTP dates are ignored
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
