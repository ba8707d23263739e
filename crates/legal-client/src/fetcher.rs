//! Fetching the crucial policy document from the policy service.
//!
//! [`PolicyFetcher`] is the seam the client depends on; [`HttpPolicyFetcher`]
//! is the reqwest implementation. One logical fetch is a `GET` to
//! `{base_url}/public/policies/version/allCrucial` wrapped in an exponential
//! backoff loop:
//!
//! - connection-level failures abort immediately
//! - `5xx` responses are retried until the elapsed-time budget is spent
//! - any other non-`200` status, or a `200` whose body does not decode,
//!   fails immediately

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use url::Url;

use crate::LegalResult;
use crate::config::RetryConfig;
use crate::error::LegalError;
use crate::types::{CRUCIAL_POLICY_VERSION_PATH, CrucialPolicyDocument};

/// Source of crucial policy documents.
#[async_trait]
pub trait PolicyFetcher: Send + Sync {
    /// Retrieves the current crucial policy document.
    async fn fetch(&self) -> LegalResult<CrucialPolicyDocument>;
}

/// Exponential backoff with an elapsed-time budget.
///
/// Intervals grow by `multiplier` from `initial_interval` up to
/// `max_interval`. Once sleeping for the next interval would exceed
/// `max_elapsed_time` since the backoff was created, it stops.
#[derive(Debug)]
pub struct ExponentialBackoff {
    current: Duration,
    multiplier: f64,
    max_interval: Duration,
    max_elapsed_time: Duration,
    started_at: Instant,
}

impl ExponentialBackoff {
    /// Starts a backoff from `config`.
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            current: config.initial_interval,
            multiplier: config.multiplier,
            max_interval: config.max_interval,
            max_elapsed_time: config.max_elapsed_time,
            started_at: Instant::now(),
        }
    }

    /// Returns the next delay, or `None` if the budget is exhausted.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        let delay = self.current.min(self.max_interval);
        if self.started_at.elapsed() + delay > self.max_elapsed_time {
            return None;
        }

        let grown = self.current.as_secs_f64() * self.multiplier.max(1.0);
        self.current = Duration::try_from_secs_f64(grown)
            .unwrap_or(self.max_interval)
            .min(self.max_interval);
        Some(delay)
    }
}

/// Outcome of a single HTTP attempt.
enum AttemptError {
    /// The service answered with this 5xx status.
    Retryable(u16),
    /// Retrying will not help.
    Permanent(LegalError),
}

/// Fetches the crucial policy document over HTTP.
pub struct HttpPolicyFetcher {
    http_client: reqwest::Client,
    url: Url,
    retry: RetryConfig,
}

impl HttpPolicyFetcher {
    /// Creates a fetcher for the policy service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `LegalError::InvalidUrl` if `base_url` is not an absolute
    /// http(s) URL, and `LegalError::Configuration` if `request_timeout` is
    /// zero, `retry` is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str, request_timeout: Duration, retry: RetryConfig) -> LegalResult<Self> {
        let url = crucial_policy_url(base_url)?;

        if request_timeout.is_zero() {
            return Err(LegalError::configuration("request_timeout must be > 0"));
        }
        retry.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LegalError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            url,
            retry,
        })
    }

    /// The full crucial policy endpoint URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn attempt(&self) -> Result<CrucialPolicyDocument, AttemptError> {
        let response = self
            .http_client
            .get(self.url.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AttemptError::Permanent(LegalError::transport(self.url.as_str(), e.to_string())))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AttemptError::Retryable(status.as_u16()));
        }

        if status != reqwest::StatusCode::OK {
            let body = diagnostic_body(response.text().await);
            return Err(AttemptError::Permanent(LegalError::unexpected_status(
                status.as_u16(),
                body,
            )));
        }

        let bytes = response.bytes().await.map_err(|e| {
            AttemptError::Permanent(LegalError::transport(self.url.as_str(), e.to_string()))
        })?;

        serde_json::from_slice(&bytes)
            .map_err(|e| AttemptError::Permanent(LegalError::Decode(e.to_string())))
    }
}

#[async_trait]
impl PolicyFetcher for HttpPolicyFetcher {
    async fn fetch(&self) -> LegalResult<CrucialPolicyDocument> {
        let mut backoff = ExponentialBackoff::new(&self.retry);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            match self.attempt().await {
                Ok(document) => {
                    tracing::debug!(
                        url = %self.url,
                        scopes = document.scope_count(),
                        attempts,
                        "fetched crucial policy document"
                    );
                    return Ok(document);
                }
                Err(AttemptError::Permanent(err)) => {
                    tracing::debug!(url = %self.url, error = %err, "crucial policy fetch failed");
                    return Err(err);
                }
                Err(AttemptError::Retryable(status)) => match backoff.next_backoff() {
                    Some(delay) => {
                        tracing::warn!(
                            url = %self.url,
                            status,
                            attempt = attempts,
                            backoff_ms = delay.as_millis() as u64,
                            "policy service error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        let err = LegalError::Server { status, attempts };
                        tracing::debug!(url = %self.url, error = %err, "crucial policy fetch gave up");
                        return Err(err);
                    }
                },
            }
        }
    }
}

/// Body of an error response, or why it could not be read.
fn diagnostic_body<E: fmt::Display>(body: Result<String, E>) -> String {
    body.unwrap_or_else(|e| format!("<failed to read response body: {e}>"))
}

/// Joins `base_url` and the crucial policy path.
fn crucial_policy_url(base_url: &str) -> LegalResult<Url> {
    let base = base_url.trim_end_matches('/');
    let url = Url::parse(&format!("{base}{CRUCIAL_POLICY_VERSION_PATH}"))
        .map_err(|e| LegalError::InvalidUrl(format!("{base_url}: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(LegalError::InvalidUrl(format!(
            "{base_url}: unsupported scheme '{other}'"
        ))),
    }
}
