//! Retrying HTTP client for the API and the image host
//!
//! One [`HttpClient`] is shared by every chapter task. It carries anonymous
//! browser headers, throttles itself after every successful request and routes
//! every request through [`with_retry`].

use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::{RetryPolicy, parse_retry_after, with_retry};
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, trace};

/// Mobile browser user agent sent with every request
pub const USER_AGENT: &str = "Mozilla/5.0 (iPad; CPU OS 18_6_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/142.0.7444.46 Mobile/15E148 Safari/604.1";

/// HTTP client with bounded retry, rate-limit backoff and 403 warm-up
///
/// Cloning is cheap; clones share the same connection pool.
#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: reqwest::Client,
    referer: String,
    origin: String,
    request_delay: Duration,
    retry: RetryConfig,
}

impl HttpClient {
    /// Build a client from the run configuration
    ///
    /// The pool keeps up to twice the image concurrency idle connections per host.
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );

        let inner = reqwest::Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(config.max_concurrent_images.saturating_mul(2).max(1))
            .build()?;

        Ok(Self {
            inner,
            referer: config.referer.clone(),
            origin: config.referer.trim_end_matches('/').to_string(),
            request_delay: config.request_delay,
            retry: config.retry.clone(),
        })
    }

    /// Retry settings this client was built with
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Best-effort GET of the referer page to refresh anti-bot cookies
    ///
    /// Failures are logged at debug level and otherwise ignored.
    pub async fn warm_up(&self) {
        let result = self
            .inner
            .get(&self.referer)
            .timeout(self.retry.warm_up_timeout)
            .send()
            .await;

        match result {
            Ok(response) => {
                debug!(url = %self.referer, status = %response.status(), "session warm-up done")
            }
            Err(e) => debug!(url = %self.referer, error = %e, "session warm-up failed"),
        }
    }

    /// GET `url` with `query` and parse the body as JSON
    ///
    /// 429 responses back off by `Retry-After` (or exponentially); transient
    /// failures back off linearly. The last error is returned once
    /// `max_attempts` attempts have been made.
    pub async fn fetch_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        max_attempts: u32,
    ) -> Result<Value> {
        let policy = RetryPolicy::new(&self.retry, max_attempts);
        with_retry(
            &policy,
            url,
            |_| self.get_json_once(url, query),
            || async {},
        )
        .await
    }

    /// GET an image and write its bytes to `destination`
    ///
    /// Parent directories are created as needed. Besides the JSON retry rules,
    /// a 403 triggers [`warm_up`](Self::warm_up) before retrying and an empty
    /// body counts as a retryable failure.
    pub async fn fetch_image(&self, url: &str, destination: &Path, max_attempts: u32) -> Result<()> {
        let policy = RetryPolicy::new(&self.retry, max_attempts).with_challenge_recovery();
        with_retry(
            &policy,
            url,
            |_| self.get_image_once(url, destination),
            || self.warm_up(),
        )
        .await
    }

    async fn get_json_once(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self
            .inner
            .get(url)
            .query(query)
            .timeout(self.retry.request_timeout)
            .send()
            .await?;
        let response = check_status(response, url)?;
        let body: Value = response.json().await?;

        trace!(url, "JSON response received");
        self.throttle().await;
        Ok(body)
    }

    async fn get_image_once(&self, url: &str, destination: &Path) -> Result<()> {
        let response = self
            .inner
            .get(url)
            .header(header::REFERER, &self.referer)
            .header(header::ORIGIN, &self.origin)
            .timeout(self.retry.image_timeout)
            .send()
            .await?;
        let response = check_status(response, url)?;
        let bytes = response.bytes().await?;

        if bytes.is_empty() {
            return Err(Error::EmptyResponse {
                url: url.to_string(),
            });
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(destination, &bytes).await?;

        trace!(url, ?destination, bytes = bytes.len(), "image saved");
        self.throttle().await;
        Ok(())
    }

    async fn throttle(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }
}

/// Map non-success statuses onto the error taxonomy
fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
            retry_after: parse_retry_after(response.headers()),
            url: url.to_string(),
        },
        StatusCode::FORBIDDEN => Error::AntiBotChallenge {
            url: url.to_string(),
        },
        status => Error::Http {
            status,
            url: url.to_string(),
        },
    })
}
