//! Retry logic with rate-limit-aware backoff
//!
//! Both the JSON and the image request paths share one retry loop. Each failed
//! attempt is classified into a [`Backoff`]:
//! - 429 responses wait for the server-directed delay (or an exponential fallback)
//! - 403 responses trigger a warm-up hook before a linear backoff
//! - other transient failures use a linear backoff
//! - anything else fails immediately
//!
//! # Example
//!
//! ```no_run
//! use mangalib_dl::retry::{RetryPolicy, with_retry};
//! use mangalib_dl::config::RetryConfig;
//! use mangalib_dl::error::Error;
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = RetryPolicy::new(&RetryConfig::default(), 4);
//! let value = with_retry(
//!     &policy,
//!     "example",
//!     |_attempt| async { Ok::<_, Error>(42) },
//!     || async {},
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, server errors, rate limits) should return `true`.
/// Permanent failures (not found, malformed payload, disk errors) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.is_body()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            Error::Http { status, .. } => {
                status.is_server_error() || *status == StatusCode::REQUEST_TIMEOUT
            }
            Error::RateLimited { .. } | Error::AntiBotChallenge { .. } => true,
            // Image hosts occasionally answer 200 with nothing while throttling
            Error::EmptyResponse { .. } => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            Error::InvalidResponse(_)
            | Error::NoPages { .. }
            | Error::NoImageUrls { .. }
            | Error::VolumeUnresolved { .. }
            | Error::NoChaptersDownloaded { .. }
            | Error::Serialization(_)
            | Error::Archive { .. }
            | Error::Metadata(_)
            | Error::Config { .. }
            | Error::Other(_) => false,
        }
    }
}

/// Delay before retrying a 429 response
///
/// A `Retry-After` value wins and is padded by one second. Without one the
/// delay is `min(2^attempt, cap) + 0.1 * attempt` seconds, `attempt` being the
/// zero-based retry index.
pub fn rate_limit_delay(retry_after: Option<u64>, attempt: u32, cap: Duration) -> Duration {
    if let Some(secs) = retry_after {
        return Duration::from_secs(secs).saturating_add(Duration::from_secs(1));
    }

    let exponential = 2f64.powi(attempt.min(63) as i32).min(cap.as_secs_f64());
    Duration::from_secs_f64(exponential + 0.1 * f64::from(attempt))
}

/// Parse a `Retry-After` header holding a non-negative integer number of seconds
///
/// HTTP-date values and anything else unparsable yield `None`.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Action taken between two attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Server asked us to slow down
    RateLimited(Duration),
    /// Anti-bot challenge: warm up the session, then wait
    Challenge(Duration),
    /// Transient failure: wait and try again
    Transient(Duration),
}

impl Backoff {
    /// Time to sleep before the next attempt
    pub fn delay(&self) -> Duration {
        match self {
            Backoff::RateLimited(d) | Backoff::Challenge(d) | Backoff::Transient(d) => *d,
        }
    }
}

/// Attempt limit plus backoff parameters for one kind of request
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Linear step for transient failures
    pub transient_step: Duration,
    /// Linear step after a warm-up
    pub challenge_step: Duration,
    /// Cap for the exponential rate-limit backoff
    pub max_backoff: Duration,
    /// Whether 403 responses go through the warm-up hook
    pub challenge_recovery: bool,
}

impl RetryPolicy {
    /// Policy for `max_attempts` attempts using the configured backoff steps
    pub fn new(config: &RetryConfig, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            transient_step: config.transient_step,
            challenge_step: config.challenge_step,
            max_backoff: config.max_backoff,
            challenge_recovery: false,
        }
    }

    /// Enable warm-up recovery for 403 responses
    pub fn with_challenge_recovery(mut self) -> Self {
        self.challenge_recovery = true;
        self
    }

    /// Classify a failed attempt; `None` means the error is terminal
    pub fn backoff_for(&self, error: &Error, attempt: u32) -> Option<Backoff> {
        let step = |base: Duration| base * (attempt + 1);

        match error {
            Error::RateLimited { retry_after, .. } => Some(Backoff::RateLimited(
                rate_limit_delay(*retry_after, attempt, self.max_backoff),
            )),
            Error::AntiBotChallenge { .. } if self.challenge_recovery => {
                Some(Backoff::Challenge(step(self.challenge_step)))
            }
            e if e.is_retryable() => Some(Backoff::Transient(step(self.transient_step))),
            _ => None,
        }
    }
}

/// Run `operation` until it succeeds, fails terminally, or attempts run out
///
/// `operation` receives the zero-based attempt index. `on_challenge` runs before
/// the backoff sleep whenever a 403 is recovered from; it must not fail.
///
/// The error of the last attempt is returned unchanged.
pub async fn with_retry<F, Fut, T, W, WFut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
    mut on_challenge: W,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    W: FnMut() -> WFut,
    WFut: Future<Output = ()>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let error = match operation(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(request = label, attempts = attempt + 1, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let Some(backoff) = policy.backoff_for(&error, attempt) else {
            tracing::debug!(request = label, error = %error, "non-retryable failure");
            return Err(error);
        };

        if attempt + 1 >= max_attempts {
            tracing::error!(
                request = label,
                error = %error,
                attempts = max_attempts,
                "request failed after all attempts"
            );
            return Err(error);
        }

        let delay = backoff.delay();
        match backoff {
            Backoff::RateLimited(_) => tracing::warn!(
                request = label,
                attempt = attempt + 1,
                max_attempts,
                "rate limit (429), retrying in {:.2}s",
                delay.as_secs_f64()
            ),
            Backoff::Challenge(_) => {
                tracing::warn!(
                    request = label,
                    attempt = attempt + 1,
                    max_attempts,
                    "403 forbidden, warming up session and retrying"
                );
                on_challenge().await;
            }
            Backoff::Transient(_) => tracing::warn!(
                request = label,
                error = %error,
                attempt = attempt + 1,
                max_attempts,
                "request failed, retrying in {:.2}s",
                delay.as_secs_f64()
            ),
        }

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
