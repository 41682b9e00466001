//! Retry logic with exponential backoff
//!
//! Requests to the reporting service are not retried unless
//! [`RetryConfig::max_attempts`] is raised above zero. When enabled, transient
//! failures (timeouts, refused connections, 5xx and 429 responses) are retried
//! with exponential backoff and optional jitter.
//!
//! Only idempotent requests go through [`with_retry`]; see [`ApiClient`](crate::client::ApiClient).
//!
//! # Example
//!
//! ```no_run
//! use report_export::config::RetryConfig;
//! use report_export::error::RequestError;
//! use report_export::retry::with_retry;
//!
//! # async fn fetch() -> Result<Vec<u8>, RequestError> { Ok(Vec::new()) }
//! # async fn example() -> Result<(), RequestError> {
//! let config = RetryConfig { max_attempts: 3, ..Default::default() };
//! let body = with_retry(&config, || fetch()).await?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, RequestError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, service busy, connection reset) should return `true`.
/// Permanent failures (bad credentials, unknown project, malformed body) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for RequestError {
    fn is_retryable(&self) -> bool {
        match self {
            RequestError::Transport { source, .. } => source.is_timeout() || source.is_connect(),
            RequestError::Stalled { .. } => true,
            // 5xx and "too many requests" usually clear up on their own
            RequestError::Status { status, .. } => *status >= 500 || *status == 429,
            RequestError::Decode { .. } | RequestError::InvalidUrl { .. } => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Request(e) => e.is_retryable(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Config { .. }
            | Error::PollExhausted { .. }
            | Error::PollTimeout { .. }
            | Error::Cancelled
            | Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// # Arguments
///
/// * `config` - Retry configuration (max attempts, delays, backoff multiplier, jitter)
/// * `operation` - Async closure that returns `Result<T, E>` where `E` implements [`IsRetryable`]
///
/// # Returns
///
/// Returns the successful result or the last error after all retry attempts are exhausted.
/// With `max_attempts == 0` the operation runs exactly once.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Request succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Request failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tokio::time::sleep(jittered_delay).await;

                delay = next_delay(delay, config);
            }
            Err(e) => {
                if attempt > 0 {
                    tracing::debug!(
                        error = %e,
                        attempts = attempt + 1,
                        "Request failed after all retry attempts"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Grow `delay` by the backoff multiplier, capped at `max_delay`
fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
        .map_or(config.max_delay, |next| next.min(config.max_delay))
}

/// Add random jitter to a delay
///
/// The result is uniformly distributed between `delay` and `2 * delay`, or is
/// `delay` itself when the jittered value does not fit in a [`Duration`].
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor)).unwrap_or(delay)
}
