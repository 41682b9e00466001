//! Error types for report-export
//!
//! This module provides the error taxonomy shared by every stage of an export run:
//! - [`RequestError`] for anything that goes wrong talking to the reporting service
//! - I/O errors for local file writes
//! - Poll bounds (attempt cap, deadline) and cancellation
//!
//! A manifest without the wanted artifact is deliberately *not* an error; it is
//! reported as [`ProjectOutcome::NoArtifact`](crate::types::ProjectOutcome::NoArtifact).

use std::time::Duration;
use thiserror::Error;

/// Result type alias for report-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for report-export
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "base_url")
        key: Option<String>,
    },

    /// A call to the reporting service failed
    #[error("request error: {0}")]
    Request(#[from] RequestError),

    /// I/O error (writing the downloaded archive)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The job was still pending after the configured number of polls
    #[error("job {job_id} still pending after {attempts} status checks")]
    PollExhausted {
        /// The job that never completed
        job_id: String,
        /// Number of status fetches performed
        attempts: u32,
    },

    /// The job did not complete before the configured poll deadline
    #[error("job {job_id} did not complete within {}s", elapsed.as_secs())]
    PollTimeout {
        /// The job that never completed
        job_id: String,
        /// Time spent polling before giving up
        elapsed: Duration,
    },

    /// The run was cancelled (Ctrl-C, SIGTERM, or a caller-supplied token)
    #[error("export run cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Errors raised by the API client
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request never produced a response (DNS, connect, timeout, TLS, ...)
    #[error("request to {url} failed: {source}")]
    Transport {
        /// Fully resolved request URL
        url: String,
        /// Underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// A download stopped sending data for longer than the request timeout
    #[error("download from {url} stalled for {}s", idle.as_secs())]
    Stalled {
        /// Fully resolved request URL
        url: String,
        /// How long no data arrived
        idle: Duration,
    },

    /// The service answered with a non-success status code
    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        /// Fully resolved request URL
        url: String,
        /// HTTP status code
        status: u16,
        /// Start of the response body, for diagnostics
        body: String,
    },

    /// The response body did not have the expected shape
    #[error("unexpected response body from {url}: {source}")]
    Decode {
        /// Fully resolved request URL
        url: String,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// A request path could not be turned into a URL
    #[error("invalid request URL {path:?}: {reason}")]
    InvalidUrl {
        /// The path or URL as given
        path: String,
        /// Why it could not be resolved
        reason: String,
    },
}

impl RequestError {
    /// HTTP status code of the failed request, if the service answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            RequestError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            RequestError::Stalled { .. }
            | RequestError::Decode { .. }
            | RequestError::InvalidUrl { .. } => None,
        }
    }
}

impl Error {
    /// Create a configuration error for the given key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error came from a call to the reporting service
    pub fn is_request_error(&self) -> bool {
        matches!(self, Error::Request(_))
    }

    /// Machine-readable error code, used in events and the run summary
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Request(e) => match e {
                RequestError::Transport { .. } => "transport_error",
                RequestError::Stalled { .. } => "download_stalled",
                RequestError::Status { .. } => "http_status_error",
                RequestError::Decode { .. } => "decode_error",
                RequestError::InvalidUrl { .. } => "invalid_url",
            },
            Error::Io(_) => "io_error",
            Error::PollExhausted { .. } => "poll_exhausted",
            Error::PollTimeout { .. } => "poll_timeout",
            Error::Cancelled => "cancelled",
            Error::Other(_) => "internal_error",
        }
    }
}
