//! Configuration types for report-export

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, time::Duration};
use url::Url;

/// Name of the manifest entry that holds the report archive
pub const DEFAULT_ARTIFACT_NAME: &str = "export.zip";

/// Report format requested from the export endpoint
pub const DEFAULT_EXPORT_FORMAT: &str = "xml";

/// Top-level configuration for an export run
///
/// Built once at startup and shared read-only by every stage. Construct it with
/// [`Config::new`] and override fields as needed, then call [`Config::validate`].
#[derive(Clone)]
pub struct Config {
    /// Base URL of the reporting service (e.g. `https://reports.example.com`)
    pub base_url: Url,

    /// API token sent as `Authorization: Token <token>`
    pub api_token: String,

    /// Directory the archives are written to (default: current directory)
    pub output_dir: PathBuf,

    /// Format query parameter for the export request (default: "xml")
    pub export_format: String,

    /// Manifest entry to download (default: "export.zip")
    pub artifact_name: String,

    /// Connect timeout, total timeout of API calls, and idle timeout of archive
    /// downloads (default: 60 seconds)
    pub request_timeout: Duration,

    /// Job polling behaviour
    pub poll: PollConfig,

    /// Retry behaviour for transient request failures
    pub retry: RetryConfig,

    /// What to do when one project's export fails
    pub failure_policy: FailurePolicy,
}

impl Config {
    /// Create a configuration with default settings for the given service
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `base_url` is not a valid URL.
    pub fn new(base_url: &str, api_token: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::config("base_url", format!("invalid URL {base_url:?}: {e}")))?;

        Ok(Self {
            base_url,
            api_token: api_token.into(),
            output_dir: PathBuf::from("."),
            export_format: DEFAULT_EXPORT_FORMAT.to_string(),
            artifact_name: DEFAULT_ARTIFACT_NAME.to_string(),
            request_timeout: default_request_timeout(),
            poll: PollConfig::default(),
            retry: RetryConfig::default(),
            failure_policy: FailurePolicy::default(),
        })
    }

    /// Check that the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        match self.base_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::config(
                    "base_url",
                    format!("unsupported scheme {other:?}, expected http or https"),
                ));
            }
        }

        if self.api_token.trim().is_empty() {
            return Err(Error::config("api_token", "API token must not be empty"));
        }
        if self.export_format.trim().is_empty() {
            return Err(Error::config("export_format", "export format must not be empty"));
        }
        if self.artifact_name.trim().is_empty() {
            return Err(Error::config("artifact_name", "artifact name must not be empty"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config(
                "request_timeout",
                "request timeout must be greater than zero",
            ));
        }

        self.poll.validate()?;
        self.retry.validate()
    }
}

// The token must never end up in logs
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &"<redacted>")
            .field("output_dir", &self.output_dir)
            .field("export_format", &self.export_format)
            .field("artifact_name", &self.artifact_name)
            .field("request_timeout", &self.request_timeout)
            .field("poll", &self.poll)
            .field("retry", &self.retry)
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}

/// Job polling configuration
///
/// The defaults poll every 5 seconds forever, which matches how the reporting
/// service is normally driven. Set `max_attempts` or `timeout` to bound the wait.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay between status checks (default: 5 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub interval: Duration,

    /// Growth factor applied to the delay after each pending check (default: 1.0 = fixed)
    #[serde(default = "default_poll_backoff")]
    pub backoff_multiplier: f64,

    /// Upper bound for the grown delay (default: 60 seconds)
    #[serde(default = "default_max_poll_interval", with = "duration_serde")]
    pub max_interval: Duration,

    /// Give up after this many pending status checks (None = unlimited)
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Give up once this much time has passed since the first check (None = unlimited)
    #[serde(default, with = "optional_duration_serde")]
    pub timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            backoff_multiplier: default_poll_backoff(),
            max_interval: default_max_poll_interval(),
            max_attempts: None,
            timeout: None,
        }
    }
}

impl PollConfig {
    fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::config(
                "poll.interval",
                "poll interval must be greater than zero",
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "poll.backoff_multiplier",
                format!(
                    "backoff multiplier must be at least 1.0, got {}",
                    self.backoff_multiplier
                ),
            ));
        }
        if self.max_interval < self.interval {
            return Err(Error::config(
                "poll.max_interval",
                "max poll interval must not be shorter than the poll interval",
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(Error::config(
                "poll.max_attempts",
                "max poll attempts must be at least 1 when set",
            ));
        }
        Ok(())
    }

    /// Whether the poll can wait forever
    pub fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none() && self.timeout.is_none()
    }
}

/// Retry configuration for transient request failures
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 0 = never retry)
    #[serde(default)]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                format!(
                    "backoff multiplier must be at least 1.0, got {}",
                    self.backoff_multiplier
                ),
            ));
        }
        Ok(())
    }
}

/// How a failed project affects the rest of the run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and move on to the next project (default)
    #[default]
    Continue,
    /// Abort the whole run on the first failure
    FailFast,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_poll_backoff() -> f64 {
    1.0
}

fn default_max_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
