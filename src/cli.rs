//! CLI argument definitions.

use clap::{ArgAction, Parser};
use report_export::config::{DEFAULT_ARTIFACT_NAME, DEFAULT_EXPORT_FORMAT};
use report_export::{Config, FailurePolicy, PollConfig, RetryConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Export report archives for every project of a reporting service
#[derive(Parser, Debug)]
#[command(name = "report-export")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// API token sent as `Authorization: Token <token>`
    #[arg(
        short = 't',
        long = "api-token",
        visible_aliases = ["api_token", "token"],
        env = "REPORT_EXPORT_API_TOKEN",
        hide_env_values = true
    )]
    pub api_token: String,

    /// Base URL of the reporting service
    #[arg(
        short = 'u',
        long = "base-url",
        visible_aliases = ["base_url", "url"],
        env = "REPORT_EXPORT_BASE_URL"
    )]
    pub base_url: String,

    /// Directory the archives are written to
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Report format requested from the export endpoint
    #[arg(long, default_value = DEFAULT_EXPORT_FORMAT)]
    pub format: String,

    /// Manifest entry to download
    #[arg(long, default_value = DEFAULT_ARTIFACT_NAME)]
    pub artifact: String,

    // === Polling ===
    /// Seconds between job status checks
    #[arg(long, value_name = "SECS", default_value = "5", value_parser = parse_seconds)]
    pub poll_interval: Duration,

    /// Multiply the poll interval by this factor after each check
    #[arg(long, value_name = "FACTOR", default_value_t = 1.0)]
    pub poll_backoff: f64,

    /// Upper bound for the poll interval when backing off
    #[arg(long, value_name = "SECS", default_value = "60", value_parser = parse_seconds)]
    pub max_poll_interval: Duration,

    /// Give up on a job after this many pending status checks
    #[arg(long, value_name = "N")]
    pub max_polls: Option<u32>,

    /// Give up on a job after this many seconds
    #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
    pub poll_timeout: Option<Duration>,

    // === Requests ===
    /// Seconds allowed for an API call, or between data chunks of a download
    #[arg(long, value_name = "SECS", default_value = "60", value_parser = parse_seconds)]
    pub request_timeout: Duration,

    /// Retry transient failures of GET requests this many times (export starts are never retried)
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub retries: u32,

    /// Stop at the first project that fails
    #[arg(long)]
    pub fail_fast: bool,

    // === Logging ===
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Default log filter when `RUST_LOG` is not set
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "info,report_export=debug",
            _ => "trace",
        }
    }

    /// Build the run configuration from the parsed flags
    pub fn into_config(self) -> report_export::Result<Config> {
        let mut config = Config::new(&self.base_url, self.api_token)?;

        config.output_dir = self.output_dir;
        config.export_format = self.format;
        config.artifact_name = self.artifact;
        config.request_timeout = self.request_timeout;
        config.poll = PollConfig {
            interval: self.poll_interval,
            backoff_multiplier: self.poll_backoff,
            max_interval: self.max_poll_interval.max(self.poll_interval),
            max_attempts: self.max_polls,
            timeout: self.poll_timeout,
        };
        config.retry = RetryConfig {
            max_attempts: self.retries,
            ..Default::default()
        };
        config.failure_policy = if self.fail_fast {
            FailurePolicy::FailFast
        } else {
            FailurePolicy::Continue
        };

        config.validate()?;
        Ok(config)
    }
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("{value:?} is not a number of seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid duration {value:?}: {e}"))
}
