//! report-export - export report archives for every project of a reporting service.
//!
//! Lists the projects visible to the API token, starts an export job for each,
//! polls the job until it is done and saves `<YYYY-MM-DD>_<project>_export.zip`.

mod cli;

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cli::Cli;
use report_export::{Error, Exporter, run_with_shutdown};

/// Exit code used when the run was interrupted by a signal
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::from(2);
        }
    };

    info!(base_url = %config.base_url, output_dir = %config.output_dir.display(), "Starting export run");

    let exporter = match Exporter::new(config) {
        Ok(exporter) => exporter,
        Err(e) => {
            error!("Failed to initialise exporter: {}", e);
            return ExitCode::from(2);
        }
    };

    match run_with_shutdown(&exporter).await {
        Ok(summary) if summary.is_success() => {
            info!(
                exported = summary.exported(),
                skipped = summary.skipped(),
                "All projects processed"
            );
            ExitCode::SUCCESS
        }
        Ok(summary) => {
            for (project, outcome) in &summary.projects {
                if let report_export::ProjectOutcome::Failed { error, .. } = outcome {
                    warn!(project = %project.label, "Failed: {}", error);
                }
            }
            error!(
                failed = summary.failed(),
                total = summary.total,
                "Some projects could not be exported"
            );
            ExitCode::FAILURE
        }
        Err(Error::Cancelled) => {
            warn!("Export run cancelled");
            ExitCode::from(EXIT_CANCELLED)
        }
        Err(e) => {
            error!(code = e.error_code(), "An error occurred: {}", e);
            ExitCode::FAILURE
        }
    }
}
