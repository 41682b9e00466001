//! # report-export
//!
//! Bulk export of project report archives from a REST reporting service.
//!
//! For every project visible to an API token, report-export starts an
//! asynchronous export job, polls it until the service reports it done, then
//! downloads the resulting `export.zip` as `<YYYY-MM-DD>_<project>_export.zip`.
//!
//! Projects are processed one at a time, in listing order. By default a failing
//! project is recorded and the run continues; see [`FailurePolicy`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use report_export::{Config, Exporter};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new("https://reports.example.com", "my-api-token")?;
//!     let exporter = Exporter::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = exporter.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = exporter.run(&CancellationToken::new()).await?;
//!     println!("{} exported, {} failed", summary.exported(), summary.failed());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Authenticated HTTP client
pub mod client;
/// Configuration types
pub mod config;
/// Artifact selection and download
pub mod download;
/// Error types
pub mod error;
/// Export job creation
pub mod export;
/// Export orchestration
pub mod exporter;
/// Job polling
pub mod poll;
/// Project listing
pub mod projects;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use client::ApiClient;
pub use config::{Config, FailurePolicy, PollConfig, RetryConfig};
pub use error::{Error, RequestError, Result};
pub use exporter::Exporter;
pub use types::{
    Event, ExportJob, FileEntry, JobId, JobState, Project, ProjectOutcome, RunSummary,
};

use tokio_util::sync::CancellationToken;

/// Run an export with graceful signal handling.
///
/// The run is cancelled when a termination signal arrives: an in-flight request
/// or poll wait is abandoned and [`Error::Cancelled`] is returned.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use report_export::{Config, Exporter, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::new("https://reports.example.com", "my-api-token")?;
///     let exporter = Exporter::new(config)?;
///
///     let summary = run_with_shutdown(&exporter).await?;
///     println!("{} projects exported", summary.exported());
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(exporter: &Exporter) -> Result<RunSummary> {
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    let watcher = tokio::spawn(async move {
        wait_for_signal().await;
        trigger.cancel();
    });

    let result = exporter.run(&cancel).await;
    watcher.abort();
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                ctrl_c_or_never().await;
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                ctrl_c_or_never().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c_or_never().await;
    tracing::info!("Received Ctrl+C signal");
}

/// Resolve on Ctrl+C; never resolve if the handler cannot be installed, so a
/// registration failure does not cancel the run
async fn ctrl_c_or_never() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        std::future::pending::<()>().await;
    }
}
