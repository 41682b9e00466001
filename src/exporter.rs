//! Export orchestration.
//!
//! The [`Exporter`] walks every project in listing order, one at a time:
//! start an export job, wait for it to complete, download its archive. Progress
//! is logged through `tracing` and broadcast as [`Event`]s to subscribers.

use crate::client::ApiClient;
use crate::config::{Config, FailurePolicy};
use crate::error::{Error, Result};
use crate::types::{Event, Project, ProjectOutcome, RunSummary};
use crate::utils::until_cancelled;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Separator logged before each project
const PROJECT_SEPARATOR: &str = "#####################";

/// Drives the export workflow for every project
pub struct Exporter {
    client: ApiClient,
    config: Arc<Config>,
    event_tx: broadcast::Sender<Event>,
}

impl Exporter {
    /// Create an exporter from a configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = ApiClient::new(&config)?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            client,
            config: Arc::new(config),
            event_tx,
        })
    }

    /// Subscribe to run events
    ///
    /// Events sent before the subscription are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The configuration this exporter runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The API client shared by every stage
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    /// Export every project the token can see
    ///
    /// The project list is fetched once; projects are then processed strictly in
    /// listing order. With [`FailurePolicy::Continue`] a failed project is recorded
    /// in the summary and the run moves on; with [`FailurePolicy::FailFast`] the
    /// first failure ends the run and is returned.
    ///
    /// # Errors
    ///
    /// - the listing request failed
    /// - a project failed under [`FailurePolicy::FailFast`]
    /// - [`Error::Cancelled`] if `cancel` fired
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary> {
        let projects = until_cancelled(cancel, self.client.list_projects()).await?;
        self.emit_event(Event::ProjectsListed {
            count: projects.len(),
        });

        let mut summary = RunSummary {
            total: projects.len(),
            ..Default::default()
        };

        for project in projects {
            match self.export_project(&project, cancel).await {
                Ok(outcome) => summary.projects.push((project, outcome)),
                Err(Error::Cancelled) => {
                    warn!(project = %project.label, "Export run cancelled");
                    return Err(Error::Cancelled);
                }
                Err(e) => {
                    error!(
                        project = %project.label,
                        code = e.error_code(),
                        error = %e,
                        "Export failed for project {}",
                        project.label
                    );
                    self.emit_event(Event::ProjectFailed {
                        label: project.label.clone(),
                        code: e.error_code().to_string(),
                        error: e.to_string(),
                    });

                    if self.config.failure_policy == FailurePolicy::FailFast {
                        return Err(e);
                    }

                    let outcome = ProjectOutcome::Failed {
                        code: e.error_code().to_string(),
                        error: e.to_string(),
                    };
                    summary.projects.push((project, outcome));
                }
            }
        }

        info!(
            total = summary.total,
            exported = summary.exported(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "Export run finished"
        );
        self.emit_event(Event::RunFinished {
            exported: summary.exported(),
            skipped: summary.skipped(),
            failed: summary.failed(),
        });

        Ok(summary)
    }

    /// Run the export workflow for a single project
    ///
    /// Starts the export, waits for the job to complete and downloads its archive.
    /// A job without the configured artifact yields [`ProjectOutcome::NoArtifact`].
    pub async fn export_project(
        &self,
        project: &Project,
        cancel: &CancellationToken,
    ) -> Result<ProjectOutcome> {
        info!("{}", PROJECT_SEPARATOR);
        info!(
            project = %project.label,
            short_label = %project.short_label,
            "Exporting report for project: {}",
            project.label
        );
        self.emit_event(Event::ProjectStarted {
            label: project.label.clone(),
            short_label: project.short_label.clone(),
        });

        let job_id = until_cancelled(
            cancel,
            self.client
                .start_export(&project.short_label, &self.config.export_format),
        )
        .await?;

        info!(job_id = %job_id, "Polling job status for Job ID: {}", job_id);
        self.emit_event(Event::ExportStarted {
            short_label: project.short_label.clone(),
            job_id: job_id.clone(),
        });

        let manifest = self
            .client
            .await_completion(
                &project.short_label,
                &job_id,
                &self.config.poll,
                cancel,
                |job| {
                    self.emit_event(Event::JobProgress {
                        job_id: job_id.clone(),
                        progress: job.progress,
                        status: job.status.clone(),
                    })
                },
            )
            .await?;

        self.emit_event(Event::JobComplete {
            job_id: job_id.clone(),
            files: manifest.len(),
        });

        let outcome = self
            .client
            .download_artifact(
                &manifest,
                &project.label,
                &self.config.artifact_name,
                &self.config.output_dir,
                cancel,
            )
            .await?;

        match &outcome {
            ProjectOutcome::Exported { path, bytes } => self.emit_event(Event::Downloaded {
                label: project.label.clone(),
                path: path.clone(),
                bytes: *bytes,
            }),
            ProjectOutcome::NoArtifact => self.emit_event(Event::ArtifactMissing {
                label: project.label.clone(),
                artifact: self.config.artifact_name.clone(),
            }),
            ProjectOutcome::Failed { .. } => {}
        }

        Ok(outcome)
    }
}
