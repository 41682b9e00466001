//! Export job creation.

use crate::client::ApiClient;
use crate::error::Result;
use crate::types::{ExportStarted, JobId};
use tracing::{error, info};

/// Path that starts a zip export for a project
pub fn export_path(short_label: &str, format: &str) -> String {
    format!(
        "/rest/1/{}/report/export_zip?format={}",
        urlencoding::encode(short_label),
        urlencoding::encode(format)
    )
}

/// Path of a job's status resource
pub fn job_path(short_label: &str, job_id: &JobId) -> String {
    format!(
        "/rest/1/{}/job/{}",
        urlencoding::encode(short_label),
        urlencoding::encode(job_id.as_str())
    )
}

impl ApiClient {
    /// Start an asynchronous export of a project's report archive
    ///
    /// Returns the id of the job the service created. The short label is not
    /// validated; an unknown project surfaces as the service's HTTP error.
    pub async fn start_export(&self, short_label: &str, format: &str) -> Result<JobId> {
        let started: ExportStarted = self
            .post(&export_path(short_label, format))
            .await
            .map_err(|e| {
                error!(short_label, error = %e, "Failed to export project report");
                e
            })?;

        info!(short_label, job_id = %started.job_id, "Export job created");
        Ok(started.job_id)
    }
}
