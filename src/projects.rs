//! Project listing.

use crate::client::ApiClient;
use crate::error::Result;
use crate::types::{Project, ProjectList};
use tracing::{error, info};

/// Listing endpoint, relative to the base URL
pub const PROJECTS_PATH: &str = "/rest/1/?output=project&pretty";

impl ApiClient {
    /// Fetch every project visible to the API token, in service order
    ///
    /// # Errors
    ///
    /// Returns a request error if the call fails or the body is not a project listing.
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let list: ProjectList = self.get(PROJECTS_PATH).await.map_err(|e| {
            error!(error = %e, "Failed to fetch projects");
            e
        })?;

        info!(count = list.project.len(), "Fetched project list");
        Ok(list.project)
    }
}
