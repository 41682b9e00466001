//! Core types for report-export
//!
//! Wire types mirror the reporting service's JSON (camelCase field names); the
//! outcome, summary and event types describe what an export run did.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Job status string the service reports once an export has finished
pub const JOB_DONE_STATUS: &str = "Done";

/// Progress value the service reports once an export has finished
pub const JOB_DONE_PROGRESS: i64 = 100;

/// A project as returned by the project listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Human-readable display name, used in output file names
    pub label: String,
    /// Compact identifier used to build REST paths
    pub short_label: String,
}

/// Body of `GET /rest/1/?output=project`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProjectList {
    /// Projects visible to the token; absent when there are none
    #[serde(default)]
    pub project: Vec<Project>,
}

/// Identifier of a server-side export job
///
/// The service usually sends a string but numeric ids are accepted and kept as text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new JobId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => JobId(s),
            Raw::Number(n) => JobId(n.to_string()),
        })
    }
}

/// Body of `POST /rest/1/{shortLabel}/report/export_zip`
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStarted {
    /// Job created for the export
    pub job_id: JobId,
}

/// One downloadable artifact of a completed job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// File name shown to users (e.g. "export.zip")
    pub visible_name: String,
    /// Absolute or base-relative URL the file can be fetched from
    pub rest_url: String,
}

/// Body of `GET /rest/1/{shortLabel}/job/{jobId}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    /// Job id, when the service echoes it back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    /// Completion percentage (0-100)
    pub progress: i64,
    /// Free-form status string ("Running", "Done", ...)
    pub status: String,
    /// File manifest, populated once the job is complete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_file: Option<Vec<FileEntry>>,
}

impl ExportJob {
    /// Current lifecycle state of the job
    ///
    /// A job is complete only when progress is exactly 100 *and* the status is
    /// exactly "Done"; every other combination is still pending.
    pub fn state(&self) -> JobState {
        if self.progress == JOB_DONE_PROGRESS && self.status == JOB_DONE_STATUS {
            JobState::Complete
        } else {
            JobState::Pending
        }
    }

    /// Whether the job has reached its terminal state
    pub fn is_complete(&self) -> bool {
        self.state() == JobState::Complete
    }

    /// Take the file manifest out of the job (empty if the service sent none)
    pub fn into_manifest(self) -> Vec<FileEntry> {
        self.job_file.unwrap_or_default()
    }
}

/// Lifecycle state of an export job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Still running (or queued) on the service
    Pending,
    /// Finished; the manifest is available
    Complete,
}

/// What happened to a single project during a run
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProjectOutcome {
    /// The archive was downloaded and written
    Exported {
        /// Where the archive was written
        path: PathBuf,
        /// Size of the archive in bytes
        bytes: u64,
    },
    /// The job finished but its manifest had no matching artifact
    NoArtifact,
    /// The project's workflow failed
    Failed {
        /// Machine-readable error code
        code: String,
        /// Human-readable error message
        error: String,
    },
}

/// Per-project results of an export run, in listing order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Each visited project with its outcome
    pub projects: Vec<(Project, ProjectOutcome)>,
    /// Number of projects the listing returned
    pub total: usize,
}

impl RunSummary {
    /// Number of projects whose archive was written
    pub fn exported(&self) -> usize {
        self.count(|o| matches!(o, ProjectOutcome::Exported { .. }))
    }

    /// Number of projects without a matching artifact
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ProjectOutcome::NoArtifact))
    }

    /// Number of projects that failed
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ProjectOutcome::Failed { .. }))
    }

    /// True when no project failed
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&ProjectOutcome) -> bool) -> usize {
        self.projects.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Event emitted during an export run
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The project listing was fetched
    ProjectsListed {
        /// Number of projects to process
        count: usize,
    },

    /// Work on a project began
    ProjectStarted {
        /// Project display label
        label: String,
        /// Project short label
        short_label: String,
    },

    /// An export job was created
    ExportStarted {
        /// Project short label
        short_label: String,
        /// Job created by the service
        job_id: JobId,
    },

    /// A status check found the job still pending (one per wait cycle)
    JobProgress {
        /// Job being polled
        job_id: JobId,
        /// Reported progress percentage
        progress: i64,
        /// Reported status string
        status: String,
    },

    /// The job reached its terminal state
    JobComplete {
        /// Completed job
        job_id: JobId,
        /// Number of entries in the manifest
        files: usize,
    },

    /// The archive was written to disk
    Downloaded {
        /// Project display label
        label: String,
        /// Where the archive was written
        path: PathBuf,
        /// Size in bytes
        bytes: u64,
    },

    /// The manifest had no matching artifact
    ArtifactMissing {
        /// Project display label
        label: String,
        /// Artifact name that was looked for
        artifact: String,
    },

    /// A project's workflow failed
    ProjectFailed {
        /// Project display label
        label: String,
        /// Machine-readable error code
        code: String,
        /// Human-readable error message
        error: String,
    },

    /// The run ended
    RunFinished {
        /// Projects exported
        exported: usize,
        /// Projects without an artifact
        skipped: usize,
        /// Projects that failed
        failed: usize,
    },
}
