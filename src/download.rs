//! Artifact selection and download.

use crate::client::ApiClient;
use crate::error::{Error, Result};
use crate::types::{FileEntry, ProjectOutcome};
use crate::utils::{export_file_name, today_utc, until_cancelled};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Find the manifest entry with exactly the given visible name
///
/// Matching is case-sensitive. If several entries share the name, the first one wins.
pub fn select_artifact<'a>(manifest: &'a [FileEntry], name: &str) -> Option<&'a FileEntry> {
    manifest.iter().find(|f| f.visible_name == name)
}

impl ApiClient {
    /// Download a project's archive from a completed job's manifest
    ///
    /// Writes `<output_dir>/<YYYY-MM-DD>_<project_label>_export.zip`, dated with the
    /// UTC day at the time of the download. The bytes go to a `.part` file first and
    /// are renamed into place once fully written.
    ///
    /// A manifest without `artifact_name` is not an error: nothing is written and
    /// [`ProjectOutcome::NoArtifact`] is returned.
    ///
    /// `cancel` interrupts the transfer only. Once the bytes are in memory the
    /// write runs to completion, so cancellation never leaves a `.part` file behind.
    ///
    /// # Errors
    ///
    /// Returns a request error if the file cannot be fetched, an I/O error if it
    /// cannot be written, or [`Error::Cancelled`](crate::Error::Cancelled).
    pub async fn download_artifact(
        &self,
        manifest: &[FileEntry],
        project_label: &str,
        artifact_name: &str,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ProjectOutcome> {
        let Some(entry) = select_artifact(manifest, artifact_name) else {
            warn!(
                project = project_label,
                files = manifest.len(),
                "No file named {:?} found.",
                artifact_name
            );
            return Ok(ProjectOutcome::NoArtifact);
        };

        let content = until_cancelled(cancel, self.get_bytes(&entry.rest_url))
            .await
            .map_err(|e| {
                if !matches!(e, Error::Cancelled) {
                    error!(
                        project = project_label,
                        url = %entry.rest_url,
                        error = %e,
                        "Failed to download file"
                    );
                }
                e
            })?;

        let file_name = export_file_name(today_utc(), project_label);
        let path = output_dir.join(&file_name);

        write_atomically(&path, &content).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to save file");
            e
        })?;

        info!(
            project = project_label,
            path = %path.display(),
            bytes = content.len(),
            "File saved as {}",
            file_name
        );

        Ok(ProjectOutcome::Exported {
            path,
            bytes: content.len() as u64,
        })
    }
}

async fn write_atomically(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let partial = PartialFile::new(partial_path(path));

    tokio::fs::write(partial.path(), content).await?;
    tokio::fs::rename(partial.path(), path).await?;

    partial.keep();
    Ok(())
}

/// A `.part` file that is removed on drop unless kept
///
/// Cleans up after a failed write or rename.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            // Drop cannot await; removing a single file is quick
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Error;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(name: &str, url: &str) -> FileEntry {
        FileEntry {
            visible_name: name.to_string(),
            rest_url: url.to_string(),
        }
    }

    fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(&Config::new(&server.uri(), "token").unwrap()).unwrap()
    }

    #[test]
    fn test_select_artifact_exact_match_only() {
        let manifest = vec![
            entry("Export.zip", "/f/0"),
            entry("export.zip.md5", "/f/1"),
            entry("export.zip", "/f/2"),
        ];
        let found = select_artifact(&manifest, "export.zip").unwrap();
        assert_eq!(found.rest_url, "/f/2");
    }

    #[test]
    fn test_select_artifact_first_duplicate_wins() {
        let manifest = vec![entry("export.zip", "/first"), entry("export.zip", "/second")];
        assert_eq!(
            select_artifact(&manifest, "export.zip").unwrap().rest_url,
            "/first"
        );
    }

    #[test]
    fn test_select_artifact_none() {
        assert!(select_artifact(&[], "export.zip").is_none());
        assert!(select_artifact(&[entry("report.pdf", "/f/0")], "export.zip").is_none());
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/out/2024-01-01_Demo_export.zip")),
            PathBuf::from("/out/2024-01-01_Demo_export.zip.part")
        );
    }

    #[tokio::test]
    async fn test_download_writes_dated_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/f/1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x50, 0x4B, 0x03, 0x04]))
            .expect(1)
            .mount(&server)
            .await;

        let out = TempDir::new().unwrap();
        let manifest = vec![entry("report.pdf", "/f/0"), entry("export.zip", "/f/1")];

        let outcome = client_for(&server)
            .download_artifact(
                &manifest,
                "Demo",
                "export.zip",
                out.path(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let expected = out.path().join(export_file_name(today_utc(), "Demo"));
        assert_eq!(
            outcome,
            ProjectOutcome::Exported {
                path: expected.clone(),
                bytes: 4
            }
        );
        assert_eq!(std::fs::read(&expected).unwrap(), vec![0x50, 0x4B, 0x03, 0x04]);
        assert!(!partial_path(&expected).exists(), "no partial file left behind");
    }

    #[tokio::test]
    async fn test_missing_artifact_writes_nothing() {
        let server = MockServer::start().await;
        let out = TempDir::new().unwrap();

        let outcome = client_for(&server)
            .download_artifact(
                &[entry("report.pdf", "/f/0")],
                "Demo",
                "export.zip",
                out.path(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, ProjectOutcome::NoArtifact);
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_request_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/f/1"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;
        let out = TempDir::new().unwrap();

        let err = client_for(&server)
            .download_artifact(
                &[entry("export.zip", "/f/1")],
                "Demo",
                "export.zip",
                out.path(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(err.is_request_error());
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_is_io_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/f/1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1, 2, 3]))
            .mount(&server)
            .await;
        let out = TempDir::new().unwrap();
        let missing_dir = out.path().join("does-not-exist");

        let err = client_for(&server)
            .download_artifact(
                &[entry("export.zip", "/f/1")],
                "Demo",
                "export.zip",
                &missing_dir,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_partial_file_removed_unless_kept() {
        let dir = TempDir::new().unwrap();

        let dropped = dir.path().join("dropped.zip.part");
        std::fs::write(&dropped, b"PK").unwrap();
        drop(PartialFile::new(dropped.clone()));
        assert!(!dropped.exists());

        let kept = dir.path().join("kept.zip.part");
        std::fs::write(&kept, b"PK").unwrap();
        PartialFile::new(kept.clone()).keep();
        assert!(kept.exists());
    }

    #[tokio::test]
    async fn test_cancelled_download_writes_nothing() {
        let server = MockServer::start().await;
        let out = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client_for(&server)
            .download_artifact(
                &[entry("export.zip", "/f/1")],
                "Demo",
                "export.zip",
                out.path(),
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }
}
