//! Common test utilities for report-export integration tests

#![allow(dead_code)]

use report_export::{Config, Event, Exporter};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Bytes served as the archive body ("PK", the zip magic)
pub const ZIP_BYTES: [u8; 2] = [0x50, 0x4B];

/// Poll interval used by the tests instead of the 5 second default
pub const TEST_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Configuration pointing at the mock service and writing into `out`
pub fn test_config(server: &MockServer, out: &TempDir) -> Config {
    let mut config = Config::new(&server.uri(), "test-token").expect("valid base URL");
    config.output_dir = out.path().to_path_buf();
    config.poll.interval = TEST_POLL_INTERVAL;
    config
}

/// Exporter over `test_config`
pub fn test_exporter(server: &MockServer, out: &TempDir) -> Exporter {
    Exporter::new(test_config(server, out)).expect("valid config")
}

/// Serve the project listing
pub async fn mount_projects(server: &MockServer, projects: &[(&str, &str)]) {
    let body: Vec<_> = projects
        .iter()
        .map(|(label, short)| json!({"label": label, "shortLabel": short}))
        .collect();

    Mock::given(method("GET"))
        .and(path("/rest/1/"))
        .and(query_param("output", "project"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "project": body })))
        .mount(server)
        .await;
}

/// Serve a successful export start for `short` with job id `job_id`
pub async fn mount_export(server: &MockServer, short: &str, job_id: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/rest/1/{short}/report/export_zip")))
        .and(query_param("format", "xml"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jobId": job_id })))
        .expect(1)
        .mount(server)
        .await;
}

/// Serve a pending job status exactly `times` times
pub async fn mount_pending(server: &MockServer, short: &str, job_id: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/rest/1/{short}/job/{job_id}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"progress": 50, "status": "Running"})),
        )
        .up_to_n_times(times)
        .mount(server)
        .await;
}

/// Serve a completed job status with the given `(visibleName, restUrl)` manifest
pub async fn mount_done(server: &MockServer, short: &str, job_id: &str, files: &[(&str, &str)]) {
    let job_file: Vec<_> = files
        .iter()
        .map(|(name, url)| json!({"visibleName": name, "restUrl": url}))
        .collect();

    Mock::given(method("GET"))
        .and(path(format!("/rest/1/{short}/job/{job_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "progress": 100,
            "status": "Done",
            "jobFile": job_file
        })))
        .mount(server)
        .await;
}

/// Serve a file body
pub async fn mount_file(server: &MockServer, file_path: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(file_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Drain every event already sent
pub fn drain(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}

/// Names of the files in a directory, sorted
pub fn files_in(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .expect("readable output dir")
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
