//! Authenticated HTTP client for the reporting service.

use crate::config::{Config, RetryConfig};
use crate::error::{Error, RequestError, Result};
use crate::retry::with_retry;
use crate::utils::{MAX_ERROR_BODY_CHARS, resolve_url, truncate_body};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// User agent sent with every request
const USER_AGENT: &str = concat!("report-export/", env!("CARGO_PKG_VERSION"));

/// How `request_timeout` bounds a request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Deadline {
    /// The whole exchange, body included
    Total,
    /// Each wait for the next body chunk; the transfer as a whole is unbounded
    Idle,
}

/// Client for the reporting service REST API
///
/// Every request carries the `Authorization: Token <token>` header and is resolved
/// against the configured base URL. The client is immutable once built; clone it
/// freely, clones share the underlying connection pool.
///
/// JSON calls must finish within `request_timeout`. Archive downloads only fail
/// when no data arrives for that long. Transient failures are retried for
/// idempotent methods only, so starting an export job is never repeated.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
    retry: RetryConfig,
}

impl ApiClient {
    /// Build a client from the run configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the token cannot be sent as a header value, or
    /// [`Error::Other`] if the HTTP client cannot be created.
    pub fn new(config: &Config) -> Result<Self> {
        let mut token = HeaderValue::from_str(&format!("Token {}", config.api_token))
            .map_err(|_| Error::config("api_token", "API token contains invalid characters"))?;
        token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, token);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            request_timeout: config.request_timeout,
            retry: config.retry.clone(),
        })
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET` a path and decode the JSON body
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let (url, body) = self.send(Method::GET, path, Deadline::Total).await?;
        decode(&url, &body)
    }

    /// `POST` to a path (no request body) and decode the JSON body
    ///
    /// Never retried, whatever the retry configuration says.
    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let (url, body) = self.send(Method::POST, path, Deadline::Total).await?;
        decode(&url, &body)
    }

    /// `GET` a path or absolute URL and return the raw body
    ///
    /// The transfer may take as long as it needs while data keeps arriving; it
    /// fails with [`RequestError::Stalled`] once the body goes quiet for longer
    /// than `request_timeout`.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let (_, body) = self.send(Method::GET, url, Deadline::Idle).await?;
        Ok(body)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        deadline: Deadline,
    ) -> Result<(Url, Vec<u8>)> {
        let url = resolve_url(&self.base_url, path)?;

        let body = if method.is_idempotent() {
            with_retry(&self.retry, || self.send_once(method.clone(), &url, deadline)).await
        } else {
            self.send_once(method, &url, deadline).await
        }
        .map_err(Error::Request)?;

        Ok((url, body))
    }

    async fn send_once(
        &self,
        method: Method,
        url: &Url,
        deadline: Deadline,
    ) -> std::result::Result<Vec<u8>, RequestError> {
        debug!(method = %method, url = %url, "Sending request");

        let transport = |source: reqwest::Error| RequestError::Transport {
            url: url.to_string(),
            source,
        };

        let mut request = self.http.request(method, url.clone());
        if deadline == Deadline::Total {
            request = request.timeout(self.request_timeout);
        }

        let mut response = request.send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(url, status, response).await);
        }

        let body = match deadline {
            Deadline::Total => response.bytes().await.map_err(transport)?.to_vec(),
            Deadline::Idle => {
                let mut body = Vec::new();
                loop {
                    match tokio::time::timeout(self.request_timeout, response.chunk()).await {
                        Ok(Ok(Some(chunk))) => body.extend_from_slice(&chunk),
                        Ok(Ok(None)) => break,
                        Ok(Err(e)) => return Err(transport(e)),
                        Err(_) => {
                            return Err(RequestError::Stalled {
                                url: url.to_string(),
                                idle: self.request_timeout,
                            });
                        }
                    }
                }
                body
            }
        };
        debug!(url = %url, status = status.as_u16(), bytes = body.len(), "Received response");

        Ok(body)
    }
}

async fn status_error(url: &Url, status: StatusCode, response: reqwest::Response) -> RequestError {
    // The body is only diagnostic; failing to read it must not hide the status
    let body = response.text().await.unwrap_or_default();

    RequestError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body: truncate_body(&body, MAX_ERROR_BODY_CHARS),
    }
}

fn decode<T: DeserializeOwned>(url: &Url, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|source| {
        Error::Request(RequestError::Decode {
            url: url.to_string(),
            source,
        })
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ApiClient {
        let config = Config::new(&server.uri(), "test-token").unwrap();
        ApiClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_get_sends_token_and_decodes_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/1/"))
            .and(query_param("output", "project"))
            .and(header("authorization", "Token test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "project": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let body: serde_json::Value = client_for(&server)
            .get("/rest/1/?output=project&pretty")
            .await
            .unwrap();
        assert_eq!(body["project"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_post_decodes_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/1/demo/report/export_zip"))
            .and(header("authorization", "Token test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobId": "42"
            })))
            .mount(&server)
            .await;

        let body: serde_json::Value = client_for(&server)
            .post("/rest/1/demo/report/export_zip?format=xml")
            .await
            .unwrap();
        assert_eq!(body["jobId"], "42");
    }

    #[tokio::test]
    async fn test_non_success_status_is_request_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/1/missing/job/1"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such job"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .get::<serde_json::Value>("/rest/1/missing/job/1")
            .await
            .unwrap_err();

        match err {
            Error::Request(RequestError::Status { status, body, url }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "no such job");
                assert!(url.ends_with("/rest/1/missing/job/1"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/1/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .get::<serde_json::Value>("/rest/1/")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Request(RequestError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_get_bytes_follows_absolute_url() {
        let api = MockServer::start().await;
        let files = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/f/1"))
            .and(header("authorization", "Token test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x50, 0x4B]))
            .mount(&files)
            .await;

        let bytes = client_for(&api)
            .get_bytes(&format!("{}/f/1", files.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, vec![0x50, 0x4B]);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Nothing listens on port 9 (discard) in the test environment
        let config = Config::new("http://127.0.0.1:9", "test-token").unwrap();
        let client = ApiClient::new(&config).unwrap();

        let err = client.get::<serde_json::Value>("/rest/1/").await.unwrap_err();
        assert!(matches!(err, Error::Request(RequestError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/1/"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server).get::<serde_json::Value>("/rest/1/").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/1/"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let mut config = Config::new(&server.uri(), "test-token").unwrap();
        config.retry = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        let client = ApiClient::new(&config).unwrap();

        let body: serde_json::Value = client.get("/rest/1/").await.unwrap();
        assert_eq!(body, serde_json::json!({}));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_post_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/1/demo/report/export_zip"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = Config::new(&server.uri(), "test-token").unwrap();
        config.retry = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            jitter: false,
            ..Default::default()
        };
        let client = ApiClient::new(&config).unwrap();

        let err = client
            .post::<serde_json::Value>("/rest/1/demo/report/export_zip?format=xml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Request(RequestError::Status { status: 503, .. })
        ));
    }

    fn slow_server_client(server: &MockServer) -> ApiClient {
        let mut config = Config::new(&server.uri(), "test-token").unwrap();
        config.request_timeout = Duration::from_secs(1);
        ApiClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_slow_archive_outlasts_request_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/f/1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0x50, 0x4B])
                    .set_delay(Duration::from_millis(1500)),
            )
            .mount(&server)
            .await;

        let bytes = slow_server_client(&server).get_bytes("/f/1").await.unwrap();
        assert_eq!(bytes, vec![0x50, 0x4B]);
    }

    #[tokio::test]
    async fn test_slow_json_call_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/1/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({}))
                    .set_delay(Duration::from_millis(1500)),
            )
            .mount(&server)
            .await;

        let err = slow_server_client(&server)
            .get::<serde_json::Value>("/rest/1/")
            .await
            .unwrap_err();
        match err {
            Error::Request(RequestError::Transport { source, .. }) => assert!(source.is_timeout()),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_token_with_newline_rejected() {
        let config = Config::new("https://reports.example.com", "bad\ntoken").unwrap();
        let err = ApiClient::new(&config).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
