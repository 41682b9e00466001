//! Utility functions for URL resolution, output naming and cancellation

use crate::error::{Error, RequestError, Result};
use chrono::{NaiveDate, Utc};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Longest response body excerpt kept in a [`RequestError::Status`]
pub const MAX_ERROR_BODY_CHARS: usize = 512;

/// Suffix of every archive written by the downloader
pub const EXPORT_FILE_SUFFIX: &str = "export.zip";

/// Resolve a request path against the service base URL
///
/// Absolute `http`/`https` URLs are returned unchanged. Anything else is appended to
/// the base URL, keeping the base's own path prefix:
///
/// ```
/// use report_export::utils::resolve_url;
/// use url::Url;
///
/// let base = Url::parse("https://reports.example.com/api/").unwrap();
/// let url = resolve_url(&base, "/rest/1/demo/job/42").unwrap();
/// assert_eq!(url.as_str(), "https://reports.example.com/api/rest/1/demo/job/42");
/// ```
pub fn resolve_url(base: &Url, path: &str) -> std::result::Result<Url, RequestError> {
    if let Ok(url) = Url::parse(path)
        && matches!(url.scheme(), "http" | "https")
    {
        return Ok(url);
    }

    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );

    Url::parse(&joined).map_err(|e| RequestError::InvalidUrl {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// Today's date in UTC
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// File name for a project's archive: `<YYYY-MM-DD>_<label>_export.zip`
///
/// ```
/// use chrono::NaiveDate;
/// use report_export::utils::export_file_name;
///
/// let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
/// assert_eq!(export_file_name(date, "Demo"), "2024-03-01_Demo_export.zip");
/// ```
pub fn export_file_name(date: NaiveDate, label: &str) -> String {
    format!("{}_{}_{}", date.format("%Y-%m-%d"), label, EXPORT_FILE_SUFFIX)
}

/// Cut a response body down to something that fits in a log line
pub fn truncate_body(body: &str, max_chars: usize) -> String {
    let body = body.trim();
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Run a future unless the token is cancelled first
///
/// # Errors
///
/// Returns [`Error::Cancelled`] if `cancel` fires before `fut` completes; otherwise
/// whatever `fut` returns.
pub async fn until_cancelled<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}
