//! Job polling.
//!
//! [`poll_until`] is the generic wait loop: fetch, check a completion predicate,
//! sleep, repeat. It is bounded only by what [`PollConfig`] asks for, so with the
//! default configuration it waits for as long as the job takes. Every wait (and
//! every in-flight fetch) is raced against a [`CancellationToken`].
//!
//! [`ApiClient::await_completion`] applies it to export jobs.

use crate::client::ApiClient;
use crate::config::PollConfig;
use crate::error::{Error, Result};
use crate::export::job_path;
use crate::types::{ExportJob, FileEntry, JobId};
use crate::utils::until_cancelled;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Repeatedly call `fetch` until `is_done` accepts its result
///
/// The first fetch happens immediately. After each result that is not done,
/// `on_pending` is called with that result and the delay about to be slept, then
/// the loop sleeps. The delay starts at `config.interval` and is multiplied by
/// `config.backoff_multiplier` after every pending result, capped at
/// `config.max_interval`.
///
/// # Errors
///
/// - any error returned by `fetch`, unchanged
/// - [`Error::PollExhausted`] after `config.max_attempts` pending results
/// - [`Error::PollTimeout`] once `config.timeout` has elapsed since the first fetch
/// - [`Error::Cancelled`] as soon as `cancel` fires
pub async fn poll_until<T, F, Fut, D, P>(
    config: &PollConfig,
    cancel: &CancellationToken,
    job_id: &str,
    mut fetch: F,
    is_done: D,
    mut on_pending: P,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    D: Fn(&T) -> bool,
    P: FnMut(&T, Duration),
{
    let started = Instant::now();
    let deadline = config.timeout.map(|t| started + t);
    let mut delay = config.interval;
    let mut attempts: u32 = 0;

    loop {
        let value = until_cancelled(cancel, fetch()).await?;
        attempts = attempts.saturating_add(1);

        if is_done(&value) {
            debug!(job_id, attempts, "Poll complete");
            return Ok(value);
        }

        if let Some(max) = config.max_attempts
            && attempts >= max
        {
            return Err(Error::PollExhausted {
                job_id: job_id.to_string(),
                attempts,
            });
        }

        let mut wait = delay;
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::PollTimeout {
                    job_id: job_id.to_string(),
                    elapsed: now - started,
                });
            }
            // Wake up at the deadline for one last check
            wait = wait.min(deadline - now);
        }

        on_pending(&value, wait);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = sleep(wait) => {}
        }

        delay = next_delay(delay, config);
    }
}

fn next_delay(delay: Duration, config: &PollConfig) -> Duration {
    if config.backoff_multiplier <= 1.0 {
        return delay;
    }
    Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
        .map_or(config.max_interval, |next| next.min(config.max_interval))
}

impl ApiClient {
    /// Fetch the current state of an export job
    pub async fn job_status(&self, short_label: &str, job_id: &JobId) -> Result<ExportJob> {
        self.get(&job_path(short_label, job_id)).await
    }

    /// Poll an export job until it is complete and return its file manifest
    ///
    /// The job is complete only once it reports progress 100 *and* status "Done".
    /// `on_pending` is called once per wait cycle with the job as last fetched.
    ///
    /// With the default [`PollConfig`] this waits indefinitely; bound it with
    /// `max_attempts`/`timeout` or cancel it through `cancel`.
    pub async fn await_completion<P>(
        &self,
        short_label: &str,
        job_id: &JobId,
        config: &PollConfig,
        cancel: &CancellationToken,
        mut on_pending: P,
    ) -> Result<Vec<FileEntry>>
    where
        P: FnMut(&ExportJob),
    {
        let job = poll_until(
            config,
            cancel,
            job_id.as_str(),
            || self.job_status(short_label, job_id),
            ExportJob::is_complete,
            |job: &ExportJob, wait: Duration| {
                info!(
                    job_id = %job_id,
                    progress = job.progress,
                    status = %job.status,
                    wait_secs = wait.as_secs_f64(),
                    "Job {} progress: {}%. Status: {}. Waiting...",
                    job_id,
                    job.progress,
                    job.status
                );
                on_pending(job);
            },
        )
        .await
        .map_err(|e| {
            if !matches!(e, Error::Cancelled) {
                error!(job_id = %job_id, error = %e, "Failed to poll job status");
            }
            e
        })?;

        info!(job_id = %job_id, "Job {} completed! Downloading file...", job_id);
        Ok(job.into_manifest())
    }
}
