//! Status poller: checks one job at a fixed cadence until it settles or the deadline passes.

use crate::{CancelToken, ExtractionError, PollConfig};
use chalpu_types::{ExtractionBackend, ExtractionJob, ExtractionStatus, ProgressObserver};
use tokio::time::{Instant, MissedTickBehavior};

const FALLBACK_FAILURE_MESSAGE: &str = "menu extraction failed";

/// Poll `request_id` until the backend reports a terminal status.
///
/// Every successful check is reported to `observer` before its status is evaluated.
/// The next check is only scheduled after the previous one returned, so at most one
/// check is pending at any time. Cancellation and the deadline take priority over a
/// check that completes in the same instant; once either fires the loop, its timer and
/// any pending check are dropped.
pub async fn poll_until_terminal(
    backend: &dyn ExtractionBackend,
    request_id: &str,
    config: &PollConfig,
    observer: &dyn ProgressObserver,
    cancel: &CancelToken,
) -> Result<ExtractionJob, ExtractionError> {
    let started = Instant::now();
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExtractionError::Cancelled),
        _ = tokio::time::sleep(config.timeout) => Err(ExtractionError::Timeout {
            elapsed: started.elapsed(),
        }),
        res = poll_loop(backend, request_id, config, observer) => res,
    };
    match result {
        Ok(ref job) => tracing::info!(
            request_id = %request_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "extraction completed ({})",
            job.current_step
        ),
        Err(ref e) => {
            tracing::info!(request_id = %request_id, error = %e, "extraction did not complete")
        }
    }
    result
}

async fn poll_loop(
    backend: &dyn ExtractionBackend,
    request_id: &str,
    config: &PollConfig,
    observer: &dyn ProgressObserver,
) -> Result<ExtractionJob, ExtractionError> {
    let period = config.effective_interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive_failures: u32 = 0;

    loop {
        ticker.tick().await;
        let job = match backend.check_status(request_id).await {
            Ok(job) => {
                consecutive_failures = 0;
                job.with_request_id(request_id)
            }
            Err(e) if consecutive_failures < config.max_transient_retries => {
                consecutive_failures += 1;
                tracing::warn!(
                    request_id = %request_id,
                    attempt = consecutive_failures,
                    max = config.max_transient_retries,
                    error = %e,
                    "status check failed; retrying on next tick"
                );
                continue;
            }
            Err(e) => return Err(ExtractionError::Transport(e)),
        };

        tracing::debug!(
            request_id = %request_id,
            status = %job.status,
            progress = job.progress(),
            step = %job.current_step,
            "status check"
        );
        observer.on_progress(job.progress(), &job.current_step);

        match job.status {
            ExtractionStatus::Processing => {}
            ExtractionStatus::Completed => return Ok(job),
            ExtractionStatus::Failed => {
                let message = job
                    .error_message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| FALLBACK_FAILURE_MESSAGE.to_string());
                return Err(ExtractionError::ExtractionFailed(message));
            }
        }
    }
}
