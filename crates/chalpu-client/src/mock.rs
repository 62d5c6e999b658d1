//! Scripted backend for tests: replays status responses, no network.

use chalpu_types::{BackendError, ExtractionBackend, ExtractionJob, ImageUpload, SubmitResponse};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Scripted = Result<ExtractionJob, BackendError>;

/// Backend that answers `check_status` from a fixed script.
///
/// Once the script is exhausted the last entry repeats; an empty script answers
/// `PROCESSING` at 0%. Every call is counted so tests can assert how many checks ran.
pub struct ScriptedBackend {
    request_id: String,
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<Scripted>>,
    submit_error: Option<BackendError>,
    latency: Duration,
    submissions: Mutex<Vec<(String, usize)>>,
    checks: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            submit_error: None,
            latency: Duration::ZERO,
            submissions: Mutex::new(Vec::new()),
            checks: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Append a status response.
    pub fn then(self, job: ExtractionJob) -> Self {
        self.push(Ok(job))
    }

    /// Append a failing status check.
    pub fn then_error(self, err: BackendError) -> Self {
        self.push(Err(err))
    }

    /// Make `submit_job` fail with `err`.
    pub fn failing_submit(mut self, err: BackendError) -> Self {
        self.submit_error = Some(err);
        self
    }

    /// Delay every call by `latency` (tokio time, so paused clocks apply).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn push(self, entry: Scripted) -> Self {
        lock(&self.script).push_back(entry);
        self
    }

    /// Number of `check_status` calls started so far.
    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently pending `check_status` calls.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// (collection_id, image size) for each submission.
    pub fn submissions(&self) -> Vec<(String, usize)> {
        lock(&self.submissions).clone()
    }

    fn next_response(&self) -> Scripted {
        let next = lock(&self.script).pop_front();
        let mut last = lock(&self.last);
        match next {
            Some(entry) => {
                *last = Some(entry.clone());
                entry
            }
            None => last
                .clone()
                .unwrap_or_else(|| Ok(ExtractionJob::processing(0, ""))),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ExtractionBackend for ScriptedBackend {
    async fn submit_job(
        &self,
        collection_id: &str,
        image: &ImageUpload,
    ) -> Result<SubmitResponse, BackendError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        lock(&self.submissions).push((collection_id.to_string(), image.bytes.len()));
        if let Some(ref err) = self.submit_error {
            return Err(err.clone());
        }
        Ok(SubmitResponse {
            request_id: self.request_id.clone(),
        })
    }

    async fn check_status(&self, request_id: &str) -> Result<ExtractionJob, BackendError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if request_id != self.request_id {
            return Err(BackendError::NotFound(request_id.to_string()));
        }
        self.next_response().map(|job| job.with_request_id(request_id))
    }
}
