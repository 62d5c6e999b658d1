//! Extraction orchestrator: submit, poll, and keep a view of one extraction at a time.

use crate::{poll_until_terminal, CancelToken, ExtractionError, PollConfig};
use chalpu_types::{ExtractionBackend, ExtractionJob, ImageUpload, NoopObserver, ProgressObserver};
use tokio::sync::watch;

/// `current_step` shown once an extraction completed.
pub const DONE_STEP: &str = "done";

/// Where the current (or last) extraction is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionPhase {
    #[default]
    Idle,
    Submitting,
    Polling,
    Done,
    Failed,
    TimedOut,
    Cancelled,
}

impl ExtractionPhase {
    pub fn is_active(self) -> bool {
        matches!(self, ExtractionPhase::Submitting | ExtractionPhase::Polling)
    }
}

/// State a UI renders for the extraction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractionView {
    pub is_extracting: bool,
    pub progress: u8,
    pub current_step: String,
    pub error: Option<String>,
    pub phase: ExtractionPhase,
    pub request_id: Option<String>,
}

/// Runs one extraction at a time against a backend and publishes its view state.
///
/// A second `extract` while one is running fails with
/// [`ExtractionError::ConcurrentExtraction`]; the running one is not affected.
pub struct ExtractionOrchestrator<B> {
    backend: B,
    config: PollConfig,
    view: watch::Sender<ExtractionView>,
}

impl<B: ExtractionBackend> ExtractionOrchestrator<B> {
    pub fn new(backend: B, config: PollConfig) -> Self {
        let (view, _rx) = watch::channel(ExtractionView::default());
        Self {
            backend,
            config,
            view,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Snapshot of the current view.
    pub fn view(&self) -> ExtractionView {
        self.view.borrow().clone()
    }

    pub fn is_extracting(&self) -> bool {
        self.view.borrow().is_extracting
    }

    /// Receiver notified on every view change.
    pub fn subscribe(&self) -> watch::Receiver<ExtractionView> {
        self.view.subscribe()
    }

    /// Submit `image` for `collection_id` and poll until the job settles.
    pub async fn extract(
        &self,
        collection_id: &str,
        image: &ImageUpload,
    ) -> Result<ExtractionJob, ExtractionError> {
        self.extract_with(collection_id, image, &NoopObserver, &CancelToken::new())
            .await
    }

    /// Like [`extract`](Self::extract), forwarding progress to `observer` and stopping
    /// when `cancel` fires. The view is updated before `observer` is called.
    ///
    /// Errors are recorded in the view and returned unchanged.
    pub async fn extract_with(
        &self,
        collection_id: &str,
        image: &ImageUpload,
        observer: &dyn ProgressObserver,
        cancel: &CancelToken,
    ) -> Result<ExtractionJob, ExtractionError> {
        let _run = self.begin()?;
        let result = self.run(collection_id, image, observer, cancel).await;
        self.settle(&result);
        result
    }

    fn begin(&self) -> Result<RunGuard<'_>, ExtractionError> {
        let started = self.view.send_if_modified(|v| {
            if v.is_extracting {
                return false;
            }
            *v = ExtractionView {
                is_extracting: true,
                phase: ExtractionPhase::Submitting,
                ..ExtractionView::default()
            };
            true
        });
        if !started {
            return Err(ExtractionError::ConcurrentExtraction);
        }
        Ok(RunGuard { view: &self.view })
    }

    async fn run(
        &self,
        collection_id: &str,
        image: &ImageUpload,
        observer: &dyn ProgressObserver,
        cancel: &CancelToken,
    ) -> Result<ExtractionJob, ExtractionError> {
        if cancel.is_cancelled() {
            return Err(ExtractionError::Cancelled);
        }
        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExtractionError::Cancelled),
            res = self.backend.submit_job(collection_id, image) => res?,
        };
        let request_id = submitted.request_id;
        tracing::info!(
            collection_id = %collection_id,
            request_id = %request_id,
            "menu extraction submitted"
        );
        self.view.send_modify(|v| {
            v.phase = ExtractionPhase::Polling;
            v.request_id = Some(request_id.clone());
        });

        let progress = ViewObserver {
            view: &self.view,
            inner: observer,
        };
        poll_until_terminal(&self.backend, &request_id, &self.config, &progress, cancel).await
    }

    fn settle(&self, result: &Result<ExtractionJob, ExtractionError>) {
        self.view.send_modify(|v| {
            v.is_extracting = false;
            match result {
                Ok(_) => {
                    v.progress = 100;
                    v.current_step = DONE_STEP.to_string();
                    v.phase = ExtractionPhase::Done;
                }
                Err(e) => {
                    v.error = Some(e.to_string());
                    v.phase = match e {
                        ExtractionError::Timeout { .. } => ExtractionPhase::TimedOut,
                        ExtractionError::Cancelled => ExtractionPhase::Cancelled,
                        _ => ExtractionPhase::Failed,
                    };
                }
            }
        });
    }
}

/// Clears `is_extracting` if a run is dropped before it settles.
struct RunGuard<'a> {
    view: &'a watch::Sender<ExtractionView>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.view.send_if_modified(|v| {
            if !v.is_extracting {
                return false;
            }
            v.is_extracting = false;
            if v.phase.is_active() {
                v.phase = ExtractionPhase::Cancelled;
            }
            true
        });
    }
}

struct ViewObserver<'a> {
    view: &'a watch::Sender<ExtractionView>,
    inner: &'a dyn ProgressObserver,
}

impl ProgressObserver for ViewObserver<'_> {
    fn on_progress(&self, percentage: u8, step: &str) {
        self.view.send_modify(|v| {
            v.progress = percentage;
            v.current_step = step.to_string();
        });
        self.inner.on_progress(percentage, step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chalpu_client::ScriptedBackend;
    use chalpu_types::BackendError;
    use std::sync::Mutex;
    use std::time::Duration;

    fn image() -> ImageUpload {
        ImageUpload::jpeg(vec![0xFF, 0xD8, 0xFF, 0xE0])
    }

    fn scripted_success() -> ScriptedBackend {
        ScriptedBackend::new("abc")
            .then(ExtractionJob::processing(10, "분석중"))
            .then(ExtractionJob::processing(45, "분석중"))
            .then(ExtractionJob::processing(80, "저장중"))
            .then(ExtractionJob::completed())
    }

    #[tokio::test(start_paused = true)]
    async fn success_sets_done_view() {
        let orch = ExtractionOrchestrator::new(scripted_success(), PollConfig::default());
        let rx = orch.subscribe();

        let job = orch.extract("17", &image()).await.unwrap();

        assert_eq!(job.request_id, "abc");
        let view = orch.view();
        assert!(!view.is_extracting);
        assert_eq!(view.progress, 100);
        assert_eq!(view.current_step, DONE_STEP);
        assert_eq!(view.phase, ExtractionPhase::Done);
        assert_eq!(view.request_id.as_deref(), Some("abc"));
        assert_eq!(view.error, None);
        assert_eq!(*rx.borrow(), view);
        assert_eq!(orch.backend().submissions(), vec![("17".to_string(), 4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn is_extracting_spans_the_whole_run() {
        let orch = ExtractionOrchestrator::new(scripted_success(), PollConfig::default());
        let during = Mutex::new(Vec::new());
        let observer = |p: u8, _: &str| during.lock().unwrap().push((p, orch.is_extracting()));

        assert!(!orch.is_extracting());
        orch.extract_with("17", &image(), &observer, &CancelToken::new())
            .await
            .unwrap();
        assert!(!orch.is_extracting());

        let during = during.into_inner().unwrap();
        assert_eq!(
            during,
            vec![(10, true), (45, true), (80, true), (100, true)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn view_is_updated_before_observer() {
        let orch = ExtractionOrchestrator::new(scripted_success(), PollConfig::default());
        let seen = Mutex::new(Vec::new());
        let observer = |p: u8, step: &str| {
            let view = orch.view();
            assert_eq!(view.progress, p);
            assert_eq!(view.current_step, step);
            assert_eq!(view.phase, ExtractionPhase::Polling);
            seen.lock().unwrap().push(p);
        };

        orch.extract_with("17", &image(), &observer, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![10, 45, 80, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_extraction_while_running_is_rejected() {
        let orch = ExtractionOrchestrator::new(scripted_success(), PollConfig::default());
        let img = image();

        let (first, second) = tokio::join!(orch.extract("17", &img), orch.extract("17", &img));

        assert!(first.is_ok());
        assert_eq!(second.unwrap_err(), ExtractionError::ConcurrentExtraction);
        assert_eq!(orch.backend().submissions().len(), 1);
        assert_eq!(orch.view().phase, ExtractionPhase::Done);
        assert_eq!(orch.view().error, None);

        // Settled runs do not block the next one.
        orch.extract("17", &img).await.unwrap();
        assert_eq!(orch.backend().submissions().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn backend_failure_is_recorded_and_returned() {
        let backend = ScriptedBackend::new("abc")
            .then(ExtractionJob::processing(20, "분석중"))
            .then(ExtractionJob::failed("이미지를 인식할 수 없습니다"));
        let orch = ExtractionOrchestrator::new(backend, PollConfig::default());

        let err = orch.extract("17", &image()).await.unwrap_err();

        assert_eq!(
            err,
            ExtractionError::ExtractionFailed("이미지를 인식할 수 없습니다".to_string())
        );
        let view = orch.view();
        assert!(!view.is_extracting);
        assert_eq!(view.phase, ExtractionPhase::Failed);
        assert_eq!(view.error.as_deref(), Some("이미지를 인식할 수 없습니다"));
        assert_eq!(view.progress, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_distinguishable() {
        let backend = ScriptedBackend::new("abc").then(ExtractionJob::processing(5, "분석중"));
        let orch = ExtractionOrchestrator::new(backend, PollConfig::default());

        let err = orch.extract("17", &image()).await.unwrap_err();

        assert!(matches!(err, ExtractionError::Timeout { .. }));
        assert!(err.is_retryable_by_caller());
        let view = orch.view();
        assert_eq!(view.phase, ExtractionPhase::TimedOut);
        assert_eq!(view.progress, 5);
        assert!(!view.is_extracting);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_failure_never_polls() {
        let backend = ScriptedBackend::new("abc")
            .failing_submit(BackendError::Api {
                status: 413,
                body: "image too large".to_string(),
            })
            .then(ExtractionJob::completed());
        let orch = ExtractionOrchestrator::new(backend, PollConfig::default());

        let err = orch.extract("17", &image()).await.unwrap_err();

        assert!(matches!(err, ExtractionError::Transport(BackendError::Api { status: 413, .. })));
        assert_eq!(orch.backend().check_count(), 0);
        assert_eq!(orch.view().phase, ExtractionPhase::Failed);
        assert_eq!(orch.view().request_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn new_run_resets_previous_error() {
        let backend = ScriptedBackend::new("abc")
            .then_error(BackendError::Http("connection reset".to_string()))
            .then(ExtractionJob::completed());
        let orch = ExtractionOrchestrator::new(backend, PollConfig::default());

        assert!(orch.extract("17", &image()).await.is_err());
        assert!(orch.view().error.is_some());

        orch.extract("17", &image()).await.unwrap();
        assert_eq!(orch.view().error, None);
        assert_eq!(orch.view().phase, ExtractionPhase::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_stops_before_submit() {
        let orch = ExtractionOrchestrator::new(scripted_success(), PollConfig::default());
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = orch
            .extract_with("17", &image(), &NoopObserver, &cancel)
            .await
            .unwrap_err();

        assert_eq!(err, ExtractionError::Cancelled);
        assert!(orch.backend().submissions().is_empty());
        assert_eq!(orch.view().phase, ExtractionPhase::Cancelled);
        assert!(!orch.is_extracting());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_polling() {
        let backend = ScriptedBackend::new("abc").then(ExtractionJob::processing(30, "분석중"));
        let orch = ExtractionOrchestrator::new(backend, PollConfig::default());
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3500)).await;
            trigger.cancel();
        });

        let err = orch
            .extract_with("17", &image(), &NoopObserver, &cancel)
            .await
            .unwrap_err();

        assert_eq!(err, ExtractionError::Cancelled);
        assert_eq!(orch.backend().check_count(), 3);
        let view = orch.view();
        assert_eq!(view.phase, ExtractionPhase::Cancelled);
        assert_eq!(view.progress, 30);
        assert!(!view.is_extracting);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_run_releases_the_flag() {
        let backend = ScriptedBackend::new("abc").then(ExtractionJob::processing(30, "분석중"));
        let orch = ExtractionOrchestrator::new(backend, PollConfig::default());
        let img = image();

        let res = tokio::time::timeout(Duration::from_millis(2500), orch.extract("17", &img)).await;

        assert!(res.is_err());
        let view = orch.view();
        assert!(!view.is_extracting);
        assert_eq!(view.phase, ExtractionPhase::Cancelled);
        assert_eq!(view.progress, 30);

        let checks = orch.backend().check_count();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(orch.backend().check_count(), checks);
    }
}
