//! Traits for the extraction backend and progress reporting.

use crate::{ExtractionJob, ImageUpload, SubmitResponse};
use async_trait::async_trait;

/// Remote service that runs menu extraction jobs.
///
/// Contract: `check_status` for an id returned by `submit_job` eventually reports a
/// terminal status. Unknown ids are reported as `BackendError::NotFound`.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Submit a menu image for a store (collection); returns the request id.
    async fn submit_job(
        &self,
        collection_id: &str,
        image: &ImageUpload,
    ) -> Result<SubmitResponse, BackendError>;

    /// Fetch the current status of a submitted job.
    async fn check_status(&self, request_id: &str) -> Result<ExtractionJob, BackendError>;
}

#[async_trait]
impl<B: ExtractionBackend + ?Sized> ExtractionBackend for std::sync::Arc<B> {
    async fn submit_job(
        &self,
        collection_id: &str,
        image: &ImageUpload,
    ) -> Result<SubmitResponse, BackendError> {
        (**self).submit_job(collection_id, image).await
    }

    async fn check_status(&self, request_id: &str) -> Result<ExtractionJob, BackendError> {
        (**self).check_status(request_id).await
    }
}

/// Receives progress snapshots while a job is polled.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, percentage: u8, step: &str);
}

impl<F> ProgressObserver for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn on_progress(&self, percentage: u8, step: &str) {
        self(percentage, step)
    }
}

/// Observer that discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, _percentage: u8, _step: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("http error: {0}")]
    Http(String),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("request not found: {0}")]
    NotFound(String),
    #[error("backend error: {0}")]
    Other(String),
}
