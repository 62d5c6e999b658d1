//! Error taxonomy for submit + poll.

use chalpu_types::BackendError;
use std::time::Duration;

/// Why an extraction did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("extraction timed out after {}ms", .elapsed.as_millis())]
    Timeout { elapsed: Duration },
    /// Backend reported `FAILED`; displays the backend's message verbatim.
    #[error("{0}")]
    ExtractionFailed(String),
    #[error("transport: {0}")]
    Transport(#[from] BackendError),
    #[error("an extraction is already in progress")]
    ConcurrentExtraction,
    #[error("extraction cancelled")]
    Cancelled,
}

impl ExtractionError {
    /// Outcomes where resubmitting later may succeed.
    pub fn is_retryable_by_caller(&self) -> bool {
        matches!(
            self,
            ExtractionError::Timeout { .. } | ExtractionError::Transport(_)
        )
    }
}
