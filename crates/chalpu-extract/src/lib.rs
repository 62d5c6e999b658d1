//! Menu extraction core: submit an image, then poll the job until it settles.
//!
//! [`poll_until_terminal`] drives a single job to a terminal state under a deadline.
//! [`ExtractionOrchestrator`] wraps submit + poll for one store and owns the view state
//! a UI renders (progress, current step, error).

mod cancel;
mod config;
mod error;
mod orchestrator;
mod poller;

pub use cancel::CancelToken;
pub use chalpu_types::{
    BackendError, ExtractionBackend, ExtractionJob, ExtractionStatus, ImageUpload,
    NoopObserver, ProgressObserver,
};
pub use config::PollConfig;
pub use error::ExtractionError;
pub use orchestrator::{ExtractionOrchestrator, ExtractionPhase, ExtractionView, DONE_STEP};
pub use poller::poll_until_terminal;
