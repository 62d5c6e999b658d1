//! HTTP client for the menu-extraction backend.

mod http;
#[cfg(feature = "test-util")]
pub mod mock;

pub use chalpu_types::{BackendError, ExtractionBackend};
pub use http::{HttpExtractionBackend, DEFAULT_API_URL};

#[cfg(feature = "test-util")]
pub use mock::ScriptedBackend;
