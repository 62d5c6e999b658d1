//! Request and response DTOs for the menu-extraction endpoints.

use serde::{Deserialize, Serialize};

/// Remote job state. Owned by the backend; clients only observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExtractionStatus {
    Processing,
    Completed,
    Failed,
}

impl ExtractionStatus {
    /// `Completed` and `Failed` never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, ExtractionStatus::Completed | ExtractionStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionStatus::Processing => "PROCESSING",
            ExtractionStatus::Completed => "COMPLETED",
            ExtractionStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a remote extraction job as returned by the status endpoint.
///
/// The status endpoint does not always echo `requestId`; callers that know the id
/// should fill it in with [`ExtractionJob::with_request_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionJob {
    #[serde(default)]
    pub request_id: String,
    pub status: ExtractionStatus,
    #[serde(default)]
    pub progress_percentage: u8,
    #[serde(default)]
    pub current_step: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExtractionJob {
    pub fn processing(progress_percentage: u8, current_step: impl Into<String>) -> Self {
        Self {
            request_id: String::new(),
            status: ExtractionStatus::Processing,
            progress_percentage,
            current_step: current_step.into(),
            error_message: None,
        }
    }

    pub fn completed() -> Self {
        Self {
            request_id: String::new(),
            status: ExtractionStatus::Completed,
            progress_percentage: 100,
            current_step: String::new(),
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            request_id: String::new(),
            status: ExtractionStatus::Failed,
            progress_percentage: 0,
            current_step: String::new(),
            error_message: Some(error_message.into()),
        }
    }

    /// Sets `request_id` when the backend left it empty.
    pub fn with_request_id(mut self, request_id: &str) -> Self {
        if self.request_id.is_empty() {
            self.request_id = request_id.to_string();
        }
        self
    }

    /// Progress clamped into 0..=100.
    pub fn progress(&self) -> u8 {
        self.progress_percentage.min(100)
    }
}

/// Response of the submit endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub request_id: String,
}

/// Response envelope used by the backend (`code`, `message`, `data`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default = "default_code")]
    pub code: i32,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

fn default_code() -> i32 {
    200
}

impl<T> ApiEnvelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            message: "Success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// Menu photo uploaded with a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// JPEG upload named `menu.jpg`.
    pub fn jpeg(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new("menu.jpg", "image/jpeg", bytes)
    }
}
