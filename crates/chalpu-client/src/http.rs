//! HTTP client for the extraction endpoints.

use chalpu_types::{
    ApiEnvelope, BackendError, ExtractionBackend, ExtractionJob, ImageUpload, SubmitResponse,
};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

/// Backend that talks to the Chalpu API over HTTP.
///
/// Submit: `POST {base}/api/stores/{collection_id}/menus/extract` (multipart field `image`).
/// Status: `GET {base}/api/menus/extract/{request_id}/status`.
/// Both accept either a bare JSON payload or a `{code, message, data}` envelope.
pub struct HttpExtractionBackend {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpExtractionBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BackendError::Other(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            api_token,
        })
    }

    /// Reads `CHALPU_API_URL`, `CHALPU_API_TOKEN` and `CHALPU_HTTP_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, BackendError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a caller-supplied lookup.
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self, BackendError> {
        let url = get("CHALPU_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_token = get("CHALPU_API_TOKEN").filter(|t| !t.is_empty());
        let timeout_ms = get("CHALPU_HTTP_TIMEOUT_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_MS);
        Self::new(url, api_token, Duration::from_millis(timeout_ms))
    }

    pub fn has_api_token(&self) -> bool {
        self.api_token.is_some()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn submit_url(&self, collection_id: &str) -> String {
        format!("{}/api/stores/{}/menus/extract", self.base_url, collection_id)
    }

    fn status_url(&self, request_id: &str) -> String {
        format!("{}/api/menus/extract/{}/status", self.base_url, request_id)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<String, BackendError> {
        let req = match self.api_token {
            Some(ref token) => req.bearer_auth(token),
            None => req,
        };
        let res = req
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(BackendError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl ExtractionBackend for HttpExtractionBackend {
    async fn submit_job(
        &self,
        collection_id: &str,
        image: &ImageUpload,
    ) -> Result<SubmitResponse, BackendError> {
        let part = reqwest::multipart::Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.content_type)
            .map_err(|e| BackendError::Other(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("image", part);
        tracing::debug!(
            collection_id = %collection_id,
            bytes = image.bytes.len(),
            "submitting menu extraction"
        );
        let body = self
            .send(self.client.post(self.submit_url(collection_id)).multipart(form))
            .await?;
        decode_payload(&body)
    }

    async fn check_status(&self, request_id: &str) -> Result<ExtractionJob, BackendError> {
        let job = self
            .send(self.client.get(self.status_url(request_id)))
            .await
            .and_then(|b| decode_payload::<ExtractionJob>(&b))
            .map_err(|e| match e {
                BackendError::Api { status: 404, .. } => {
                    BackendError::NotFound(request_id.to_string())
                }
                other => other,
            })?;
        Ok(job.with_request_id(request_id))
    }
}

/// Decode a bare payload or unwrap a `{code, message, data}` envelope.
pub(crate) fn decode_payload<T: DeserializeOwned>(body: &str) -> Result<T, BackendError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))?;
    let is_envelope = value
        .as_object()
        .map(|o| o.contains_key("data") || (o.contains_key("code") && o.contains_key("message")))
        .unwrap_or(false);
    if !is_envelope {
        return serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()));
    }
    let envelope: ApiEnvelope<T> =
        serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))?;
    if !envelope.is_success() {
        return Err(BackendError::Api {
            status: u16::try_from(envelope.code).unwrap_or(500),
            body: envelope.message,
        });
    }
    envelope
        .data
        .ok_or_else(|| BackendError::Decode("envelope without data".to_string()))
}
