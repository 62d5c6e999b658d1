//! Axum server and routes.

use crate::SimulatedExtractor;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chalpu_types::{ApiEnvelope, ExtractionJob, SubmitResponse};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub struct AppState {
    pub extractor: Arc<SimulatedExtractor>,
}

impl AppState {
    pub fn new(extractor: SimulatedExtractor) -> Self {
        Self {
            extractor: Arc::new(extractor),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/stores/:store_id/menus/extract", post(handle_submit))
        .route("/api/menus/extract/:request_id/status", get(handle_status))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

type Reply<T> = (StatusCode, Json<ApiEnvelope<T>>);

fn reject<T>(status: StatusCode, message: impl Into<String>) -> Reply<T> {
    (
        status,
        Json(ApiEnvelope::error(i32::from(status.as_u16()), message)),
    )
}

async fn handle_submit(
    State(state): State<Arc<AppState>>,
    Path(store_id): Path<String>,
    mut multipart: Multipart,
) -> Reply<SubmitResponse> {
    let mut image_bytes: Option<usize> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("image") {
                    continue;
                }
                match field.bytes().await {
                    Ok(bytes) => image_bytes = Some(bytes.len()),
                    Err(e) => return reject(StatusCode::BAD_REQUEST, e.to_string()),
                }
            }
            Ok(None) => break,
            Err(e) => return reject(StatusCode::BAD_REQUEST, e.to_string()),
        }
    }
    let Some(image_bytes) = image_bytes else {
        return reject(StatusCode::BAD_REQUEST, "image field is required");
    };

    let request_id = state.extractor.submit(&store_id, image_bytes).await;
    tracing::info!(
        store_id = %store_id,
        request_id = %request_id,
        bytes = image_bytes,
        "extraction job accepted"
    );
    (
        StatusCode::OK,
        Json(ApiEnvelope::success(SubmitResponse { request_id })),
    )
}

async fn handle_status(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> Reply<ExtractionJob> {
    match state.extractor.advance(&request_id).await {
        Some(job) => (StatusCode::OK, Json(ApiEnvelope::success(job))),
        None => reject(StatusCode::NOT_FOUND, "Job not found"),
    }
}

async fn handle_health() -> &'static str {
    "ok"
}
