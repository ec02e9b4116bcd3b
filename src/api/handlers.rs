//! API request handlers.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use tracing::warn;

use crate::pipeline::{FailureKind, PipelineResponse, StageTimings};
use crate::validation::UploadedImage;

use super::types::{ApiState, HealthResponse};

/// Process endpoint handler.
///
/// POST /api/process
///
/// Accepts multipart form data with a single `image` field and runs the
/// full pipeline on it. The response body is always the pipeline envelope;
/// the HTTP status reflects where a failed run stopped: 400 for input
/// faults, 503 when the OCR engine is down, 502 when the extraction
/// service failed.
pub async fn process_handler(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> (StatusCode, Json<PipelineResponse>) {
    let mut upload: Option<UploadedImage> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "Failed to read multipart body");
                return error_response(&state, StatusCode::BAD_REQUEST, "error-upload-read");
            }
        };

        if field.name() != Some("image") {
            continue;
        }

        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        match field.bytes().await {
            Ok(bytes) => {
                upload = Some(UploadedImage {
                    bytes: bytes.to_vec(),
                    mime_type,
                });
            }
            Err(err) => {
                warn!(error = %err, "Failed to read image field");
                return error_response(&state, StatusCode::BAD_REQUEST, "error-upload-read");
            }
        }
    }

    let Some(upload) = upload else {
        return error_response(&state, StatusCode::BAD_REQUEST, "error-no-image");
    };

    let outcome = state.pipeline.process(upload).await;
    let status = match outcome.failure {
        None => StatusCode::OK,
        Some(FailureKind::Validation) => StatusCode::BAD_REQUEST,
        Some(FailureKind::Ocr) => StatusCode::SERVICE_UNAVAILABLE,
        Some(FailureKind::Extraction) => StatusCode::BAD_GATEWAY,
    };
    (status, Json(outcome.response))
}

/// Health check endpoint handler.
///
/// GET /health
pub async fn health_handler(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        ocr_ready: state.pipeline.ocr_ready(),
        extractor_configured: state.pipeline.extractor_configured(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn error_response(
    state: &ApiState,
    status: StatusCode,
    message_key: &str,
) -> (StatusCode, Json<PipelineResponse>) {
    (
        status,
        Json(PipelineResponse {
            success: false,
            data: None,
            timings: StageTimings::default(),
            raw_text_preview: None,
            error: Some(state.pipeline.message(message_key)),
        }),
    )
}
