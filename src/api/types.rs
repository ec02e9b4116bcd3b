//! API state and response types.

use std::sync::Arc;

use serde::Serialize;

use crate::pipeline::Pipeline;

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<Pipeline>,
}

/// Body of the `GET /health` endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub ocr_ready: bool,
    pub extractor_configured: bool,
    pub version: String,
}
