//! API server setup and configuration.

use std::net::SocketAddr;

use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;

use super::handlers::{health_handler, process_handler};
use super::types::ApiState;

/// Create the API router with all routes configured.
///
/// The body limit is intentionally larger than the 16 MiB upload cap so
/// oversized uploads reach the validator and come back as the pipeline's
/// own size-limit error instead of a bare 413.
pub fn create_router(state: ApiState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/process", post(process_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS defaults to permissive for development; production deployments set
/// PARCEL_CORS_ORIGINS to a comma-separated list of allowed origins.
fn cors_layer() -> CorsLayer {
    if let Ok(origins_str) = std::env::var("PARCEL_CORS_ORIGINS") {
        let origins: Vec<_> = origins_str
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
            .collect();

        if !origins.is_empty() {
            tracing::info!("CORS configured with {} explicit allowed origin(s)", origins.len());
            return CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any);
        }
        tracing::warn!("PARCEL_CORS_ORIGINS set but empty/invalid, falling back to permissive CORS");
    }
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the API server and block until it exits.
pub async fn serve(config: &ServerConfig, state: ApiState) -> Result<()> {
    let ip: std::net::IpAddr = config
        .host
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid host address '{}': {}", config.host, e))?;
    let addr = SocketAddr::new(ip, config.port);
    let app = create_router(state, config.max_body_bytes);

    tracing::info!("Starting parcel OCR API server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
