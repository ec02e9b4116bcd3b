//! # Observability Module
//!
//! Centralized setup for logging and metrics:
//! - Structured logging via tracing with configurable level and format
//! - Prometheus metrics export on a dedicated port with liveness probes
//! - Helpers for recording pipeline metrics

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::observability_config::ObservabilityConfig;

/// Initialize the observability stack: tracing first, then the metrics
/// recorder and its export server when enabled.
pub async fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    init_tracing(config)?;

    if config.enable_metrics_export {
        let handle = init_metrics()?;
        start_metrics_server(handle, config.metrics_port).await?;
    }

    tracing::info!(
        environment = %config.environment,
        metrics_enabled = config.enable_metrics_export,
        metrics_port = %config.metrics_port,
        "Observability stack initialized"
    );
    Ok(())
}

/// Initialize the tracing subscriber with env-filter support
fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;
    }
    Ok(())
}

/// Install the Prometheus metrics recorder
fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))
}

/// Start the metrics server, serving /metrics plus liveness and readiness
/// probes on the configured port.
async fn start_metrics_server(metrics_handle: PrometheusHandle, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on {}", addr);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let metrics_handle = metrics_handle.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = hyper::service::service_fn(
                            move |req: hyper::Request<hyper::body::Incoming>| {
                                let metrics_handle = metrics_handle.clone();
                                async move {
                                    match (req.method(), req.uri().path()) {
                                        (&hyper::Method::GET, "/metrics") => {
                                            let metrics = metrics_handle.render();
                                            Ok::<_, std::convert::Infallible>(hyper::Response::new(
                                                metrics,
                                            ))
                                        }
                                        (&hyper::Method::GET, "/health/live") => {
                                            Ok(hyper::Response::new("OK".to_string()))
                                        }
                                        (&hyper::Method::GET, "/health/ready") => {
                                            Ok(hyper::Response::new("OK".to_string()))
                                        }
                                        _ => {
                                            let mut response =
                                                hyper::Response::new("Not Found".to_string());
                                            *response.status_mut() = hyper::StatusCode::NOT_FOUND;
                                            Ok(response)
                                        }
                                    }
                                }
                            },
                        );

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                        {
                            tracing::error!("Error serving metrics connection: {:?}", err);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Error accepting metrics connection: {}", e);
                }
            }
        }
    });

    Ok(())
}

/// Count one finished pipeline run by outcome
pub fn record_pipeline_request(outcome: &'static str) {
    metrics::counter!("parcel_requests_total", "outcome" => outcome).increment(1);
}

/// Record the duration of one OCR stage attempt sequence
pub fn record_ocr_duration(duration: Duration, success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::histogram!("parcel_ocr_duration_seconds", "result" => result)
        .record(duration.as_secs_f64());
}

/// Record the duration of one extraction stage
pub fn record_extraction_duration(duration: Duration, success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::histogram!("parcel_extraction_duration_seconds", "result" => result)
        .record(duration.as_secs_f64());
}

/// Track whether the extraction circuit breaker is open
pub fn update_circuit_breaker_state(open: bool) {
    metrics::gauge!("parcel_extraction_circuit_open").set(if open { 1.0 } else { 0.0 });
}
