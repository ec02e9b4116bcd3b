//! # Observability Configuration
//!
//! Settings for logging and metrics export, loaded from the environment.

use std::env;

use crate::errors::{AppError, AppResult};

/// Observability configuration settings
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Deployment environment name, attached to startup logs
    pub environment: String,
    /// Default log filter when RUST_LOG is not set
    pub log_level: String,
    /// Emit logs as JSON instead of human-readable lines
    pub json_logs: bool,
    /// Whether to export Prometheus metrics
    pub enable_metrics_export: bool,
    /// Metrics server port
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            enable_metrics_export: true,
            metrics_port: 9090,
        }
    }
}

impl ObservabilityConfig {
    /// Load observability configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logs: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.json_logs),
            enable_metrics_export: env::var("ENABLE_METRICS")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(defaults.enable_metrics_export),
            metrics_port: env::var("METRICS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.metrics_port),
        }
    }

    /// Validate observability configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.log_level.trim().is_empty() {
            return Err(AppError::Config("log_level cannot be empty".to_string()));
        }
        if self.metrics_port == 0 {
            return Err(AppError::Config(
                "metrics_port must be a valid port number".to_string(),
            ));
        }
        let allow_privileged = env::var("ALLOW_PRIVILEGED_PORTS")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);
        if self.metrics_port < 1024 && !allow_privileged {
            return Err(AppError::Config(format!(
                "Metrics port {} is privileged. Set ALLOW_PRIVILEGED_PORTS=true or use port >= 1024",
                self.metrics_port
            )));
        }
        Ok(())
    }
}
