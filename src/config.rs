//! # Unified Application Configuration
//!
//! Centralized configuration for the parcel OCR service, loaded from
//! environment variables with validation and a redacted summary for
//! startup logs.

use std::env;

use crate::errors::{AppError, AppResult};
use crate::extraction::ExtractionConfig;
use crate::observability_config::ObservabilityConfig;
use crate::ocr_config::OcrConfig;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind (e.g. "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// API server port
    pub port: u16,
    /// Request body cap enforced at the HTTP layer; kept above the 16 MiB
    /// upload limit so the validator produces the user-facing size error
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_body_bytes: 100 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::Config("Server host cannot be empty".to_string()));
        }
        if self.port == 0 {
            return Err(AppError::Config(
                "Server port must be a valid port number".to_string(),
            ));
        }
        let allow_privileged = env::var("ALLOW_PRIVILEGED_PORTS")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);
        if self.port < 1024 && !allow_privileged {
            return Err(AppError::Config(format!(
                "Server port {} is privileged. Set ALLOW_PRIVILEGED_PORTS=true or use port >= 1024",
                self.port
            )));
        }
        if self.max_body_bytes < crate::validation::MAX_UPLOAD_BYTES as usize {
            return Err(AppError::Config(format!(
                "max_body_bytes ({}) must be at least the upload limit ({})",
                self.max_body_bytes,
                crate::validation::MAX_UPLOAD_BYTES
            )));
        }
        Ok(())
    }
}

/// Unified application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// OCR processing configuration
    pub ocr: OcrConfig,
    /// Extraction service configuration
    pub extraction: ExtractionConfig,
    /// Observability configuration
    pub observability: ObservabilityConfig,
    /// Language for user-facing pipeline messages
    pub display_language: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            ocr: OcrConfig::default(),
            extraction: ExtractionConfig::default(),
            observability: ObservabilityConfig::default(),
            display_language: "th".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// A missing TYPHOON_API_KEY is not an error here: the service starts,
    /// reports `extractor_configured: false` on /health, and extraction
    /// requests fail with an authentication error.
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        // Server configuration
        config.server.host = env::var("SERVER_HOST").unwrap_or(config.server.host);
        config.server.port = parse_env("SERVER_PORT", config.server.port)?;
        config.server.max_body_bytes =
            parse_env("MAX_REQUEST_BODY_BYTES", config.server.max_body_bytes)?;

        // OCR configuration
        config.ocr.languages = env::var("OCR_LANGUAGES").unwrap_or(config.ocr.languages);
        config.ocr.min_confidence = parse_env("OCR_MIN_CONFIDENCE", config.ocr.min_confidence)?;
        config.ocr.engine_concurrency =
            parse_env("OCR_ENGINE_CONCURRENCY", config.ocr.engine_concurrency)?;
        config.ocr.recovery.max_retries =
            parse_env("OCR_MAX_RETRIES", config.ocr.recovery.max_retries)?;
        config.ocr.recovery.operation_timeout_secs = parse_env(
            "OCR_OPERATION_TIMEOUT_SECS",
            config.ocr.recovery.operation_timeout_secs,
        )?;

        // Extraction service configuration
        config.extraction.api_key = env::var("TYPHOON_API_KEY").unwrap_or_default();
        config.extraction.api_url = env::var("TYPHOON_API_URL").unwrap_or(config.extraction.api_url);
        config.extraction.model = env::var("TYPHOON_MODEL").unwrap_or(config.extraction.model);
        config.extraction.request_timeout_secs = parse_env(
            "EXTRACTION_TIMEOUT_SECS",
            config.extraction.request_timeout_secs,
        )?;
        config.extraction.send_image = env::var("EXTRACTION_SEND_IMAGE")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(config.extraction.send_image);
        config.extraction.recovery.max_retries = parse_env(
            "EXTRACTION_MAX_RETRIES",
            config.extraction.recovery.max_retries,
        )?;

        // Display language for user-facing messages
        config.display_language =
            env::var("DISPLAY_LANGUAGE").unwrap_or(config.display_language);

        // Observability configuration
        config.observability = ObservabilityConfig::from_env();

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.server.validate()?;
        self.ocr.validate()?;
        self.extraction.validate()?;
        self.observability.validate()?;
        if self.display_language.trim().is_empty() {
            return Err(AppError::Config(
                "display_language cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: api_key=[REDACTED], server={}:{}, ocr_languages={}, extraction_model={}, display_language={}, metrics_port={}",
            self.server.host,
            self.server.port,
            self.ocr.languages,
            self.extraction.model,
            self.display_language,
            self.observability.metrics_port
        )
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> AppResult<T> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| AppError::Config(format!("{} must be a valid number", key))),
        Err(_) => Ok(default),
    }
}
