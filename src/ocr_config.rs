//! # OCR Configuration Module
//!
//! This module defines configuration structures for OCR processing,
//! including recovery settings and engine parameters.

// Constants for OCR configuration
pub const DEFAULT_LANGUAGES: &str = "tha+eng";
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.3;
pub const DEFAULT_ENGINE_CONCURRENCY: usize = 2;

/// Recovery configuration for error handling
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Timeout for a single operation in seconds
    pub operation_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_retry_delay_ms: 500,
            max_retry_delay_ms: 5000,
            operation_timeout_secs: 30,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60,
        }
    }
}

impl RecoveryConfig {
    /// Validate recovery configuration parameters
    pub fn validate(&self) -> crate::errors::AppResult<()> {
        if self.base_retry_delay_ms == 0 {
            return Err(crate::errors::AppError::Config(
                "base_retry_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_retry_delay_ms < self.base_retry_delay_ms {
            return Err(crate::errors::AppError::Config(format!(
                "max_retry_delay_ms ({}) must be >= base_retry_delay_ms ({})",
                self.max_retry_delay_ms, self.base_retry_delay_ms
            )));
        }
        if self.operation_timeout_secs == 0 {
            return Err(crate::errors::AppError::Config(
                "operation_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(crate::errors::AppError::Config(
                "circuit_breaker_threshold must be greater than 0".to_string(),
            ));
        }
        if self.circuit_breaker_reset_secs == 0 {
            return Err(crate::errors::AppError::Config(
                "circuit_breaker_reset_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration structure for OCR processing
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// OCR language codes (e.g., "tha", "tha+eng")
    pub languages: String,
    /// Fragments below this confidence are dropped from the result
    pub min_confidence: f32,
    /// How many pipeline runs may invoke the engine concurrently
    pub engine_concurrency: usize,
    /// Recovery and error handling configuration
    pub recovery: RecoveryConfig,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: DEFAULT_LANGUAGES.to_string(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            engine_concurrency: DEFAULT_ENGINE_CONCURRENCY,
            recovery: RecoveryConfig::default(),
        }
    }
}

impl OcrConfig {
    /// Validate OCR configuration parameters
    pub fn validate(&self) -> crate::errors::AppResult<()> {
        if self.languages.trim().is_empty() {
            return Err(crate::errors::AppError::Config(
                "languages cannot be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(crate::errors::AppError::Config(format!(
                "min_confidence must be between 0.0 and 1.0 (got {})",
                self.min_confidence
            )));
        }
        if self.engine_concurrency == 0 {
            return Err(crate::errors::AppError::Config(
                "engine_concurrency must be greater than 0".to_string(),
            ));
        }
        self.recovery.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ocr_config_defaults() {
        let config = OcrConfig::default();

        assert_eq!(config.languages, "tha+eng");
        assert_eq!(config.min_confidence, 0.3);
        assert_eq!(config.engine_concurrency, 2);
        assert!(config.recovery.operation_timeout_secs > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_recovery_config_validation() {
        let mut config = RecoveryConfig::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        // Zero retries are allowed (baseline design has none)
        config.max_retries = 0;
        assert!(config.validate().is_ok());

        config.base_retry_delay_ms = 0;
        assert!(config.validate().is_err());
        config.base_retry_delay_ms = 500;

        config.max_retry_delay_ms = 100;
        assert!(config.validate().is_err());
        config.max_retry_delay_ms = 5000;

        config.operation_timeout_secs = 0;
        assert!(config.validate().is_err());
        config.operation_timeout_secs = 30;

        config.circuit_breaker_threshold = 0;
        assert!(config.validate().is_err());
        config.circuit_breaker_threshold = 5;

        config.circuit_breaker_reset_secs = 0;
        assert!(config.validate().is_err());
        config.circuit_breaker_reset_secs = 60;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ocr_config_rejects_bad_confidence() {
        let config = OcrConfig {
            min_confidence: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = OcrConfig {
            min_confidence: -0.1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ocr_config_rejects_zero_concurrency() {
        let config = OcrConfig {
            engine_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
