//! # OCR Error Types Module
//!
//! This module defines the error types produced by the OCR adapter.

/// Custom error types for OCR operations
#[derive(Debug, Clone)]
pub enum OcrError {
    /// The engine failed to initialize, crashed, or timed out
    EngineUnavailable(String),
    /// The engine ran but produced zero usable text fragments
    NoTextFound,
}

impl std::fmt::Display for OcrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OcrError::EngineUnavailable(msg) => {
                write!(f, "[OCR_ENGINE] OCR engine unavailable: {}", msg)
            }
            OcrError::NoTextFound => {
                write!(f, "[OCR_EMPTY] No text detected in image")
            }
        }
    }
}

impl std::error::Error for OcrError {}
