//! # Parcel OCR Service
//!
//! An HTTP service that extracts structured recipient data from photographs
//! of Thai parcel labels. Each request runs a linear pipeline: validate the
//! upload, recognize text with the OCR engine, forward the text (and
//! optionally the image) to the Typhoon extraction API, and normalize the
//! result into four canonical fields with per-stage timings.

pub mod api;
pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod extraction;
pub mod localization;
pub mod normalizer;
pub mod observability;
pub mod observability_config;
pub mod ocr;
pub mod ocr_config;
pub mod ocr_errors;
pub mod pipeline;
pub mod recognizer;
pub mod validation;

// Re-export types for easier access
pub use normalizer::{ExtractedFields, FieldValue};
pub use pipeline::{Pipeline, PipelineResponse, StageTimings};
pub use recognizer::{OcrResult, Region, TextFragment, TextRecognizer};
