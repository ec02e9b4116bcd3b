//! # Pipeline Orchestrator Module
//!
//! Sequences one complete run for an uploaded image:
//! validate -> recognize -> extract -> normalize, measuring each stage and
//! building the outward response envelope. Every failure is converted into
//! a response with a localized message; internal error detail stays in the
//! logs.
//!
//! Timing semantics: a stage's duration is recorded only when the stage
//! completes. A stage that fails mid-flight or never ran is omitted from
//! the timings, so callers can tell "fast" from "skipped". The total is
//! recorded only on full success.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use crate::extraction::{ExtractionError, FieldExtractor};
use crate::localization::{t_args_lang, t_lang, LocalizationManager};
use crate::normalizer::{self, ExtractedFields};
use crate::observability;
use crate::ocr;
use crate::ocr_config::OcrConfig;
use crate::ocr_errors::OcrError;
use crate::recognizer::{EnginePool, OcrResult};
use crate::validation::{self, UploadedImage};

/// Characters of OCR text echoed back in the success payload
const RAW_TEXT_PREVIEW_CHARS: usize = 200;

/// Durations of the stages that completed, in seconds
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageTimings {
    #[serde(rename = "paddle_ocr", skip_serializing_if = "Option::is_none")]
    pub ocr: Option<f64>,
    #[serde(rename = "typhoon_api", skip_serializing_if = "Option::is_none")]
    pub extraction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

impl StageTimings {
    pub fn is_empty(&self) -> bool {
        self.ocr.is_none() && self.extraction.is_none() && self.total.is_none()
    }
}

/// The outward response contract for one pipeline run.
///
/// Invariant: `success == true` implies `data` is present and `error` is
/// absent; `success == false` implies the reverse.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ExtractedFields>,
    #[serde(skip_serializing_if = "StageTimings::is_empty")]
    pub timings: StageTimings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Which stage a failed run stopped in, for HTTP status selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    Ocr,
    Extraction,
}

/// A finished pipeline run: the response plus failure classification
#[derive(Debug)]
pub struct PipelineOutcome {
    pub response: PipelineResponse,
    pub failure: Option<FailureKind>,
}

impl PipelineOutcome {
    fn success(fields: ExtractedFields, timings: StageTimings, preview: Option<String>) -> Self {
        Self {
            response: PipelineResponse {
                success: true,
                data: Some(fields),
                timings,
                raw_text_preview: preview,
                error: None,
            },
            failure: None,
        }
    }

    fn failure(kind: FailureKind, message: String, timings: StageTimings) -> Self {
        Self {
            response: PipelineResponse {
                success: false,
                data: None,
                timings,
                raw_text_preview: None,
                error: Some(message),
            },
            failure: Some(kind),
        }
    }
}

/// Per-request orchestrator over the OCR engine and extraction service.
///
/// Stateless across requests: every run owns its data exclusively and
/// shares only the injected engine pool, extractor, and message catalog.
pub struct Pipeline {
    engine: Arc<EnginePool>,
    extractor: Arc<dyn FieldExtractor>,
    ocr_config: OcrConfig,
    localizer: Arc<LocalizationManager>,
    display_language: String,
}

impl Pipeline {
    pub fn new(
        engine: Arc<EnginePool>,
        extractor: Arc<dyn FieldExtractor>,
        ocr_config: OcrConfig,
        localizer: Arc<LocalizationManager>,
        display_language: String,
    ) -> Self {
        Self {
            engine,
            extractor,
            ocr_config,
            localizer,
            display_language,
        }
    }

    /// Whether the OCR engine was loaded, for the health endpoint
    pub fn ocr_ready(&self) -> bool {
        // The pool only exists around a constructed engine
        !self.engine.engine_name().is_empty()
    }

    /// Whether the extraction service credential is present
    pub fn extractor_configured(&self) -> bool {
        self.extractor.is_configured()
    }

    /// Localized user-facing message for the given key
    pub fn message(&self, key: &str) -> String {
        t_lang(&self.localizer, key, Some(&self.display_language))
    }

    /// Run the full pipeline for one uploaded image.
    pub async fn process(&self, upload: UploadedImage) -> PipelineOutcome {
        let total_start = Instant::now();
        let mut timings = StageTimings::default();

        // Validating
        let image = match validation::validate(upload) {
            Ok(image) => image,
            Err(err) => {
                observability::record_pipeline_request("validation_failed");
                let args = err.message_args();
                let arg_refs: Vec<(&str, &str)> =
                    args.iter().map(|(k, v)| (*k, v.as_str())).collect();
                let message = t_args_lang(
                    &self.localizer,
                    err.message_key(),
                    &arg_refs,
                    Some(&self.display_language),
                );
                return PipelineOutcome::failure(FailureKind::Validation, message, timings);
            }
        };

        info!(
            size_bytes = image.len(),
            format = ?image.format,
            "Processing parcel image"
        );

        // Recognizing
        let ocr_start = Instant::now();
        let ocr_result = match ocr::recognize_image(&self.engine, &image, &self.ocr_config)
            .instrument(info_span!("ocr_stage"))
            .await
        {
            Ok(result) => {
                timings.ocr = Some(round_secs(ocr_start.elapsed()));
                result
            }
            // The engine ran fine but saw no text: continue with an empty
            // result so the extraction service (which also receives the
            // image) can still report per-field absence.
            Err(OcrError::NoTextFound) => {
                timings.ocr = Some(round_secs(ocr_start.elapsed()));
                warn!("No text detected in image, continuing to extraction");
                OcrResult::empty()
            }
            Err(err @ OcrError::EngineUnavailable(_)) => {
                observability::record_pipeline_request("ocr_failed");
                warn!(error = %err, "Pipeline aborted in OCR stage");
                let message = self.message("error-ocr-unavailable");
                return PipelineOutcome::failure(FailureKind::Ocr, message, timings);
            }
        };

        // Extracting
        let extraction_start = Instant::now();
        let raw_fields = match self
            .extractor
            .extract(&ocr_result, &image)
            .instrument(info_span!("extraction_stage"))
            .await
        {
            Ok(fields) => {
                let elapsed = extraction_start.elapsed();
                timings.extraction = Some(round_secs(elapsed));
                observability::record_extraction_duration(elapsed, true);
                fields
            }
            Err(err) => {
                observability::record_pipeline_request("extraction_failed");
                observability::record_extraction_duration(extraction_start.elapsed(), false);
                warn!(error = %err, "Pipeline aborted in extraction stage");
                let message = self.extraction_message(&err);
                return PipelineOutcome::failure(FailureKind::Extraction, message, timings);
            }
        };

        // Normalizing
        let fields = normalizer::normalize(raw_fields);
        timings.total = Some(round_secs(total_start.elapsed()));
        observability::record_pipeline_request("success");

        info!(
            all_absent = fields.all_absent(),
            total_secs = ?timings.total,
            "Pipeline run completed"
        );

        let preview = if ocr_result.is_empty() {
            None
        } else {
            Some(ocr_result.preview(RAW_TEXT_PREVIEW_CHARS))
        };
        PipelineOutcome::success(fields, timings, preview)
    }

    fn extraction_message(&self, err: &ExtractionError) -> String {
        self.message(err.message_key())
    }
}

/// Round a duration to whole milliseconds, expressed in seconds
fn round_secs(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_secs_keeps_millisecond_precision() {
        assert_eq!(round_secs(Duration::from_millis(1234)), 1.234);
        assert_eq!(round_secs(Duration::from_micros(1500)), 0.002);
        assert_eq!(round_secs(Duration::ZERO), 0.0);
    }

    #[test]
    fn test_empty_timings_are_skipped_in_json() {
        let response = PipelineResponse {
            success: false,
            data: None,
            timings: StageTimings::default(),
            raw_text_preview: None,
            error: Some("boom".to_string()),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("timings").is_none());
        assert!(json.get("data").is_none());
        assert_eq!(json["success"], serde_json::json!(false));
    }

    #[test]
    fn test_timings_serialize_with_contract_names() {
        let timings = StageTimings {
            ocr: Some(0.42),
            extraction: Some(1.2),
            total: Some(1.62),
        };
        let json = serde_json::to_value(&timings).unwrap();
        assert_eq!(json["paddle_ocr"], serde_json::json!(0.42));
        assert_eq!(json["typhoon_api"], serde_json::json!(1.2));
        assert_eq!(json["total"], serde_json::json!(1.62));
    }

    #[test]
    fn test_partial_timings_omit_missing_stages() {
        let timings = StageTimings {
            ocr: Some(0.5),
            extraction: None,
            total: None,
        };
        let json = serde_json::to_value(&timings).unwrap();
        assert_eq!(json["paddle_ocr"], serde_json::json!(0.5));
        assert!(json.get("typhoon_api").is_none());
        assert!(json.get("total").is_none());
    }
}
