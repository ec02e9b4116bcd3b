//! # Pipeline Tests
//!
//! End-to-end tests for the pipeline orchestrator using scripted
//! recognizer and extractor doubles, covering the success path, each
//! failure stage, the no-text policy, and the timing contract.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parcel_ocr::extraction::{ExtractionError, FieldExtractor, RawFields};
use parcel_ocr::localization::create_localization_manager;
use parcel_ocr::normalizer::FieldValue;
use parcel_ocr::ocr_config::{OcrConfig, RecoveryConfig};
use parcel_ocr::pipeline::{FailureKind, Pipeline};
use parcel_ocr::recognizer::{EnginePool, OcrResult, Region, TextFragment, TextRecognizer};
use parcel_ocr::validation::{UploadedImage, ValidatedImage, MAX_UPLOAD_BYTES};

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Recognizer double that returns a fixed script and counts calls
struct ScriptedRecognizer {
    fragments: Vec<TextFragment>,
    fail: bool,
    calls: AtomicUsize,
}

impl ScriptedRecognizer {
    fn returning(fragments: Vec<TextFragment>) -> Arc<Self> {
        Arc::new(Self {
            fragments,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fragments: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(&self, _image: &[u8]) -> anyhow::Result<Vec<TextFragment>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("engine crashed");
        }
        Ok(self.fragments.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Extractor double with a fixed reply and call tracking
struct ScriptedExtractor {
    reply: Result<RawFields, ExtractionError>,
    calls: AtomicUsize,
    saw_empty_ocr: AtomicUsize,
}

impl ScriptedExtractor {
    fn returning(reply: Result<RawFields, ExtractionError>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
            saw_empty_ocr: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FieldExtractor for ScriptedExtractor {
    async fn extract(
        &self,
        ocr: &OcrResult,
        _image: &ValidatedImage,
    ) -> Result<RawFields, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if ocr.is_empty() {
            self.saw_empty_ocr.fetch_add(1, Ordering::SeqCst);
        }
        self.reply.clone()
    }

    fn is_configured(&self) -> bool {
        true
    }
}

fn fragment(text: &str, confidence: f32) -> TextFragment {
    TextFragment {
        text: text.to_string(),
        confidence,
        region: Region::full(800, 600),
    }
}

fn fast_ocr_config() -> OcrConfig {
    OcrConfig {
        recovery: RecoveryConfig {
            max_retries: 1,
            base_retry_delay_ms: 1,
            max_retry_delay_ms: 4,
            operation_timeout_secs: 5,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn build_pipeline(
    recognizer: Arc<ScriptedRecognizer>,
    extractor: Arc<ScriptedExtractor>,
    language: &str,
) -> Pipeline {
    let pool = Arc::new(EnginePool::new(recognizer, 1));
    let localizer = create_localization_manager().expect("localization manager");
    Pipeline::new(pool, extractor, fast_ocr_config(), localizer, language.to_string())
}

fn png_upload(size: usize) -> UploadedImage {
    let mut bytes = PNG_MAGIC.to_vec();
    bytes.resize(size.max(PNG_MAGIC.len()), 0);
    UploadedImage {
        bytes,
        mime_type: "image/png".to_string(),
    }
}

fn label_fragments() -> Vec<TextFragment> {
    vec![
        fragment("ผู้รับ: สมชาย ใจดี", 0.95),
        fragment("ห้อง 304", 0.91),
        fragment("Kerry Express", 0.88),
        fragment("TH1234567890", 0.93),
    ]
}

#[tokio::test]
async fn test_successful_run_returns_all_fields_and_timings() {
    let recognizer = ScriptedRecognizer::returning(label_fragments());
    let extractor = ScriptedExtractor::returning(Ok(RawFields {
        recipient_name: Some("สมชาย ใจดี".to_string()),
        room_number: Some("304".to_string()),
        shipping_company: Some("Kerry Express".to_string()),
        tracking_number: Some("TH1234567890".to_string()),
    }));
    let pipeline = build_pipeline(Arc::clone(&recognizer), Arc::clone(&extractor), "en");

    let outcome = pipeline.process(png_upload(500 * 1024)).await;

    assert!(outcome.failure.is_none());
    let response = outcome.response;
    assert!(response.success);
    assert!(response.error.is_none());

    let data = response.data.expect("success implies data");
    assert_eq!(data.recipient_name, FieldValue::Present("สมชาย ใจดี".into()));
    assert_eq!(data.room_number, FieldValue::Present("304".into()));
    assert_eq!(data.shipping_company, FieldValue::Present("Kerry Express".into()));
    assert_eq!(data.tracking_number, FieldValue::Present("TH1234567890".into()));

    let ocr = response.timings.ocr.expect("ocr timing recorded");
    let extraction = response.timings.extraction.expect("extraction timing recorded");
    let total = response.timings.total.expect("total timing recorded");
    assert!((total - (ocr + extraction)).abs() < 0.25, "total {total} vs stages {ocr}+{extraction}");

    let preview = response.raw_text_preview.expect("preview present");
    assert!(preview.contains("Kerry Express"));

    assert_eq!(recognizer.call_count(), 1);
    assert_eq!(extractor.call_count(), 1);
}

#[tokio::test]
async fn test_engine_failure_aborts_with_no_timings() {
    let recognizer = ScriptedRecognizer::failing();
    let extractor = ScriptedExtractor::returning(Ok(RawFields::default()));
    let pipeline = build_pipeline(Arc::clone(&recognizer), Arc::clone(&extractor), "en");

    let outcome = pipeline.process(png_upload(1024)).await;

    assert_eq!(outcome.failure, Some(FailureKind::Ocr));
    let response = outcome.response;
    assert!(!response.success);
    assert!(response.data.is_none());
    assert!(response.error.is_some());
    assert!(response.timings.ocr.is_none());
    assert!(response.timings.extraction.is_none());
    assert!(response.timings.total.is_none());

    // One retry was configured, so the engine was tried twice and
    // extraction never ran
    assert_eq!(recognizer.call_count(), 2);
    assert_eq!(extractor.call_count(), 0);
}

#[tokio::test]
async fn test_blank_ocr_continues_to_extraction() {
    let recognizer = ScriptedRecognizer::returning(Vec::new());
    let extractor = ScriptedExtractor::returning(Ok(RawFields {
        recipient_name: Some("ไม่พบ".to_string()),
        room_number: None,
        shipping_company: Some("".to_string()),
        tracking_number: Some("ไม่พบข้อมูล".to_string()),
    }));
    let pipeline = build_pipeline(Arc::clone(&recognizer), Arc::clone(&extractor), "en");

    let outcome = pipeline.process(png_upload(1024)).await;

    assert!(outcome.failure.is_none());
    let response = outcome.response;
    assert!(response.success);
    let data = response.data.expect("success implies data");
    assert!(data.all_absent());

    // The OCR stage completed (with nothing to show), so its timing is
    // present, and the extractor saw the empty result
    assert!(response.timings.ocr.is_some());
    assert!(response.timings.total.is_some());
    assert!(response.raw_text_preview.is_none());
    assert_eq!(extractor.saw_empty_ocr.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_low_confidence_fragments_count_as_blank() {
    let recognizer = ScriptedRecognizer::returning(vec![
        fragment("noise", 0.05),
        fragment("more noise", 0.1),
    ]);
    let extractor = ScriptedExtractor::returning(Ok(RawFields::default()));
    let pipeline = build_pipeline(recognizer, Arc::clone(&extractor), "en");

    let outcome = pipeline.process(png_upload(1024)).await;

    assert!(outcome.response.success);
    assert_eq!(extractor.saw_empty_ocr.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_extraction_failure_keeps_ocr_timing_only() {
    let recognizer = ScriptedRecognizer::returning(label_fragments());
    let extractor = ScriptedExtractor::returning(Err(ExtractionError::ServiceUnavailable(
        "connection refused".to_string(),
    )));
    let pipeline = build_pipeline(recognizer, extractor, "en");

    let outcome = pipeline.process(png_upload(1024)).await;

    assert_eq!(outcome.failure, Some(FailureKind::Extraction));
    let response = outcome.response;
    assert!(!response.success);
    assert!(response.data.is_none());
    assert!(response.error.is_some());
    // Partial OCR output is discarded, not returned
    assert!(response.raw_text_preview.is_none());
    assert!(response.timings.ocr.is_some());
    assert!(response.timings.extraction.is_none());
    assert!(response.timings.total.is_none());
}

#[tokio::test]
async fn test_oversized_upload_never_reaches_collaborators() {
    let recognizer = ScriptedRecognizer::returning(label_fragments());
    let extractor = ScriptedExtractor::returning(Ok(RawFields::default()));
    let pipeline = build_pipeline(Arc::clone(&recognizer), Arc::clone(&extractor), "en");

    let outcome = pipeline
        .process(png_upload((MAX_UPLOAD_BYTES + 1024) as usize))
        .await;

    assert_eq!(outcome.failure, Some(FailureKind::Validation));
    let response = outcome.response;
    assert!(!response.success);
    assert!(response.error.is_some());
    assert!(response.timings.is_empty());
    assert_eq!(recognizer.call_count(), 0);
    assert_eq!(extractor.call_count(), 0);
}

#[tokio::test]
async fn test_unsupported_type_rejected_before_ocr() {
    let recognizer = ScriptedRecognizer::returning(label_fragments());
    let extractor = ScriptedExtractor::returning(Ok(RawFields::default()));
    let pipeline = build_pipeline(Arc::clone(&recognizer), Arc::clone(&extractor), "en");

    let outcome = pipeline
        .process(UploadedImage {
            bytes: b"%PDF-1.4 not an image".to_vec(),
            mime_type: "application/pdf".to_string(),
        })
        .await;

    assert_eq!(outcome.failure, Some(FailureKind::Validation));
    assert_eq!(recognizer.call_count(), 0);
}

#[tokio::test]
async fn test_validation_message_uses_display_language() {
    let recognizer = ScriptedRecognizer::returning(label_fragments());
    let extractor = ScriptedExtractor::returning(Ok(RawFields::default()));
    let pipeline = build_pipeline(recognizer, extractor, "th");

    let outcome = pipeline
        .process(UploadedImage {
            bytes: Vec::new(),
            mime_type: "image/png".to_string(),
        })
        .await;

    assert_eq!(outcome.failure, Some(FailureKind::Validation));
    assert_eq!(outcome.response.error.as_deref(), Some("ไฟล์ว่างเปล่า"));
}

#[tokio::test]
async fn test_success_envelope_serializes_to_contract_shape() {
    let recognizer = ScriptedRecognizer::returning(label_fragments());
    let extractor = ScriptedExtractor::returning(Ok(RawFields {
        recipient_name: Some("สมชาย ใจดี".to_string()),
        room_number: Some("ไม่พบ".to_string()),
        shipping_company: Some("Flash Express".to_string()),
        tracking_number: None,
    }));
    let pipeline = build_pipeline(recognizer, extractor, "en");

    let outcome = pipeline.process(png_upload(1024)).await;
    let json = serde_json::to_value(&outcome.response).unwrap();

    assert_eq!(json["success"], serde_json::json!(true));
    assert_eq!(json["data"]["recipient_name"], serde_json::json!("สมชาย ใจดี"));
    assert_eq!(json["data"]["room_number"], serde_json::Value::Null);
    assert_eq!(json["data"]["shipping_company"], serde_json::json!("Flash Express"));
    assert_eq!(json["data"]["tracking_number"], serde_json::Value::Null);
    assert!(json["timings"]["paddle_ocr"].is_number());
    assert!(json["timings"]["typhoon_api"].is_number());
    assert!(json["timings"]["total"].is_number());
    assert!(json.get("error").is_none());
}
