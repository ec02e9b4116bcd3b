use std::sync::Arc;

use anyhow::Result;
use parcel_ocr::api::{self, ApiState};
use parcel_ocr::config::AppConfig;
use parcel_ocr::extraction::TyphoonClient;
use parcel_ocr::localization;
use parcel_ocr::observability;
use parcel_ocr::pipeline::Pipeline;
use parcel_ocr::recognizer::{EnginePool, TextRecognizer};
use tracing::{info, warn};

#[cfg(feature = "tesseract")]
fn build_recognizer(config: &parcel_ocr::ocr_config::OcrConfig) -> Result<Arc<dyn TextRecognizer>> {
    let engine = parcel_ocr::recognizer::TesseractRecognizer::new(&config.languages)?;
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "tesseract"))]
fn build_recognizer(
    _config: &parcel_ocr::ocr_config::OcrConfig,
) -> Result<Arc<dyn TextRecognizer>> {
    Err(anyhow::anyhow!(
        "Built without the `tesseract` feature; no OCR engine is available"
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    observability::init_observability(&config.observability).await?;
    info!("{}", config.summary());

    // Initialize localization for user-facing pipeline messages
    let localizer = localization::create_localization_manager()?;
    if !localizer.is_language_supported(&config.display_language) {
        warn!(
            language = %config.display_language,
            "DISPLAY_LANGUAGE is not a shipped locale, falling back to English"
        );
    }

    // The OCR engine is constructed once here and shared by every request
    let engine = build_recognizer(&config.ocr)?;
    let engine_pool = Arc::new(EnginePool::new(engine, config.ocr.engine_concurrency));

    let extractor = Arc::new(TyphoonClient::new(config.extraction.clone())?);
    if !config.extraction.is_configured() {
        warn!("TYPHOON_API_KEY not set; extraction requests will fail until it is configured");
    }

    let pipeline = Arc::new(Pipeline::new(
        engine_pool,
        extractor,
        config.ocr.clone(),
        localizer,
        config.display_language.clone(),
    ));

    info!(
        ocr_engine = %pipeline.ocr_ready(),
        extractor_configured = %pipeline.extractor_configured(),
        "Parcel OCR service starting"
    );

    api::serve(&config.server, ApiState { pipeline }).await
}
