//! # OCR Adapter Module
//!
//! Marshals a validated image into the recognition engine and maps the
//! engine output into [`OcrResult`]. The adapter owns the per-call
//! hardening around the engine: operation timeout, bounded retry with
//! exponential backoff and jitter, and confidence filtering.
//!
//! Engine initialization happens once at startup; this module only works
//! with an injected, ready [`EnginePool`].

use tracing::{info, warn};

use crate::errors::error_logging;
use crate::observability;
use crate::ocr_config::{OcrConfig, RecoveryConfig};
use crate::ocr_errors::OcrError;
use crate::recognizer::{EnginePool, OcrResult, TextFragment};
use crate::validation::ValidatedImage;

/// Recognize text in a validated image.
///
/// Runs the engine through the pool with a timeout of
/// `config.recovery.operation_timeout_secs` per attempt and up to
/// `config.recovery.max_retries` retries on engine failure. Fragments
/// below `config.min_confidence` are dropped.
///
/// # Errors
///
/// - `EngineUnavailable` when every attempt failed or timed out
/// - `NoTextFound` when the engine ran but no fragment survived filtering
pub async fn recognize_image(
    pool: &EnginePool,
    image: &ValidatedImage,
    config: &OcrConfig,
) -> Result<OcrResult, OcrError> {
    let start_time = std::time::Instant::now();
    let timeout = tokio::time::Duration::from_secs(config.recovery.operation_timeout_secs);

    let mut attempt = 0;
    let max_attempts = config.recovery.max_retries + 1;

    loop {
        attempt += 1;

        let outcome = tokio::time::timeout(timeout, pool.recognize(image.bytes.clone())).await;

        match outcome {
            Ok(Ok(fragments)) => {
                let kept = filter_fragments(fragments, config.min_confidence);
                let duration = start_time.elapsed();
                observability::record_ocr_duration(duration, true);

                if kept.is_empty() {
                    info!(
                        attempt,
                        duration_ms = duration.as_millis() as u64,
                        "OCR completed but produced no usable text"
                    );
                    return Err(OcrError::NoTextFound);
                }

                info!(
                    attempt,
                    fragments = kept.len(),
                    duration_ms = duration.as_millis() as u64,
                    "OCR extraction completed successfully"
                );
                return Ok(OcrResult { fragments: kept });
            }
            Ok(Err(err)) => {
                if attempt >= max_attempts {
                    let duration = start_time.elapsed();
                    observability::record_ocr_duration(duration, false);
                    error_logging::log_ocr_error(
                        &err,
                        "ocr_recognize",
                        Some(image.len() as u64),
                        Some(duration),
                    );
                    return Err(OcrError::EngineUnavailable(err.to_string()));
                }
                let delay_ms = calculate_retry_delay(attempt, &config.recovery);
                warn!(attempt, delay_ms, error = %err, "OCR attempt failed, retrying");
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
            }
            Err(_) => {
                if attempt >= max_attempts {
                    let duration = start_time.elapsed();
                    observability::record_ocr_duration(duration, false);
                    let err = OcrError::EngineUnavailable(format!(
                        "OCR operation timed out after {} seconds",
                        config.recovery.operation_timeout_secs
                    ));
                    error_logging::log_ocr_error(
                        &err,
                        "ocr_recognize",
                        Some(image.len() as u64),
                        Some(duration),
                    );
                    return Err(err);
                }
                let delay_ms = calculate_retry_delay(attempt, &config.recovery);
                warn!(attempt, delay_ms, "OCR attempt timed out, retrying");
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// Drop fragments below the confidence floor, preserving order
fn filter_fragments(fragments: Vec<TextFragment>, min_confidence: f32) -> Vec<TextFragment> {
    fragments
        .into_iter()
        .filter(|f| f.confidence >= min_confidence)
        .collect()
}

/// Calculate retry delay with exponential backoff and jitter.
///
/// `delay = min(base * 2^(attempt-1), max) + random(0, delay/4)`. The
/// jitter spreads out concurrent retries instead of synchronizing them.
pub fn calculate_retry_delay(attempt: u32, recovery: &RecoveryConfig) -> u64 {
    #[allow(clippy::cast_precision_loss)]
    let base_delay = recovery.base_retry_delay_ms as f64;

    let exponential_delay = base_delay * (2.0_f64).powf(f64::from(attempt.saturating_sub(1)));

    #[allow(clippy::cast_precision_loss)]
    let delay = exponential_delay.min(recovery.max_retry_delay_ms as f64) as u64;

    let jitter = if delay >= 4 {
        rand::random::<u64>() % (delay / 4)
    } else {
        0
    };
    delay + jitter
}
