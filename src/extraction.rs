//! # Extraction Adapter Module
//!
//! Talks to the hosted Typhoon chat-completions API: builds the Thai
//! extraction prompt from the OCR text, optionally attaches the original
//! image as a data URI, and maps the model's JSON reply into [`RawFields`].
//!
//! The adapter tolerates whatever shape the service returns: extraneous
//! keys are ignored, nulls and numbers are accepted, and sentinel strings
//! pass through untouched for the normalizer to deal with. Transient
//! failures are retried with backoff behind a circuit breaker; auth and
//! malformed-response failures are never retried.

use std::sync::LazyLock;

use async_trait::async_trait;
use base64::Engine as _;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::errors::error_logging;
use crate::observability;
use crate::ocr::calculate_retry_delay;
use crate::ocr_config::RecoveryConfig;
use crate::recognizer::OcrResult;
use crate::validation::ValidatedImage;

pub const DEFAULT_API_URL: &str = "https://api.opentyphoon.ai/v1";
pub const DEFAULT_MODEL: &str = "typhoon-v2.5-30b-a3b-instruct";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Configuration for the extraction service client
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Bearer credential for the hosted API; empty means unconfigured
    pub api_key: String,
    /// Base URL or full chat-completions URL; normalized by [`Self::endpoint`]
    pub api_url: String,
    /// Model identifier passed to the service
    pub model: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Attach the uploaded image to the request as a data URI
    pub send_image: bool,
    /// Retry and circuit breaker settings for transient failures
    pub recovery: RecoveryConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_tokens: 512,
            temperature: 0.1,
            send_image: false,
            recovery: RecoveryConfig {
                max_retries: 2,
                ..Default::default()
            },
        }
    }
}

impl ExtractionConfig {
    /// Resolve the chat-completions endpoint, appending the path exactly
    /// once whether or not the configured URL already carries it.
    pub fn endpoint(&self) -> String {
        let base = self.api_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Validate extraction configuration parameters
    pub fn validate(&self) -> crate::errors::AppResult<()> {
        if self.api_url.trim().is_empty() {
            return Err(crate::errors::AppError::Config(
                "extraction api_url cannot be empty".to_string(),
            ));
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(crate::errors::AppError::Config(
                "extraction api_url must start with http:// or https://".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(crate::errors::AppError::Config(
                "extraction model cannot be empty".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(crate::errors::AppError::Config(
                "extraction request timeout cannot be 0".to_string(),
            ));
        }
        if self.request_timeout_secs > 300 {
            return Err(crate::errors::AppError::Config(
                "extraction request timeout cannot exceed 300 seconds".to_string(),
            ));
        }
        if self.max_tokens == 0 {
            return Err(crate::errors::AppError::Config(
                "extraction max_tokens cannot be 0".to_string(),
            ));
        }
        self.recovery.validate()?;
        Ok(())
    }
}

/// The four field slots exactly as the service returned them, before
/// normalization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFields {
    pub recipient_name: Option<String>,
    pub room_number: Option<String>,
    pub shipping_company: Option<String>,
    pub tracking_number: Option<String>,
}

/// Extraction failure classification
#[derive(Debug, Clone)]
pub enum ExtractionError {
    /// Missing or rejected credential; never retried
    AuthenticationFailed(String),
    /// Network failure, timeout, rate limit, or server error; retryable
    ServiceUnavailable(String),
    /// The service answered but the payload cannot be mapped to the
    /// expected field shape
    MalformedResponse(String),
}

impl ExtractionError {
    /// Localization key for the user-facing message
    pub fn message_key(&self) -> &'static str {
        match self {
            ExtractionError::AuthenticationFailed(_) => "error-extract-auth",
            ExtractionError::ServiceUnavailable(_) => "error-extract-unavailable",
            ExtractionError::MalformedResponse(_) => "error-extract-malformed",
        }
    }
}

impl std::fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionError::AuthenticationFailed(msg) => {
                write!(f, "[EXTRACT_AUTH] Extraction service rejected credentials: {}", msg)
            }
            ExtractionError::ServiceUnavailable(msg) => {
                write!(f, "[EXTRACT_UNAVAILABLE] Extraction service unavailable: {}", msg)
            }
            ExtractionError::MalformedResponse(msg) => {
                write!(f, "[EXTRACT_MALFORMED] Extraction service returned unusable data: {}", msg)
            }
        }
    }
}

impl std::error::Error for ExtractionError {}

/// Boundary to the hosted field-extraction service
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(
        &self,
        ocr: &OcrResult,
        image: &ValidatedImage,
    ) -> Result<RawFields, ExtractionError>;

    /// Whether a credential is present, for the health endpoint
    fn is_configured(&self) -> bool;
}

/// Client for the Typhoon chat-completions API
pub struct TyphoonClient {
    http: reqwest::Client,
    config: ExtractionConfig,
    endpoint: String,
    breaker: CircuitBreaker,
}

impl TyphoonClient {
    pub fn new(config: ExtractionConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        let endpoint = config.endpoint();
        let breaker = CircuitBreaker::new(config.recovery.clone());
        info!(endpoint = %endpoint, model = %config.model, "Extraction client initialized");

        Ok(Self {
            http,
            config,
            endpoint,
            breaker,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_payload(&self, ocr_text: &str, image: &ValidatedImage) -> Value {
        let prompt = build_extraction_prompt(ocr_text);

        let user_content = if self.config.send_image {
            let data_uri = format!(
                "data:{};base64,{}",
                image.mime_type,
                base64::engine::general_purpose::STANDARD.encode(&image.bytes)
            );
            json!([
                { "type": "text", "text": prompt },
                { "type": "image_url", "image_url": { "url": data_uri } }
            ])
        } else {
            Value::String(prompt)
        };

        json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "system",
                    "content": "คุณเป็นผู้เชี่ยวชาญด้านข้อมูลพัสดุ ตอบกลับเป็น JSON เท่านั้น"
                },
                { "role": "user", "content": user_content }
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens
        })
    }

    async fn request_once(&self, payload: &Value) -> Result<RawFields, ExtractionError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.config.api_key.trim())
            .json(payload)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ExtractionError::AuthenticationFailed(format!("HTTP {}", status)));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(ExtractionError::ServiceUnavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(ExtractionError::MalformedResponse(format!(
                "unexpected HTTP status {}",
                status
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            ExtractionError::MalformedResponse(format!("response body is not JSON: {}", e))
        })?;

        parse_chat_response(&body)
    }
}

#[async_trait]
impl FieldExtractor for TyphoonClient {
    async fn extract(
        &self,
        ocr: &OcrResult,
        image: &ValidatedImage,
    ) -> Result<RawFields, ExtractionError> {
        if !self.is_configured() {
            return Err(ExtractionError::AuthenticationFailed(
                "extraction API key is not configured".to_string(),
            ));
        }

        if self.breaker.is_open() {
            warn!("Extraction circuit breaker is open, rejecting request");
            observability::update_circuit_breaker_state(true);
            return Err(ExtractionError::ServiceUnavailable(
                "extraction service temporarily unavailable due to repeated failures".to_string(),
            ));
        }
        observability::update_circuit_breaker_state(false);

        let payload = self.build_payload(&ocr.joined_text(), image);

        let mut attempt = 0;
        let max_attempts = self.config.recovery.max_retries + 1;

        loop {
            attempt += 1;

            match self.request_once(&payload).await {
                Ok(fields) => {
                    self.breaker.record_success();
                    observability::update_circuit_breaker_state(false);
                    debug!(attempt, "Extraction request succeeded");
                    return Ok(fields);
                }
                // Only transient failures are retried and counted by the
                // breaker; auth and shape errors are deterministic.
                Err(err @ ExtractionError::ServiceUnavailable(_)) => {
                    if attempt >= max_attempts {
                        self.breaker.record_failure();
                        observability::update_circuit_breaker_state(self.breaker.is_open());
                        error_logging::log_extraction_error(
                            &err,
                            "extract_fields",
                            Some(&self.endpoint),
                            Some(attempt),
                        );
                        return Err(err);
                    }
                    let delay_ms = calculate_retry_delay(attempt, &self.config.recovery);
                    warn!(attempt, delay_ms, error = %err, "Extraction attempt failed, retrying");
                    tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                }
                Err(err) => {
                    error_logging::log_extraction_error(
                        &err,
                        "extract_fields",
                        Some(&self.endpoint),
                        Some(attempt),
                    );
                    return Err(err);
                }
            }
        }
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }
}

/// Build the Thai extraction prompt around the OCR text
fn build_extraction_prompt(ocr_text: &str) -> String {
    format!(
        "คุณเป็นผู้เชี่ยวชาญในการวิเคราะห์ข้อมูลพัสดุไทย จากข้อความที่สกัดได้จาก OCR \
         กรุณาวิเคราะห์และสกัดข้อมูลต่อไปนี้ในรูปแบบ JSON:\n\n\
         1. **ชื่อผู้รับ** (recipient_name)\n\
         2. **เลขห้อง** (room_number)\n\
         3. **บริษัทขนส่ง** (shipping_company)\n\
         4. **รหัสพัสดุ** (tracking_number)\n\n\
         **ข้อความจาก OCR:**\n{}\n\n\
         **ตอบกลับเฉพาะ JSON เท่านั้น ห้ามมีคำอธิบายอื่น**",
        ocr_text
    )
}

fn classify_transport_error(err: reqwest::Error) -> ExtractionError {
    if err.is_timeout() {
        ExtractionError::ServiceUnavailable(format!("request timed out: {}", err))
    } else {
        ExtractionError::ServiceUnavailable(err.to_string())
    }
}

/// Map a chat-completions response body to raw fields.
///
/// Takes `choices[0].message.content`, strips any markdown code fence the
/// model wrapped around its answer, and reads the four known keys from the
/// resulting object. Unknown keys are ignored; nulls and scalars are
/// tolerated.
pub fn parse_chat_response(body: &Value) -> Result<RawFields, ExtractionError> {
    let content = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ExtractionError::MalformedResponse(
                "response is missing choices[0].message.content".to_string(),
            )
        })?;

    let json_text = strip_code_fences(content);
    let parsed: Value = serde_json::from_str(json_text.trim()).map_err(|e| {
        ExtractionError::MalformedResponse(format!("model output is not valid JSON: {}", e))
    })?;

    let object = parsed.as_object().ok_or_else(|| {
        ExtractionError::MalformedResponse("model output is not a JSON object".to_string())
    })?;

    Ok(RawFields {
        recipient_name: field_as_string(object.get("recipient_name")),
        room_number: field_as_string(object.get("room_number")),
        shipping_company: field_as_string(object.get("shipping_company")),
        tracking_number: field_as_string(object.get("tracking_number")),
    })
}

/// Read one field leniently: strings pass through raw, numbers and bools
/// are stringified, null/missing/compound values become `None`
fn field_as_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("code fence pattern is valid")
});

/// Remove a markdown code fence wrapped around the model output, if any
pub fn strip_code_fences(content: &str) -> String {
    match CODE_FENCE.captures(content) {
        Some(captures) => captures[1].trim().to_string(),
        None => content.trim().to_string(),
    }
}
