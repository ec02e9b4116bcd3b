//! # Text Recognition Module
//!
//! Defines the boundary to the external OCR engine: the [`TextRecognizer`]
//! trait, the fragment types it produces, and [`EnginePool`], which bounds
//! concurrent access to a shared engine instance and dispatches the
//! blocking engine call off the async runtime.
//!
//! The engine is constructed once at process startup and injected; per-call
//! code never initializes an engine.

use std::sync::Arc;

use tokio::sync::Semaphore;

/// Pixel rectangle a fragment was recognized in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Region covering a whole image, for engines that only report
    /// page-level geometry
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// One recognized piece of text with its confidence and source region
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    /// Recognition confidence in the range 0.0–1.0
    pub confidence: f32,
    pub region: Region,
}

/// Ordered sequence of recognized text fragments for one image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrResult {
    pub fragments: Vec<TextFragment>,
}

impl OcrResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// All fragment text joined with newlines, in recognition order
    pub fn joined_text(&self) -> String {
        self.fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// First `max_chars` characters of the joined text
    pub fn preview(&self, max_chars: usize) -> String {
        self.joined_text().chars().take(max_chars).collect()
    }
}

/// Black-box recognition engine boundary.
///
/// Implementations are expected to be blocking and potentially slow
/// (hundreds of milliseconds to seconds); callers go through
/// [`EnginePool::recognize`], which moves the call onto a blocking thread.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &[u8]) -> anyhow::Result<Vec<TextFragment>>;

    /// Short engine name for logs and the health endpoint
    fn name(&self) -> &str;
}

/// Shared engine handle with bounded concurrency.
///
/// The underlying engine may not be safely callable from arbitrarily many
/// pipeline runs at once, so invocations are gated by a semaphore sized to
/// the engine's safe concurrency level and executed via `spawn_blocking`.
pub struct EnginePool {
    engine: Arc<dyn TextRecognizer>,
    permits: Arc<Semaphore>,
}

impl EnginePool {
    pub fn new(engine: Arc<dyn TextRecognizer>, concurrency: usize) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub fn engine_name(&self) -> String {
        self.engine.name().to_string()
    }

    /// Run one recognition call, waiting for a free engine slot first.
    pub async fn recognize(&self, image: Vec<u8>) -> anyhow::Result<Vec<TextFragment>> {
        let permit = Arc::clone(&self.permits).acquire_owned().await?;
        let engine = Arc::clone(&self.engine);
        let result = tokio::task::spawn_blocking(move || {
            // Hold the permit for the duration of the engine call
            let _permit = permit;
            engine.recognize(&image)
        })
        .await?;
        result
    }
}

#[cfg(feature = "tesseract")]
mod tesseract {
    use anyhow::anyhow;
    use leptess::LepTess;
    use parking_lot::Mutex;
    use tracing::info;

    use super::{Region, TextFragment, TextRecognizer};

    /// Tesseract-backed recognizer via leptess.
    ///
    /// leptess reports page-level mean confidence and no per-line geometry,
    /// so each line becomes a fragment carrying the page confidence and the
    /// full-image region.
    pub struct TesseractRecognizer {
        tess: Mutex<LepTess>,
        languages: String,
    }

    impl TesseractRecognizer {
        pub fn new(languages: &str) -> anyhow::Result<Self> {
            let tessdata_path = probe_tessdata_path();
            info!(
                languages = %languages,
                tessdata = ?tessdata_path,
                "Initializing Tesseract OCR engine"
            );
            let tess = LepTess::new(tessdata_path.as_deref(), languages)
                .map_err(|e| anyhow!("Failed to initialize Tesseract OCR instance: {}", e))?;
            Ok(Self {
                tess: Mutex::new(tess),
                languages: languages.to_string(),
            })
        }

        pub fn languages(&self) -> &str {
            &self.languages
        }
    }

    impl TextRecognizer for TesseractRecognizer {
        fn recognize(&self, image: &[u8]) -> anyhow::Result<Vec<TextFragment>> {
            let (width, height) = image::ImageReader::new(std::io::Cursor::new(image))
                .with_guessed_format()?
                .into_dimensions()?;

            let mut tess = self.tess.lock();
            tess.set_image_from_mem(image)
                .map_err(|e| anyhow!("Failed to load image into OCR engine: {}", e))?;
            let raw = tess
                .get_utf8_text()
                .map_err(|e| anyhow!("Failed to extract text from image: {}", e))?;
            let confidence = tess.mean_text_conf().clamp(0, 100) as f32 / 100.0;

            let fragments = raw
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|line| TextFragment {
                    text: line.to_string(),
                    confidence,
                    region: Region::full(width, height),
                })
                .collect();
            Ok(fragments)
        }

        fn name(&self) -> &str {
            "tesseract"
        }
    }

    /// Probe well-known tessdata installation paths, falling back to the
    /// library default when none exists.
    fn probe_tessdata_path() -> Option<String> {
        let possible_paths = [
            "/usr/share/tesseract-ocr/5/tessdata",
            "/usr/share/tesseract-ocr/4.00/tessdata",
            "/usr/share/tessdata",
            "/usr/local/share/tessdata",
        ];

        for path in possible_paths {
            if std::path::Path::new(path).exists() {
                info!("Using tessdata path: {}", path);
                return Some(path.to_string());
            }
        }
        None
    }
}

#[cfg(feature = "tesseract")]
pub use tesseract::TesseractRecognizer;

#[cfg(test)]
mod tests {
    use super::*;

    struct LineRecognizer;

    impl TextRecognizer for LineRecognizer {
        fn recognize(&self, _image: &[u8]) -> anyhow::Result<Vec<TextFragment>> {
            Ok(vec![
                TextFragment {
                    text: "first".to_string(),
                    confidence: 0.9,
                    region: Region::full(100, 50),
                },
                TextFragment {
                    text: "second".to_string(),
                    confidence: 0.8,
                    region: Region::full(100, 50),
                },
            ])
        }

        fn name(&self) -> &str {
            "lines"
        }
    }

    #[test]
    fn test_joined_text_preserves_order() {
        let result = OcrResult {
            fragments: vec![
                TextFragment {
                    text: "a".to_string(),
                    confidence: 1.0,
                    region: Region::full(1, 1),
                },
                TextFragment {
                    text: "b".to_string(),
                    confidence: 1.0,
                    region: Region::full(1, 1),
                },
            ],
        };
        assert_eq!(result.joined_text(), "a\nb");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let result = OcrResult {
            fragments: vec![TextFragment {
                text: "สมชาย ใจดี".to_string(),
                confidence: 1.0,
                region: Region::full(1, 1),
            }],
        };
        assert_eq!(result.preview(6), "สมชาย ");
        assert_eq!(result.preview(200), "สมชาย ใจดี");
    }

    #[tokio::test]
    async fn test_engine_pool_runs_recognizer() {
        let pool = EnginePool::new(Arc::new(LineRecognizer), 1);
        let fragments = pool.recognize(vec![0u8; 4]).await.unwrap();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].text, "first");
        assert_eq!(pool.engine_name(), "lines");
    }
}
