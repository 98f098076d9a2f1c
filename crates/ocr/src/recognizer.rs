use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Tesseract not available: build with the `tesseract` feature")]
    NotAvailable,
}

/// Tesseract page segmentation modes used by the strategy chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSegMode {
    /// PSM 3: fully automatic layout analysis.
    Auto,
    /// PSM 6: a single uniform block of text.
    SingleBlock,
    /// PSM 11: as much text as possible, in no particular order.
    SparseText,
}

impl PageSegMode {
    pub fn as_tesseract(self) -> u8 {
        match self {
            PageSegMode::Auto => 3,
            PageSegMode::SingleBlock => 6,
            PageSegMode::SparseText => 11,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrConfig {
    pub page_segmentation: PageSegMode,
    pub char_whitelist: Option<String>,
}

impl OcrConfig {
    pub fn new(page_segmentation: PageSegMode) -> Self {
        Self { page_segmentation, char_whitelist: None }
    }

    pub fn with_whitelist(mut self, chars: impl Into<String>) -> Self {
        self.char_whitelist = Some(chars.into());
        self
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self::new(PageSegMode::Auto)
    }
}

/// Abstraction over an OCR backend.
/// Implementations accept PNG image bytes and return the recognized text.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image_bytes: &[u8], config: &OcrConfig) -> Result<String, OcrError>;

    /// Short engine name for logs and response metadata.
    fn name(&self) -> &'static str;
}

impl<T: OcrBackend + ?Sized> OcrBackend for Box<T> {
    fn recognize(&self, image_bytes: &[u8], config: &OcrConfig) -> Result<String, OcrError> {
        (**self).recognize(image_bytes, config)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns pre-set text without looking at the image.
///
/// Scripted replies are consumed one per call in order; once they run out the
/// fixed text is returned. Every config seen is recorded.
pub struct MockRecognizer {
    text: String,
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<OcrConfig>>,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// One reply per call; `Err` entries surface as engine errors.
    pub fn scripted(replies: Vec<Result<&str, &str>>) -> Self {
        let script = replies
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        Self {
            text: String::new(),
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<OcrConfig> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image_bytes: &[u8], config: &OcrConfig) -> Result<String, OcrError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(config.clone());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(OcrError::Engine(msg)),
            None => Ok(self.text.clone()),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Stand-in when the binary is built without Tesseract. Vision mode still works.
pub struct UnavailableRecognizer;

impl OcrBackend for UnavailableRecognizer {
    fn recognize(&self, _image_bytes: &[u8], _config: &OcrConfig) -> Result<String, OcrError> {
        Err(OcrError::NotAvailable)
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{OcrBackend, OcrConfig, OcrError};
    use leptess::{LepTess, Variable};

    pub struct TesseractRecognizer {
        data_path: Option<String>,
        lang: String,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>, lang: &str) -> Self {
            Self { data_path, lang: lang.to_string() }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, image_bytes: &[u8], config: &OcrConfig) -> Result<String, OcrError> {
            // LepTess is not Sync; a fresh engine per call keeps the backend shareable.
            let mut lt = LepTess::new(self.data_path.as_deref(), &self.lang)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_variable(
                Variable::TesseditPagesegMode,
                &config.page_segmentation.as_tesseract().to_string(),
            )
            .map_err(|e| OcrError::Engine(e.to_string()))?;
            if let Some(whitelist) = &config.char_whitelist {
                lt.set_variable(Variable::TesseditCharWhitelist, whitelist)
                    .map_err(|e| OcrError::Engine(e.to_string()))?;
            }
            lt.set_image_from_mem(image_bytes)
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))
        }

        fn name(&self) -> &'static str {
            "tesseract"
        }
    }
}
