use finvo_ocr::ReceiptHints;
use serde_json::{Map, Value};

/// An image kept alongside a document so it can be sent to a vision model.
#[derive(Debug, Clone, PartialEq)]
pub struct PageImage {
    pub data: Vec<u8>,
    pub mime_type: &'static str,
}

/// One unit of loaded content: a PDF page or a whole image.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Extracted text (PDF text layer or OCR output). May be empty.
    pub content: String,
    pub metadata: Map<String, Value>,
    pub images: Vec<PageImage>,
    /// Regex hints from OCR, when OCR ran and succeeded.
    pub hints: Option<ReceiptHints>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn set_meta(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn has_usable_text(&self) -> bool {
        finvo_ocr::has_usable_text(&self.content)
    }
}
