use chrono::{NaiveDate, NaiveTime};
use finvo_core::PaymentMethod;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Below this many non-blank characters OCR text is treated as no text.
pub const MIN_USABLE_CHARS: usize = 20;

/// A single extracted value with an associated confidence score (0.0–1.0).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedField<T> {
    pub value: T,
    /// Confidence in this extraction (0.0 = guessed, 1.0 = certain).
    pub confidence: f32,
}

impl<T> ExtractedField<T> {
    pub fn new(value: T, confidence: f32) -> Self {
        Self { value, confidence: confidence.clamp(0.0, 1.0) }
    }
}

/// Fields read straight off OCR text by regex, without the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReceiptHints {
    pub vendor: Option<ExtractedField<String>>,
    pub date: Option<ExtractedField<NaiveDate>>,
    pub time: Option<ExtractedField<NaiveTime>>,
    pub subtotal: Option<ExtractedField<Decimal>>,
    pub tax: Option<ExtractedField<Decimal>>,
    pub total: Option<ExtractedField<Decimal>>,
    pub payment_method: Option<ExtractedField<PaymentMethod>>,
    /// Aggregate confidence across the key fields (0.0–1.0).
    pub confidence: f32,
}

impl ReceiptHints {
    /// Too weak to trust without a second look.
    pub fn needs_review(&self) -> bool {
        self.confidence < 0.7
    }
}

/// Merged result of every OCR strategy run over one image.
#[derive(Debug, Clone)]
pub struct OcrOutput {
    pub text: String,
    pub strategies_used: Vec<&'static str>,
    pub line_count: usize,
    pub hints: ReceiptHints,
    /// Hex SHA-256 of the source image bytes.
    pub sha256: String,
}

impl OcrOutput {
    pub fn is_usable(&self) -> bool {
        has_usable_text(&self.text)
    }
}

pub fn has_usable_text(text: &str) -> bool {
    text.chars().filter(|c| !c.is_whitespace()).count() >= MIN_USABLE_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracted_field_clamps_confidence() {
        let f = ExtractedField::new("test", 1.5);
        assert_eq!(f.confidence, 1.0);
        let f = ExtractedField::new("test", -0.1);
        assert_eq!(f.confidence, 0.0);
    }

    #[test]
    fn needs_review_threshold() {
        let low = ReceiptHints { confidence: 0.5, ..Default::default() };
        assert!(low.needs_review());
        let high = ReceiptHints { confidence: 0.9, ..low };
        assert!(!high.needs_review());
    }

    #[test]
    fn usable_text_ignores_whitespace() {
        assert!(!has_usable_text("  \n\n  abc  \n"));
        assert!(has_usable_text("STARBUCKS COFFEE\nTotal $5.50"));
    }
}
