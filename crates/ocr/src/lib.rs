pub mod extract;
pub mod hash;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod strategy;
pub mod types;

pub use extract::Extractor;
pub use hash::sha256_hex;
pub use pipeline::{merge_lines, DynOcrPipeline, OcrPipeline, PipelineError};
pub use preprocess::{PreprocessError, PreprocessOptions, Region};
pub use recognizer::{MockRecognizer, OcrBackend, OcrConfig, OcrError, PageSegMode, UnavailableRecognizer};
pub use strategy::{default_strategies, OcrStrategy};
pub use types::{has_usable_text, ExtractedField, OcrOutput, ReceiptHints};

#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;
