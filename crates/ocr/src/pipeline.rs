use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

use crate::extract::Extractor;
use crate::hash;
use crate::preprocess::{self, PreprocessOptions};
use crate::recognizer::{OcrBackend, OcrError};
use crate::strategy::{default_strategies, OcrStrategy};
use crate::types::OcrOutput;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Image preprocessing failed: {0}")]
    Preprocess(#[from] crate::preprocess::PreprocessError),
    #[error("OCR recognition failed: {0}")]
    Ocr(#[from] OcrError),
    #[error("No OCR strategies configured")]
    NoStrategies,
}

/// Orchestrates: hash → preprocess → every strategy → merge → hints.
pub struct OcrPipeline<R: OcrBackend> {
    recognizer: R,
    strategies: Vec<OcrStrategy>,
    options: PreprocessOptions,
}

pub type DynOcrPipeline = OcrPipeline<Box<dyn OcrBackend>>;

impl<R: OcrBackend> OcrPipeline<R> {
    pub fn new(recognizer: R) -> Self {
        Self {
            recognizer,
            strategies: default_strategies(),
            options: PreprocessOptions::default(),
        }
    }

    pub fn with_strategies(mut self, strategies: Vec<OcrStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_options(mut self, options: PreprocessOptions) -> Self {
        self.options = options;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.recognizer.name()
    }

    /// Run every strategy over one image.
    ///
    /// A failing strategy is skipped; the run fails only when none succeeds.
    pub fn run(&self, image_bytes: &[u8]) -> Result<OcrOutput, PipelineError> {
        if self.strategies.is_empty() {
            return Err(PipelineError::NoStrategies);
        }
        let sha256 = hash::sha256_hex(image_bytes);
        let gray = preprocess::normalize(preprocess::load(image_bytes)?, &self.options);

        let attempts = self.strategies.iter().map(|strategy| {
            let text = preprocess::encode_png(&preprocess::crop(&gray, strategy.region))
                .map_err(PipelineError::from)
                .and_then(|png| {
                    self.recognizer
                        .recognize(&png, &strategy.config)
                        .map_err(PipelineError::from)
                });
            (strategy.name, text)
        });
        let (outputs, strategies_used) = collect_attempts(attempts)?;

        let lines = merge_lines(&outputs);
        let text = lines.join("\n");
        let hints = Extractor::extract(&text);
        debug!(
            lines = lines.len(),
            strategies = strategies_used.len(),
            confidence = hints.confidence,
            "OCR merged"
        );

        Ok(OcrOutput {
            line_count: lines.len(),
            text,
            strategies_used,
            hints,
            sha256,
        })
    }
}

/// Keep every strategy that produced text. A failed strategy is skipped
/// unless the backend is missing altogether; with nothing left, the last
/// failure is returned.
fn collect_attempts<I>(attempts: I) -> Result<(Vec<String>, Vec<&'static str>), PipelineError>
where
    I: IntoIterator<Item = (&'static str, Result<String, PipelineError>)>,
{
    let mut outputs = Vec::new();
    let mut strategies_used = Vec::new();
    let mut last_error = None;

    for (name, attempt) in attempts {
        match attempt {
            Ok(text) => {
                debug!(strategy = name, chars = text.len(), "OCR strategy finished");
                strategies_used.push(name);
                outputs.push(text);
            }
            Err(PipelineError::Ocr(OcrError::NotAvailable)) => return Err(OcrError::NotAvailable.into()),
            Err(e) => {
                warn!(strategy = name, error = %e, "OCR strategy failed, skipping");
                last_error = Some(e);
            }
        }
    }

    if strategies_used.is_empty() {
        return Err(last_error.unwrap_or(PipelineError::NoStrategies));
    }
    Ok((outputs, strategies_used))
}

/// Lines from all outputs in first-seen order, duplicates and blanks dropped.
/// Duplicates compare case-folded with whitespace collapsed.
pub fn merge_lines<S: AsRef<str>>(outputs: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for line in outputs.iter().flat_map(|o| o.as_ref().lines()) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let key = line.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        if seen.insert(key) {
            merged.push(line.to_string());
        }
    }
    merged
}
