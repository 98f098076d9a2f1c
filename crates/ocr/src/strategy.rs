use crate::preprocess::Region;
use crate::recognizer::{OcrConfig, PageSegMode};

/// Digits, separators, currency symbols and the letters of TOTAL / TAX / SUBTOTAL.
pub const NUMERIC_WHITELIST: &str = "0123456789.,:-/$€£ABLOSTUXablostux";

/// One OCR pass: which part of the page, read how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrStrategy {
    pub name: &'static str,
    pub region: Region,
    pub config: OcrConfig,
}

impl OcrStrategy {
    pub fn new(name: &'static str, region: Region, config: OcrConfig) -> Self {
        Self { name, region, config }
    }
}

/// The default chain, in the order lines are merged.
pub fn default_strategies() -> Vec<OcrStrategy> {
    vec![
        OcrStrategy::new("full_auto", Region::Full, OcrConfig::new(PageSegMode::Auto)),
        OcrStrategy::new("full_block", Region::Full, OcrConfig::new(PageSegMode::SingleBlock)),
        OcrStrategy::new("sparse", Region::Full, OcrConfig::new(PageSegMode::SparseText)),
        OcrStrategy::new("header", Region::Header, OcrConfig::new(PageSegMode::SingleBlock)),
        OcrStrategy::new(
            "numeric_body",
            Region::Body,
            OcrConfig::new(PageSegMode::SingleBlock).with_whitelist(NUMERIC_WHITELIST),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chain_order() {
        let names: Vec<_> = default_strategies().iter().map(|s| s.name).collect();
        assert_eq!(names, ["full_auto", "full_block", "sparse", "header", "numeric_body"]);
    }

    #[test]
    fn only_numeric_pass_is_whitelisted() {
        let chain = default_strategies();
        let whitelisted: Vec<_> = chain
            .iter()
            .filter(|s| s.config.char_whitelist.is_some())
            .map(|s| s.name)
            .collect();
        assert_eq!(whitelisted, ["numeric_body"]);
        assert_eq!(chain[4].region, Region::Body);
    }
}
