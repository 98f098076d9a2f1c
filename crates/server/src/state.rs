use anyhow::Context;
use finvo_agent::{ExtractionAgent, OpenAiClient};
use finvo_document::{DocumentLoader, LoaderConfig};
use finvo_ocr::{DynOcrPipeline, OcrBackend, OcrPipeline};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;

/// Service facts reported by the info endpoints and used for upload checks.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub app_name: String,
    pub app_version: String,
    pub environment: &'static str,
    pub debug: bool,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_file_size_mb: u64,
    pub allowed_extensions: Vec<String>,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            app_name: config.app_name.clone(),
            app_version: config.app_version.clone(),
            environment: config.environment.as_str(),
            debug: config.debug,
            model: config.openai_model.clone(),
            temperature: config.openai_temperature,
            max_tokens: config.max_tokens,
            max_file_size_mb: config.max_file_size_mb,
            allowed_extensions: config.allowed_extensions(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<ExtractionAgent>,
    pub settings: Arc<ServiceSettings>,
}

impl AppState {
    pub fn new(agent: ExtractionAgent, settings: ServiceSettings) -> Self {
        Self {
            agent: Arc::new(agent),
            settings: Arc::new(settings),
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pipeline: DynOcrPipeline = OcrPipeline::new(ocr_backend(config));
        let loader = DocumentLoader::new(
            LoaderConfig::from_megabytes(config.max_file_size_mb),
            Arc::new(pipeline),
        );
        let llm = OpenAiClient::new(config.openai_config()).context("failed to build LLM client")?;
        info!(base_url = llm.base_url(), "LLM client ready");

        let agent = ExtractionAgent::new(Arc::new(llm), loader, config.agent_config());
        Ok(Self::new(agent, ServiceSettings::from_config(config)))
    }
}

#[cfg(feature = "tesseract")]
fn ocr_backend(config: &Config) -> Box<dyn OcrBackend> {
    info!(language = %config.ocr_language, "Using Tesseract OCR");
    Box::new(finvo_ocr::TesseractRecognizer::new(
        config.tessdata_prefix.clone(),
        &config.ocr_language,
    ))
}

#[cfg(not(feature = "tesseract"))]
fn ocr_backend(_config: &Config) -> Box<dyn OcrBackend> {
    tracing::warn!("Built without the tesseract feature; OCR is disabled and images go to the model as-is");
    Box::new(finvo_ocr::UnavailableRecognizer)
}
