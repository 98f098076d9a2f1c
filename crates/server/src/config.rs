//! Service configuration from CLI flags, environment variables and `.env`.

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, ValueEnum};
use finvo_agent::{AgentConfig, ExtractionMode, OpenAiConfig};
use std::path::PathBuf;

use crate::telemetry;

pub const DEFAULT_ALLOWED_EXTENSIONS: &str = ".jpg,.jpeg,.png,.pdf,.gif,.bmp,.webp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Bunyan-style JSON lines.
    Json,
    Pretty,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "finvo-server", about = "Invoice and receipt extraction service", version)]
#[command(args_override_self = true)]
pub struct Config {
    // ── LLM ───────────────────────────────────────────────────────────────────
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = finvo_agent::llm::DEFAULT_BASE_URL)]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o")]
    pub openai_model: String,

    #[arg(long, env = "OPENAI_TEMPERATURE", default_value_t = 0.1)]
    pub openai_temperature: f32,

    #[arg(long, env = "MAX_TOKENS", default_value_t = 1500)]
    pub max_tokens: u32,

    #[arg(long, env = "LLM_TIMEOUT_SECS", default_value_t = finvo_agent::llm::DEFAULT_TIMEOUT_SECS)]
    pub llm_timeout_secs: u64,

    // ── Application ───────────────────────────────────────────────────────────
    #[arg(long, env = "APP_NAME", default_value = "Finvo AI")]
    pub app_name: String,

    #[arg(long, env = "APP_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub app_version: String,

    #[arg(long, env = "DEBUG", default_value_t = false, action = ArgAction::Set)]
    pub debug: bool,

    #[arg(long, env = "ENVIRONMENT", value_enum, ignore_case = true, default_value = "production")]
    pub environment: Environment,

    // ── Server ────────────────────────────────────────────────────────────────
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    // ── Files ─────────────────────────────────────────────────────────────────
    #[arg(long, env = "MAX_FILE_SIZE_MB", default_value_t = 10)]
    pub max_file_size_mb: u64,

    /// Extensions accepted by the upload endpoints, comma separated.
    #[arg(long, env = "ALLOWED_FILE_EXTENSIONS", value_delimiter = ',', default_value = DEFAULT_ALLOWED_EXTENSIONS)]
    pub allowed_file_extensions: Vec<String>,

    // ── Extraction ────────────────────────────────────────────────────────────
    #[arg(long, env = "EXTRACTION_MODE", default_value = "auto")]
    pub extraction_mode: ExtractionMode,

    #[arg(long, env = "OCR_LANGUAGE", default_value = "eng")]
    pub ocr_language: String,

    #[arg(long, env = "TESSDATA_PREFIX")]
    pub tessdata_prefix: Option<String>,

    /// Fill null totals, dates and payment method from OCR hints.
    #[arg(long, env = "OCR_BACKFILL", default_value_t = true, action = ArgAction::Set)]
    pub ocr_backfill: bool,

    // ── Logging ───────────────────────────────────────────────────────────────
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, ignore_case = true, default_value = "json")]
    pub log_format: LogFormat,

    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// `.env` first so its values can feed clap's `env` fallbacks.
    pub fn load() -> Self {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                eprintln!("Warning: failed to load .env file: {err}");
            }
        }
        Self::parse()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.openai_api_key.starts_with("sk-") {
            bail!("invalid OpenAI API key format");
        }
        if !(0.0..=2.0).contains(&self.openai_temperature) {
            bail!("OPENAI_TEMPERATURE must be between 0 and 2, got {}", self.openai_temperature);
        }
        if self.max_tokens == 0 {
            bail!("MAX_TOKENS must be positive");
        }
        if self.max_file_size_mb == 0 {
            bail!("MAX_FILE_SIZE_MB must be positive");
        }
        if self.allowed_extensions().is_empty() {
            bail!("ALLOWED_FILE_EXTENSIONS must name at least one extension");
        }
        telemetry::env_filter(&self.log_level).context("invalid LOG_LEVEL")?;
        Ok(())
    }

    /// Lower-cased and dot-prefixed, blanks removed.
    pub fn allowed_extensions(&self) -> Vec<String> {
        self.allowed_file_extensions
            .iter()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty() && e != ".")
            .map(|e| if e.starts_with('.') { e } else { format!(".{e}") })
            .collect()
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            model: self.openai_model.clone(),
            temperature: self.openai_temperature,
            max_tokens: self.max_tokens,
            mode: self.extraction_mode,
            backfill_from_ocr: self.ocr_backfill,
        }
    }

    pub fn openai_config(&self) -> OpenAiConfig {
        OpenAiConfig {
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_base_url.clone(),
            timeout_secs: self.llm_timeout_secs,
        }
    }
}
