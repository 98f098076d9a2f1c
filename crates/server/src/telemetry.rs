//! Tracing subscriber setup.

use anyhow::{anyhow, Context};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{Config, LogFormat};

/// Install the global subscriber. `RUST_LOG`, when set, wins over `LOG_LEVEL`.
pub fn init(config: &Config) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => env_filter(&config.log_level)?,
    };
    let writer = make_writer(config.log_file.as_deref())?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(JsonStorageLayer)
            .with(BunyanFormattingLayer::new(service_name(&config.app_name), writer))
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(config.log_file.is_none())
                    .with_writer(writer),
            )
            .try_init(),
    }
    .map_err(|e| anyhow!("failed to initialize tracing: {e}"))
}

/// Accepts the level names operators already use (`WARNING`, `CRITICAL`)
/// as well as full `EnvFilter` directives.
pub fn env_filter(level: &str) -> anyhow::Result<EnvFilter> {
    let directive = match level.trim().to_ascii_uppercase().as_str() {
        "CRITICAL" | "ERROR" => "error".to_string(),
        "WARNING" | "WARN" => "warn".to_string(),
        "INFO" => "info".to_string(),
        "DEBUG" => "debug".to_string(),
        "TRACE" => "trace".to_string(),
        _ => level.trim().to_string(),
    };
    EnvFilter::try_new(&directive).with_context(|| format!("bad log filter '{directive}'"))
}

fn make_writer(log_file: Option<&Path>) -> anyhow::Result<BoxMakeWriter> {
    let Some(path) = log_file else {
        return Ok(BoxMakeWriter::new(std::io::stdout));
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating log directory {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    Ok(BoxMakeWriter::new(std::io::stdout.and(Arc::new(file))))
}

fn service_name(app_name: &str) -> String {
    app_name.to_lowercase().replace(' ', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_level_names_map_to_filters() {
        for level in ["INFO", "debug", "WARNING", "CRITICAL", "finvo_agent=debug,info"] {
            assert!(env_filter(level).is_ok(), "{level}");
        }
    }

    #[test]
    fn service_name_is_slugged() {
        assert_eq!(service_name("Finvo AI"), "finvo-ai");
    }

    #[test]
    fn log_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("finvo.log");
        make_writer(Some(&path)).unwrap();
        assert!(path.exists());
    }
}
