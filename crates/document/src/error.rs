use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("File too large: {:.2}MB, max: {:.2}MB", *.size as f64 / 1_048_576.0, *.limit as f64 / 1_048_576.0)]
    TooLarge { size: u64, limit: u64 },
    #[error("Unsupported file format: {0}")]
    Unsupported(String),
    #[error("File is empty")]
    Empty,
    #[error("Failed to decode base64 data: {0}")]
    Decode(String),
    #[error("Failed to load PDF: {0}")]
    Pdf(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Document worker failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
