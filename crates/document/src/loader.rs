use base64::Engine as _;
use finvo_ocr::DynOcrPipeline;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use crate::document::Document;
use crate::error::LoaderError;
use crate::formats::{extension_of, mime_for_extension, supported_formats, FileKind};
use crate::image_doc::load_image;
use crate::pdf::load_pdf;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    pub max_file_size: u64,
}

impl LoaderConfig {
    pub fn from_megabytes(mb: u64) -> Self {
        Self { max_file_size: mb * 1024 * 1024 }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { max_file_size: DEFAULT_MAX_FILE_SIZE }
    }
}

/// Turns files into [`Document`]s. Decoding and OCR run on the blocking pool.
#[derive(Clone)]
pub struct DocumentLoader {
    config: LoaderConfig,
    ocr: Arc<DynOcrPipeline>,
}

impl DocumentLoader {
    pub fn new(config: LoaderConfig, ocr: Arc<DynOcrPipeline>) -> Self {
        info!(max_file_size = config.max_file_size, ocr = ocr.backend_name(), "Document loader initialized");
        Self { config, ocr }
    }

    pub fn max_file_size(&self) -> u64 {
        self.config.max_file_size
    }

    pub fn ocr_backend(&self) -> &'static str {
        self.ocr.backend_name()
    }

    pub fn supported_formats(&self) -> Vec<String> {
        supported_formats()
    }

    pub async fn load_from_path(&self, path: &Path) -> Result<Vec<Document>, LoaderError> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoaderError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        self.check_size(meta.len())?;

        let ext = extension_of(path);
        let kind = FileKind::from_extension(&ext).ok_or_else(|| LoaderError::Unsupported(ext.clone()))?;
        let bytes = tokio::fs::read(path).await?;
        self.parse(bytes, kind, ext, path.display().to_string()).await
    }

    pub async fn load_from_bytes(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: Option<&str>,
    ) -> Result<Vec<Document>, LoaderError> {
        if bytes.is_empty() {
            return Err(LoaderError::Empty);
        }
        let size = bytes.len() as u64;
        self.check_size(size)?;

        let ext = extension_of(filename);
        let kind = FileKind::from_extension(&ext).ok_or_else(|| LoaderError::Unsupported(ext.clone()))?;
        let mime = mime_type
            .map(str::to_string)
            .unwrap_or_else(|| mime_for_extension(&ext).to_string());

        let mut documents = self.parse(bytes, kind, ext, filename.to_string()).await?;
        for doc in &mut documents {
            doc.set_meta("original_filename", filename);
            doc.set_meta("file_size", size);
            doc.set_meta("mime_type", mime.as_str());
        }
        Ok(documents)
    }

    /// Accepts bare base64 or a `data:<mime>;base64,` URL.
    pub async fn load_from_base64(&self, data: &str, filename: &str) -> Result<Vec<Document>, LoaderError> {
        let (mime, payload) = split_data_url(data);
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| LoaderError::Decode(e.to_string()))?;
        self.load_from_bytes(bytes, filename, mime).await
    }

    fn check_size(&self, size: u64) -> Result<(), LoaderError> {
        if size > self.config.max_file_size {
            return Err(LoaderError::TooLarge { size, limit: self.config.max_file_size });
        }
        Ok(())
    }

    async fn parse(
        &self,
        bytes: Vec<u8>,
        kind: FileKind,
        ext: String,
        source: String,
    ) -> Result<Vec<Document>, LoaderError> {
        let ocr = Arc::clone(&self.ocr);
        let result = tokio::task::spawn_blocking(move || match kind {
            FileKind::Pdf => load_pdf(&bytes, &source, &ocr),
            FileKind::Image => Ok(vec![load_image(&bytes, &ext, &source, &ocr)]),
        })
        .await?;

        match &result {
            Ok(docs) => info!(kind = kind.as_str(), documents = docs.len(), "Loaded document"),
            Err(e) => error!(kind = kind.as_str(), error = %e, "Document loading failed"),
        }
        result
    }
}

fn split_data_url(data: &str) -> (Option<&str>, &str) {
    let data = data.trim();
    let Some(rest) = data.strip_prefix("data:") else {
        return (None, data);
    };
    match rest.split_once(',') {
        Some((header, payload)) => {
            let mime = header.split(';').next().filter(|m| !m.is_empty());
            (mime, payload)
        }
        None => (None, rest),
    }
}
