pub mod document;
pub mod error;
pub mod formats;
mod image_doc;
pub mod loader;
mod pdf;

#[cfg(test)]
mod fixtures;

pub use document::{Document, PageImage};
pub use error::LoaderError;
pub use formats::{supported_formats, FileKind, IMAGE_EXTENSIONS, PDF_EXTENSIONS};
pub use loader::{DocumentLoader, LoaderConfig, DEFAULT_MAX_FILE_SIZE};
