use std::path::Path;

pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".tiff", ".tif"];
pub const PDF_EXTENSIONS: &[&str] = &[".pdf"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Pdf,
}

impl FileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Pdf => "pdf",
        }
    }

    /// Classify a lower-cased, dot-prefixed extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        if PDF_EXTENSIONS.contains(&ext) {
            Some(FileKind::Pdf)
        } else if IMAGE_EXTENSIONS.contains(&ext) {
            Some(FileKind::Image)
        } else {
            None
        }
    }
}

/// Lower-cased extension with its leading dot (`".jpg"`), or `""` when absent.
pub fn extension_of(name: impl AsRef<Path>) -> String {
    name.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

pub fn supported_formats() -> Vec<String> {
    let mut all: Vec<String> = IMAGE_EXTENSIONS
        .iter()
        .chain(PDF_EXTENSIONS)
        .map(|e| e.to_string())
        .collect();
    all.sort();
    all
}

pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".bmp" => "image/bmp",
        ".webp" => "image/webp",
        ".tiff" | ".tif" => "image/tiff",
        ".pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
