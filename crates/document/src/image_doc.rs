use finvo_ocr::{sha256_hex, DynOcrPipeline, OcrOutput};
use image::{ColorType, DynamicImage, ImageFormat, ImageReader};
use serde_json::Value;
use std::io::Cursor;
use tracing::{debug, warn};

use crate::document::{Document, PageImage};
use crate::formats::{mime_for_extension, FileKind};

/// One document for one image file. Neither a bad header nor failed OCR is
/// fatal: the document degrades to what could be read.
pub(crate) fn load_image(bytes: &[u8], ext: &str, source: &str, ocr: &DynOcrPipeline) -> Document {
    let mut doc = Document::new("")
        .with_meta("source", source)
        .with_meta("file_type", FileKind::Image.as_str());

    let decoded = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()
        .and_then(|r| r.format().map(|f| (f, r)))
        .and_then(|(format, r)| r.decode().ok().map(|img| (format, img)));

    match &decoded {
        Some((format, img)) => {
            doc.set_meta("width", img.width());
            doc.set_meta("height", img.height());
            doc.set_meta("format", format_name(*format));
            doc.set_meta("mode", mode_name(img.color()));
            doc.set_meta("file_extension", ext);
        }
        None => {
            warn!(source, "Failed to extract image metadata");
            doc.set_meta("file_extension", ext);
        }
    }
    doc.set_meta("sha256", sha256_hex(bytes));
    doc.images.push(vision_image(bytes, ext, decoded.as_ref()));

    match ocr.run(bytes) {
        Ok(out) => apply_ocr(&mut doc, out),
        Err(e) => {
            warn!(source, error = %e, "OCR failed; continuing without text");
            doc.set_meta("ocr_error", e.to_string());
        }
    }
    doc
}

pub(crate) fn apply_ocr(doc: &mut Document, out: OcrOutput) {
    debug!(lines = out.line_count, strategies = ?out.strategies_used, "OCR text attached");
    doc.set_meta(
        "ocr_strategies",
        Value::from(out.strategies_used.iter().map(|s| Value::from(*s)).collect::<Vec<_>>()),
    );
    doc.set_meta("ocr_line_count", out.line_count);
    doc.set_meta("ocr_confidence", f64::from(out.hints.confidence));
    doc.content = out.text;
    doc.hints = Some(out.hints);
}

/// Formats vision models accept are passed through; the rest become PNG.
fn vision_image(bytes: &[u8], ext: &str, decoded: Option<&(ImageFormat, DynamicImage)>) -> PageImage {
    match decoded {
        Some((format @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif | ImageFormat::WebP), _)) => {
            PageImage {
                data: bytes.to_vec(),
                mime_type: format_mime(*format),
            }
        }
        Some((_, img)) => match encode_png(img) {
            Some(data) => PageImage { data, mime_type: "image/png" },
            None => PageImage { data: bytes.to_vec(), mime_type: mime_for_extension(ext) },
        },
        None => PageImage {
            data: bytes.to_vec(),
            mime_type: mime_for_extension(ext),
        },
    }
}

pub(crate) fn encode_png(img: &DynamicImage) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).ok()?;
    Some(buf)
}

fn format_name(format: ImageFormat) -> String {
    format!("{format:?}").to_uppercase()
}

fn format_mime(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Pillow-style mode names.
fn mode_name(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 => "L",
        ColorType::L16 => "I;16",
        ColorType::La8 | ColorType::La16 => "LA",
        ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => "RGB",
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => "RGBA",
        _ => "unknown",
    }
}
