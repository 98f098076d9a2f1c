//! PDF pages into documents: text layer via lopdf, embedded images kept for
//! vision and OCR'd when a page has no real text layer.

use finvo_ocr::DynOcrPipeline;
use image::{DynamicImage, GrayImage, RgbImage};
use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Object, ObjectId, Stream};
use std::io::Read;
use tracing::{debug, info, trace, warn};

use crate::document::{Document, PageImage};
use crate::error::LoaderError;
use crate::formats::FileKind;
use crate::image_doc::{apply_ocr, encode_png};

pub(crate) fn load_pdf(bytes: &[u8], source: &str, ocr: &DynOcrPipeline) -> Result<Vec<Document>, LoaderError> {
    let mut pdf = lopdf::Document::load_mem(bytes).map_err(|e| LoaderError::Pdf(e.to_string()))?;

    if pdf.is_encrypted() {
        if pdf.decrypt("").is_err() {
            return Err(LoaderError::Pdf("document is password protected".into()));
        }
        debug!(source, "Decrypted PDF with empty password");
    }

    let pages = pdf.get_pages();
    if pages.is_empty() {
        return Err(LoaderError::Pdf("document has no pages".into()));
    }
    let total_pages = pages.len();

    let mut documents = Vec::with_capacity(total_pages);
    for (&number, &page_id) in &pages {
        let text = pdf.extract_text(&[number]).unwrap_or_else(|e| {
            trace!(page = number, error = %e, "No extractable text on page");
            String::new()
        });
        let images = page_images(&pdf, page_id);

        let mut doc = Document::new(text.trim())
            .with_meta("source", source)
            .with_meta("file_type", FileKind::Pdf.as_str())
            .with_meta("page_number", number)
            .with_meta("total_pages", total_pages)
            .with_meta("image_count", images.len());

        let text_source = if doc.has_usable_text() {
            "pdf_text"
        } else if ocr_page_images(&mut doc, &images, ocr) {
            "ocr"
        } else {
            "none"
        };
        doc.set_meta("text_source", text_source);
        doc.images = images;
        documents.push(doc);
    }

    info!(source, pages = total_pages, "Loaded PDF");
    Ok(documents)
}

/// OCR each embedded image; the page text becomes the merged output.
/// Returns whether any image produced text.
fn ocr_page_images(doc: &mut Document, images: &[PageImage], ocr: &DynOcrPipeline) -> bool {
    let mut texts = Vec::new();
    for image in images {
        match ocr.run(&image.data) {
            Ok(out) if !out.text.is_empty() => {
                texts.push(out.text.clone());
                if doc.hints.is_none() {
                    apply_ocr(doc, out);
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "OCR failed on embedded PDF image");
                doc.set_meta("ocr_error", e.to_string());
            }
        }
    }
    if texts.is_empty() {
        return false;
    }
    doc.content = texts.join("\n");
    true
}

/// Image XObjects reachable from a page's (possibly inherited) resources.
fn page_images(pdf: &lopdf::Document, page_id: ObjectId) -> Vec<PageImage> {
    let Some(resources) = page_resources(pdf, page_id) else {
        return Vec::new();
    };
    let Ok((_, Object::Dictionary(xobjects))) = resources
        .get(b"XObject")
        .and_then(|x| pdf.dereference(x))
    else {
        return Vec::new();
    };

    xobjects
        .iter()
        .filter_map(|(_, obj)| pdf.dereference(obj).ok())
        .filter_map(|(_, obj)| image_from_object(pdf, obj))
        .collect()
}

/// Largest raster image decoded from a PDF, in pixels.
const MAX_IMAGE_PIXELS: usize = 40_000_000;

fn image_from_object(pdf: &lopdf::Document, obj: &Object) -> Option<PageImage> {
    let Object::Stream(stream) = obj else {
        return None;
    };
    let dict = &stream.dict;
    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
        return None;
    }
    let width = dimension(dict, b"Width")?;
    let height = dimension(dict, b"Height")?;

    let filter = dict.get(b"Filter").ok().and_then(|f| match f {
        Object::Name(name) => Some(name.as_slice()),
        Object::Array(arr) if arr.len() == 1 => arr.first().and_then(|o| o.as_name().ok()),
        Object::Array(_) => Some(b"Chained".as_slice()),
        _ => None,
    });
    match filter {
        // JPEG: the raw stream is already a complete file.
        Some(b"DCTDecode") => {
            return Some(PageImage {
                data: stream.content.clone(),
                mime_type: "image/jpeg",
            })
        }
        None | Some(b"FlateDecode") => {}
        Some(other) => {
            trace!(width, height, filter = %String::from_utf8_lossy(other), "Skipping unsupported image encoding");
            return None;
        }
    }

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);
    if bits != 8 {
        return None;
    }
    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| match o {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            Object::Reference(r) => pdf.get_object(*r).ok().and_then(|o| o.as_name().ok()),
            _ => None,
        })
        .unwrap_or(b"DeviceRGB");
    let components = match color_space {
        b"DeviceRGB" | b"RGB" => 3,
        b"DeviceGray" | b"G" => 1,
        _ => return None,
    };

    let pixels = (width as usize).checked_mul(height as usize)?;
    if pixels > MAX_IMAGE_PIXELS {
        warn!(width, height, "Skipping oversized PDF image");
        return None;
    }
    let expected = pixels * components;
    let data = raw_samples(stream, filter.is_some(), expected)?;
    if data.len() < expected {
        return None;
    }
    let img = if components == 3 {
        RgbImage::from_raw(width, height, data[..expected].to_vec()).map(DynamicImage::ImageRgb8)
    } else {
        GrayImage::from_raw(width, height, data[..expected].to_vec()).map(DynamicImage::ImageLuma8)
    }?;

    Some(PageImage {
        data: encode_png(&img)?,
        mime_type: "image/png",
    })
}

fn dimension(dict: &Dictionary, key: &[u8]) -> Option<u32> {
    let value = dict.get(key).ok()?.as_i64().ok()?;
    u32::try_from(value).ok().filter(|&v| v > 0)
}

/// Image samples, inflating at most `limit` bytes. Predictor-encoded
/// streams are not supported.
fn raw_samples(stream: &Stream, deflated: bool, limit: usize) -> Option<Vec<u8>> {
    if !deflated {
        return Some(stream.content.clone());
    }
    if stream.dict.get(b"DecodeParms").is_ok() {
        trace!("Skipping predictor-encoded image");
        return None;
    }
    let mut out = Vec::with_capacity(limit.min(stream.content.len().saturating_mul(4)));
    ZlibDecoder::new(stream.content.as_slice())
        .take(limit as u64)
        .read_to_end(&mut out)
        .ok()?;
    Some(out)
}

/// Resources on the page itself or the nearest ancestor that has them.
fn page_resources(pdf: &lopdf::Document, node_id: ObjectId) -> Option<Dictionary> {
    let Object::Dictionary(dict) = pdf.get_object(node_id).ok()? else {
        return None;
    };
    if let Ok((_, Object::Dictionary(res))) = dict.get(b"Resources").and_then(|r| pdf.dereference(r)) {
        return Some(res.clone());
    }
    match dict.get(b"Parent") {
        Ok(Object::Reference(parent_id)) => page_resources(pdf, *parent_id),
        _ => None,
    }
}
