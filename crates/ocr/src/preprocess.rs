use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
}

/// Fraction of the page height treated as the header (logo, merchant block).
pub const HEADER_FRACTION: f32 = 0.25;

#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessOptions {
    /// Images larger than this on either side are scaled down to fit.
    pub max_dimension: u32,
    /// Images narrower than this are scaled up by `upscale_factor`.
    pub min_width: u32,
    pub upscale_factor: u32,
    /// Linear contrast gain around mid-gray; 1.0 disables it.
    pub contrast_factor: f32,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            max_dimension: 2800,
            min_width: 1000,
            upscale_factor: 2,
            contrast_factor: 1.5,
        }
    }
}

/// Part of the page a strategy looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Full,
    Header,
    Body,
}

pub fn load(data: &[u8]) -> Result<DynamicImage, PreprocessError> {
    Ok(image::load_from_memory(data)?)
}

/// Resize, grayscale, stretch, enhance.
pub fn normalize(img: DynamicImage, opts: &PreprocessOptions) -> GrayImage {
    let img = if img.width() > opts.max_dimension || img.height() > opts.max_dimension {
        img.resize(opts.max_dimension, opts.max_dimension, FilterType::Lanczos3)
    } else if img.width() < opts.min_width && opts.upscale_factor > 1 {
        // Thermal receipts photographed small; Tesseract wants ~30px glyphs.
        let w = (img.width() * opts.upscale_factor).min(opts.max_dimension);
        let h = (img.height() * opts.upscale_factor).min(opts.max_dimension);
        img.resize(w, h, FilterType::CatmullRom)
    } else {
        img
    };

    let stretched = stretch_contrast(img.to_luma8());
    if (opts.contrast_factor - 1.0).abs() > f32::EPSILON {
        enhance_contrast(&stretched, opts.contrast_factor)
    } else {
        stretched
    }
}

/// Min/max contrast stretch to the full 0..=255 range.
pub fn stretch_contrast(gray: GrayImage) -> GrayImage {
    let (min_px, max_px) = gray
        .pixels()
        .fold((255u8, 0u8), |(mn, mx), p| (mn.min(p[0]), mx.max(p[0])));

    if max_px <= min_px {
        return gray;
    }

    let range = (max_px - min_px) as u32;
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let p = gray.get_pixel(x, y)[0];
        Luma([((p - min_px) as u32 * 255 / range) as u8])
    })
}

pub fn enhance_contrast(gray: &GrayImage, factor: f32) -> GrayImage {
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let p = gray.get_pixel(x, y)[0] as f32;
        Luma([(128.0 + (p - 128.0) * factor).round().clamp(0.0, 255.0) as u8])
    })
}

/// Crop to a region. Crops that would be empty fall back to the full image.
pub fn crop(gray: &GrayImage, region: Region) -> GrayImage {
    let (w, h) = gray.dimensions();
    let header_h = (h as f32 * HEADER_FRACTION).round() as u32;
    let (y, crop_h) = match region {
        Region::Full => return gray.clone(),
        Region::Header => (0, header_h),
        Region::Body => (header_h, h.saturating_sub(header_h)),
    };
    if w == 0 || crop_h == 0 {
        return gray.clone();
    }
    imageops::crop_imm(gray, 0, y, w, crop_h).to_image()
}

pub fn encode_png(gray: &GrayImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    gray.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode raw image bytes (JPEG / PNG / WEBP / …) and return normalized PNG bytes.
pub fn prepare_for_ocr_from_bytes(
    data: &[u8],
    opts: &PreprocessOptions,
) -> Result<Vec<u8>, PreprocessError> {
    encode_png(&normalize(load(data)?, opts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_gray(width: u32, height: u32, value: u8) -> DynamicImage {
        let img: GrayImage = ImageBuffer::from_fn(width, height, |_, _| Luma([value]));
        DynamicImage::ImageLuma8(img)
    }

    fn gradient_gray(width: u32, height: u32) -> DynamicImage {
        let img: GrayImage =
            ImageBuffer::from_fn(width, height, |x, _| Luma([(x * 255 / width) as u8]));
        DynamicImage::ImageLuma8(img)
    }

    fn no_resize() -> PreprocessOptions {
        PreprocessOptions {
            min_width: 0,
            ..Default::default()
        }
    }

    #[test]
    fn uniform_image_survives() {
        let result = normalize(solid_gray(10, 10, 128), &no_resize());
        assert_eq!(result.dimensions(), (10, 10));
        assert!(result.pixels().all(|p| p[0] == 128));
    }

    #[test]
    fn gradient_stretches_to_full_range() {
        let result = stretch_contrast(gradient_gray(256, 1).to_luma8());
        let min = result.pixels().map(|p| p[0]).min().unwrap();
        let max = result.pixels().map(|p| p[0]).max().unwrap();
        assert_eq!((min, max), (0, 255));
    }

    #[test]
    fn narrow_image_is_upscaled() {
        let result = normalize(solid_gray(400, 300, 90), &PreprocessOptions::default());
        assert_eq!(result.dimensions(), (800, 600));
    }

    #[test]
    fn large_image_is_resized() {
        let img: GrayImage = ImageBuffer::from_fn(3000, 3000, |_, _| Luma([200u8]));
        let result = normalize(DynamicImage::ImageLuma8(img), &PreprocessOptions::default());
        assert!(result.width() <= 2800 && result.height() <= 2800);
    }

    #[test]
    fn contrast_enhancement_pushes_away_from_mid_gray() {
        let img: GrayImage = ImageBuffer::from_fn(2, 1, |x, _| Luma([if x == 0 { 100 } else { 156 }]));
        let out = enhance_contrast(&img, 1.5);
        assert_eq!(out.get_pixel(0, 0)[0], 86);
        assert_eq!(out.get_pixel(1, 0)[0], 170);
    }

    #[test]
    fn header_and_body_split_the_page() {
        let img: GrayImage = ImageBuffer::from_fn(40, 100, |_, y| Luma([y as u8]));
        let header = crop(&img, Region::Header);
        let body = crop(&img, Region::Body);
        assert_eq!(header.dimensions(), (40, 25));
        assert_eq!(body.dimensions(), (40, 75));
        assert_eq!(body.get_pixel(0, 0)[0], 25);
    }

    #[test]
    fn degenerate_crop_falls_back_to_full() {
        let img: GrayImage = ImageBuffer::from_fn(5, 1, |_, _| Luma([0u8]));
        // 25% of one row rounds to zero rows.
        assert_eq!(crop(&img, Region::Header).dimensions(), (5, 1));
    }

    #[test]
    fn prepare_from_bytes_produces_png_header() {
        let mut png_bytes = Vec::new();
        solid_gray(4, 4, 100)
            .write_to(&mut Cursor::new(&mut png_bytes), image::ImageFormat::Png)
            .unwrap();
        let result = prepare_for_ocr_from_bytes(&png_bytes, &PreprocessOptions::default()).unwrap();
        assert_eq!(&result[..4], b"\x89PNG");
    }

    #[test]
    fn garbage_bytes_fail_to_load() {
        assert!(matches!(
            prepare_for_ocr_from_bytes(b"not an image", &PreprocessOptions::default()),
            Err(PreprocessError::Load(_))
        ));
    }
}
