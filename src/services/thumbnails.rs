//! Thumbnail derivation for uploaded images.
//!
//! Every image upload produces a thumbnail alongside the original. The
//! thumbnail fits within a fixed 200x200 box preserving aspect ratio,
//! never upscales, and is always JPEG-encoded regardless of input format.

use image::{DynamicImage, codecs::jpeg::JpegEncoder, imageops::FilterType};
use std::io::Cursor;
use thiserror::Error;

/// Bounding box for derived thumbnails, in pixels.
pub const THUMBNAIL_BOX: u32 = 200;

const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("could not process image: {0}")]
    Image(#[from] image::ImageError),
}

/// Target dimensions for an image fit within a `max_size` square.
///
/// If the image already fits, it is kept at original size (no upscaling);
/// otherwise the larger dimension is clamped to `max_size` and the other
/// scaled to preserve aspect ratio.
pub fn fit_within(width: u32, height: u32, max_size: u32) -> (u32, u32) {
    if width <= max_size && height <= max_size {
        return (width, height);
    }
    if width > height {
        let scaled = (max_size as f64 * height as f64 / width as f64) as u32;
        (max_size, scaled.max(1))
    } else {
        let scaled = (max_size as f64 * width as f64 / height as f64) as u32;
        (scaled.max(1), max_size)
    }
}

/// Decode an uploaded image and produce its JPEG thumbnail bytes.
pub fn derive_thumbnail(original: &[u8]) -> Result<Vec<u8>, ThumbnailError> {
    let img = image::load_from_memory(original)?;
    let (width, height) = (img.width(), img.height());
    let (target_w, target_h) = fit_within(width, height, THUMBNAIL_BOX);

    let resized = if (target_w, target_h) == (width, height) {
        img
    } else {
        img.resize_exact(target_w, target_h, FilterType::Triangle)
    };

    // JPEG has no alpha channel; flatten before encoding.
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};

    #[test]
    fn small_images_are_not_upscaled() {
        assert_eq!(fit_within(120, 80, 200), (120, 80));
        assert_eq!(fit_within(200, 200, 200), (200, 200));
    }

    #[test]
    fn landscape_clamps_width() {
        let (w, h) = fit_within(400, 200, 200);
        assert_eq!(w, 200);
        assert_eq!(h, 100);
    }

    #[test]
    fn portrait_clamps_height() {
        let (w, h) = fit_within(300, 600, 200);
        assert_eq!(h, 200);
        assert_eq!(w, 100);
    }

    #[test]
    fn extreme_aspect_ratio_never_hits_zero() {
        let (w, h) = fit_within(10_000, 1, 200);
        assert_eq!(w, 200);
        assert_eq!(h, 1);
    }

    #[test]
    fn thumbnail_of_large_png_is_jpeg_within_box() {
        let mut buf = Cursor::new(Vec::new());
        RgbaImage::from_pixel(400, 300, image::Rgba([10, 200, 30, 255]))
            .write_to(&mut buf, ImageFormat::Png)
            .expect("encode png");

        let thumb = derive_thumbnail(&buf.into_inner()).expect("derive");
        let decoded = image::load_from_memory(&thumb).expect("decode thumb");
        assert_eq!(decoded.width(), 200);
        assert_eq!(decoded.height(), 150);
        assert_eq!(
            image::guess_format(&thumb).expect("format"),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn garbage_bytes_are_an_error() {
        assert!(derive_thumbnail(b"not an image").is_err());
    }
}
