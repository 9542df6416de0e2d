//! Image preparation for the vision request.
//! Decodes uploaded bytes, normalizes to RGB8, and downscales so the
//! longer side stays within `MAX_DIMENSION` (bounds request payload size
//! and model token cost). Output is always JPEG for the wire.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::error::RelayError;

/// Longest allowed side of an image sent to the model, in pixels.
pub const MAX_DIMENSION: u32 = 1024;

/// Decodes `bytes`, downscales if needed, and re-encodes as JPEG.
/// `kind` names the buffer ("board" or "piece") for error messages.
pub fn prepare_image(bytes: &[u8], kind: &'static str) -> Result<Vec<u8>, RelayError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|source| RelayError::InvalidImage { kind, source })?;
    let bounded = downscale(decoded);

    let rgb = DynamicImage::ImageRgb8(bounded.to_rgb8());
    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|source| RelayError::InvalidImage { kind, source })?;
    Ok(out.into_inner())
}

/// Resizes so the longer side does not exceed `MAX_DIMENSION`, preserving
/// aspect ratio with Lanczos3. Images already within bound pass through.
fn downscale(img: DynamicImage) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w <= MAX_DIMENSION && h <= MAX_DIMENSION {
        return img;
    }
    img.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3)
}
