//! Upload normalization: fixed square cover crop, forced alpha, lossless PNG.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat};

/// Target edge length for normalized images, matching the provider's
/// expected 1024x1024 input.
pub const TARGET_DIM: u32 = 1024;

/// Decode an uploaded image, cover-fit it to a `dim` square (cropping the
/// overflow), force an alpha channel, and re-encode as PNG.
pub fn normalize_to_png(bytes: &[u8], dim: u32) -> Result<Vec<u8>, ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    let resized = decoded.resize_to_fill(dim, dim, FilterType::Lanczos3);
    let rgba = DynamicImage::ImageRgba8(resized.to_rgba8());

    let mut out = Cursor::new(Vec::new());
    rgba.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
