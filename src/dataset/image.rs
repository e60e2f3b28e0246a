//! Image decoding and normalization.
//!
//! Images are decoded (PNG/JPEG/BMP/GIF), resized to a square of the
//! configured side, converted to RGB and scaled to [-1, 1]
//! (`x / 127.5 - 1`, the MobileNet input convention), then flattened as
//! R, G, B, R, G, B, ...

use std::path::Path;

use image::{imageops::FilterType, DynamicImage, RgbImage};

use crate::error::{PipelineError, Result};

fn resize(img: DynamicImage, size: u32) -> RgbImage {
    img.resize_exact(size, size, FilterType::Triangle).to_rgb8()
}

/// Decodes the file at `path` and resizes it to `size × size` RGB.
pub fn load_rgb(path: &Path, size: u32) -> Result<RgbImage> {
    let img = image::open(path).map_err(|e| PipelineError::Image {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(resize(img, size))
}

/// Flattens an RGB image into network input in [-1, 1].
pub fn to_input(img: &RgbImage) -> Vec<f64> {
    img.pixels()
        .flat_map(|p| p.0.iter().map(|&c| c as f64 / 127.5 - 1.0))
        .collect()
}

/// Input length for a square RGB image of side `size`.
pub fn input_len(size: u32) -> usize {
    (size as usize) * (size as usize) * 3
}
