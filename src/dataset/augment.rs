//! Random geometric augmentation for training images.
//!
//! One affine transform (rotation, shear, zoom, shift, optional horizontal
//! flip) is drawn per image and applied by inverse mapping with
//! nearest-neighbour sampling. Source coordinates that fall outside the image
//! are clamped to the closest edge pixel ("nearest" fill).

use image::RgbImage;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Augmentation ranges; every transform is sampled uniformly within ±range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Augmentation {
    pub enabled: bool,
    /// Degrees.
    pub rotation_range: f64,
    /// Fraction of the width.
    pub width_shift_range: f64,
    /// Fraction of the height.
    pub height_shift_range: f64,
    /// Shear intensity (radians).
    pub shear_range: f64,
    /// Zoom factor drawn from [1 - zoom_range, 1 + zoom_range].
    pub zoom_range: f64,
    pub horizontal_flip: bool,
}

impl Default for Augmentation {
    fn default() -> Self {
        Augmentation {
            enabled: true,
            rotation_range: 30.0,
            width_shift_range: 0.2,
            height_shift_range: 0.2,
            shear_range: 0.2,
            zoom_range: 0.2,
            horizontal_flip: true,
        }
    }
}

fn symmetric<R: Rng + ?Sized>(rng: &mut R, range: f64) -> f64 {
    if range > 0.0 { rng.gen_range(-range..=range) } else { 0.0 }
}

impl Augmentation {
    pub fn disabled() -> Self {
        Augmentation { enabled: false, ..Augmentation::default() }
    }

    /// Returns a randomly transformed copy of `img`.
    pub fn apply<R: Rng + ?Sized>(&self, img: &RgbImage, rng: &mut R) -> RgbImage {
        if !self.enabled {
            return img.clone();
        }
        let (w, h) = img.dimensions();
        let (wf, hf) = (w as f64, h as f64);

        let theta = symmetric(rng, self.rotation_range).to_radians();
        let shear = symmetric(rng, self.shear_range);
        let zoom_x = 1.0 + symmetric(rng, self.zoom_range);
        let zoom_y = 1.0 + symmetric(rng, self.zoom_range);
        let tx = symmetric(rng, self.width_shift_range) * wf;
        let ty = symmetric(rng, self.height_shift_range) * hf;
        let flip = self.horizontal_flip && rng.gen_bool(0.5);

        // Output pixel → source pixel: undo shift, then rotation·shear·zoom
        // about the image centre.
        let (cx, cy) = ((wf - 1.0) / 2.0, (hf - 1.0) / 2.0);
        let (sin, cos) = theta.sin_cos();
        let mut out = RgbImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let ox = if flip { wf - 1.0 - x as f64 } else { x as f64 };
                let dx = ox - cx - tx;
                let dy = y as f64 - cy - ty;
                // rotate by -theta
                let rx = cos * dx + sin * dy;
                let ry = -sin * dx + cos * dy;
                // unshear, unzoom
                let sx = (rx - shear.tan() * ry) / zoom_x + cx;
                let sy = ry / zoom_y + cy;
                let px = sx.round().clamp(0.0, wf - 1.0) as u32;
                let py = sy.round().clamp(0.0, hf - 1.0) as u32;
                out.put_pixel(x, y, *img.get_pixel(px, py));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::{rngs::StdRng, SeedableRng};

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 20) as u8, (y * 20) as u8, 7]))
    }

    #[test]
    fn zero_ranges_without_flip_is_identity() {
        let aug = Augmentation {
            enabled: true,
            rotation_range: 0.0,
            width_shift_range: 0.0,
            height_shift_range: 0.0,
            shear_range: 0.0,
            zoom_range: 0.0,
            horizontal_flip: false,
        };
        let img = gradient(6, 5);
        assert_eq!(aug.apply(&img, &mut StdRng::seed_from_u64(1)), img);
    }

    #[test]
    fn output_keeps_shape_and_palette() {
        let img = gradient(8, 8);
        let out = Augmentation::default().apply(&img, &mut StdRng::seed_from_u64(9));
        assert_eq!(out.dimensions(), (8, 8));
        // Nearest sampling never invents colours.
        assert!(out.pixels().all(|p| img.pixels().any(|q| q == p)));
    }

    #[test]
    fn disabled_returns_copy() {
        let img = gradient(3, 3);
        assert_eq!(Augmentation::disabled().apply(&img, &mut StdRng::seed_from_u64(0)), img);
    }
}
