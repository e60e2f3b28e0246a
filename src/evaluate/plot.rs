//! Confusion-matrix heatmap rendered straight into an RGB image.
//!
//! Cells are shaded from white (0) to dark blue (the largest count). Counts
//! and the class indices on both axes are drawn with a 3×5 bitmap digit font,
//! so no font files are needed.

use std::path::Path;

use image::{Rgb, RgbImage};

use crate::error::{PipelineError, Result};
use crate::evaluate::confusion::ConfusionMatrix;

const GLYPH_W: u32 = 3;
const GLYPH_H: u32 = 5;
const SCALE: u32 = 2;
const MIN_CELL: u32 = 28;

/// Row bitmaps (3 bits each, MSB = left column) for digits 0-9.
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([200, 200, 200]);

fn text_width(text: &str) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 { 0 } else { n * (GLYPH_W + 1) * SCALE - SCALE }
}

/// Draws decimal digits with their top-left corner at (x, y). Non-digits are skipped.
fn draw_text(img: &mut RgbImage, x: u32, y: u32, text: &str, color: Rgb<u8>) {
    let mut cursor = x;
    for ch in text.chars() {
        if let Some(d) = ch.to_digit(10) {
            let glyph = DIGITS[d as usize];
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..GLYPH_W {
                    if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                        continue;
                    }
                    for dy in 0..SCALE {
                        for dx in 0..SCALE {
                            let px = cursor + col * SCALE + dx;
                            let py = y + row as u32 * SCALE + dy;
                            if px < img.width() && py < img.height() {
                                img.put_pixel(px, py, color);
                            }
                        }
                    }
                }
            }
        }
        cursor += (GLYPH_W + 1) * SCALE;
    }
}

/// Linear white → dark-blue ramp.
fn shade(t: f64) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let lerp = |a: f64, b: f64| (a + (b - a) * t).round() as u8;
    Rgb([lerp(247.0, 8.0), lerp(251.0, 48.0), lerp(255.0, 107.0)])
}

/// Renders `matrix` as a heatmap. Rows are true classes, columns predicted
/// classes; the margin shows the class indices.
pub fn render_confusion(matrix: &ConfusionMatrix) -> RgbImage {
    let n = matrix.n_classes as u32;
    let max = matrix.max_count();
    let widest = text_width(&max.to_string()).max(text_width(&n.saturating_sub(1).to_string()));
    let cell = (widest + 4 * SCALE).max(MIN_CELL);
    let margin = cell;
    let size = margin + n * cell + 1;

    let mut img = RgbImage::from_pixel(size, size, WHITE);
    let glyph_h = GLYPH_H * SCALE;

    for i in 0..n {
        let label = i.to_string();
        let offset = margin + i * cell + (cell - text_width(&label)) / 2;
        let mid = (cell - glyph_h) / 2;
        draw_text(&mut img, offset, mid, &label, BLACK);
        draw_text(&mut img, (margin - text_width(&label)) / 2, margin + i * cell + mid, &label, BLACK);
    }

    for (r, row) in matrix.rows().iter().enumerate() {
        for (c, &count) in row.iter().enumerate() {
            let t = if max > 0 { count as f64 / max as f64 } else { 0.0 };
            let fill = shade(t);
            let x0 = margin + c as u32 * cell;
            let y0 = margin + r as u32 * cell;
            for y in y0..y0 + cell {
                for x in x0..x0 + cell {
                    let edge = x == x0 || y == y0;
                    img.put_pixel(x, y, if edge { GRID } else { fill });
                }
            }
            let text = count.to_string();
            let color = if t > 0.5 { WHITE } else { BLACK };
            draw_text(&mut img, x0 + (cell - text_width(&text)) / 2, y0 + (cell - glyph_h) / 2, &text, color);
        }
    }
    // Closing grid lines on the right and bottom.
    for i in margin..size {
        img.put_pixel(size - 1, i, GRID);
        img.put_pixel(i, size - 1, GRID);
    }
    img
}

/// Renders and writes the heatmap as PNG.
pub fn save_confusion_png(matrix: &ConfusionMatrix, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    render_confusion(matrix)
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| PipelineError::Image { path: path.to_path_buf(), reason: e.to_string() })
}
