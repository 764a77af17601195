// ============================================================================
// PLACEHOLDER RASTERS — procedurally generated stand-in images
// ============================================================================
//
// Used when a new block is created without an upload and when hydration
// encounters a record with no usable `src`. Drawn directly with the image
// crate: diagonal gradient, soft highlight circles, accent border.

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::error::EditorError;
use crate::raster::encode_png_data_url;

const GRADIENT_START: [u8; 3] = [15, 23, 42]; // slate-900
const GRADIENT_END: [u8; 3] = [21, 94, 117]; // cyan-800
const BORDER_COLOR: [u8; 3] = [103, 232, 249]; // cyan-300
const BORDER_WIDTH: u32 = 4;

/// The default "new block" raster (860x520).
pub fn default_block_image() -> RgbaImage {
    let mut img = gradient_base(860, 520);
    fill_circle(&mut img, 660.0, 300.0, 170.0, [255, 255, 255], 0.08);
    stroke_rect(&mut img, 42, 42, 860 - 84, 520 - 84);
    img
}

/// The demo sample raster (1024x640).
pub fn sample_image() -> RgbaImage {
    let mut img = gradient_base(1024, 640);
    fill_circle(&mut img, 220.0, 180.0, 130.0, [255, 255, 255], 0.08);
    fill_circle(&mut img, 780.0, 360.0, 210.0, [255, 255, 255], 0.08);
    // Solid teal panel standing in for the original's "DEMO BLOCK" callout
    fill_rect(&mut img, 72, 240, 360, 220, [20, 184, 166]);
    stroke_rect(&mut img, 56, 56, 1024 - 112, 640 - 112);
    img
}

/// Data-URL form of the default block raster.
pub fn default_block_data_url() -> Result<String, EditorError> {
    encode_png_data_url(&default_block_image())
}

/// Data-URL form of the sample raster.
pub fn sample_image_data_url() -> Result<String, EditorError> {
    encode_png_data_url(&sample_image())
}

/// Diagonal linear gradient from top-left to bottom-right.
fn gradient_base(width: u32, height: u32) -> RgbaImage {
    let mut img = RgbaImage::new(width, height);
    let span = (width + height).max(1) as f32;
    let row_bytes = width as usize * 4;

    img.as_mut()
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let t = (x as f32 + y as f32) / span;
                let pi = x * 4;
                for c in 0..3 {
                    let v = GRADIENT_START[c] as f32
                        + (GRADIENT_END[c] as f32 - GRADIENT_START[c] as f32) * t;
                    row[pi + c] = v.round().clamp(0.0, 255.0) as u8;
                }
                row[pi + 3] = 255;
            }
        });
    img
}

/// Alpha-blend a filled circle onto the image.
fn fill_circle(img: &mut RgbaImage, cx: f32, cy: f32, radius: f32, color: [u8; 3], opacity: f32) {
    let (w, h) = img.dimensions();
    let x0 = ((cx - radius).floor().max(0.0)) as u32;
    let y0 = ((cy - radius).floor().max(0.0)) as u32;
    let x1 = ((cx + radius).ceil() as u32).min(w.saturating_sub(1));
    let y1 = ((cy + radius).ceil() as u32).min(h.saturating_sub(1));
    let r2 = radius * radius;

    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            if dx * dx + dy * dy > r2 {
                continue;
            }
            let px = img.get_pixel_mut(x, y);
            for c in 0..3 {
                let blended = px[c] as f32 * (1.0 - opacity) + color[c] as f32 * opacity;
                px[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Opaque filled rectangle.
fn fill_rect(img: &mut RgbaImage, x: u32, y: u32, width: u32, height: u32, color: [u8; 3]) {
    let (w, h) = img.dimensions();
    for py in y..(y + height).min(h) {
        for px in x..(x + width).min(w) {
            img.put_pixel(px, py, Rgba([color[0], color[1], color[2], 255]));
        }
    }
}

/// Accent border rectangle, `BORDER_WIDTH` pixels thick.
fn stroke_rect(img: &mut RgbaImage, x: u32, y: u32, width: u32, height: u32) {
    let color = [BORDER_COLOR[0], BORDER_COLOR[1], BORDER_COLOR[2]];
    fill_rect(img, x, y, width, BORDER_WIDTH, color);
    fill_rect(img, x, y + height.saturating_sub(BORDER_WIDTH), width, BORDER_WIDTH, color);
    fill_rect(img, x, y, BORDER_WIDTH, height, color);
    fill_rect(img, x + width.saturating_sub(BORDER_WIDTH), y, BORDER_WIDTH, height, color);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_have_expected_dimensions() {
        assert_eq!(default_block_image().dimensions(), (860, 520));
        assert_eq!(sample_image().dimensions(), (1024, 640));
    }

    #[test]
    fn placeholder_data_url_is_decodable() {
        let url = default_block_data_url().unwrap();
        let decoded = crate::raster::decode_source(&url).unwrap();
        assert_eq!(decoded.dimensions(), (860, 520));
    }
}
