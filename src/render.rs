// ============================================================================
// RENDERING — node descriptors, sub-rect rotation, block compositing
// ============================================================================
//
// Two halves. The descriptor half turns blocks into plain config structs the
// display layer consumes verbatim. The raster half does the CPU compositing
// used by crop previews/commits and whole-composition export: inverse-mapped
// bilinear resampling, one rayon task per output row.

use std::path::PathBuf;
use std::sync::Arc;

use ab_glyph::{Font, FontVec, ScaleFont};
use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;

use crate::block::{Block, ImageBlock, Stroke, StrokeTool, TextBlock};
use crate::log_warn;

// ===== NODE DESCRIPTORS =====

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CompositeMode {
    #[default]
    SourceOver,
    DestinationOut,
}

/// Geometry and filter state for one image node, ready for the display layer.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageNodeConfig {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub draggable: bool,
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
    pub hue: f64,
    pub cache_pixel_ratio: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextNodeConfig {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub text: String,
    pub font_size: f64,
    pub font_family: String,
    pub fill: String,
    pub draggable: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LineNodeConfig {
    pub id: String,
    pub points: Vec<f64>,
    pub stroke: String,
    pub stroke_width: f64,
    pub composite: CompositeMode,
}

/// Build the render config for an image node. Pure: same block and context
/// in, same struct out.
pub fn image_node_config(block: &ImageBlock, draggable: bool) -> ImageNodeConfig {
    ImageNodeConfig {
        id: block.id.clone(),
        x: block.x,
        y: block.y,
        width: block.width,
        height: block.height,
        rotation: block.rotation,
        scale_x: block.scale_x,
        scale_y: block.scale_y,
        draggable,
        brightness: block.brightness,
        contrast: block.contrast,
        saturation: block.saturation,
        hue: block.hue,
        cache_pixel_ratio: block.filter_cache.as_ref().map(|c| c.pixel_ratio),
    }
}

pub fn text_node_config(block: &TextBlock, draggable: bool) -> TextNodeConfig {
    TextNodeConfig {
        id: block.id.clone(),
        x: block.x,
        y: block.y,
        width: block.width,
        height: block.height,
        rotation: block.rotation,
        scale_x: block.scale_x,
        scale_y: block.scale_y,
        text: block.text.clone(),
        font_size: block.font_size,
        font_family: block.font_family.clone(),
        fill: block.fill.clone(),
        draggable,
    }
}

pub fn line_node_config(stroke: &Stroke) -> LineNodeConfig {
    LineNodeConfig {
        id: stroke.id.clone(),
        points: stroke.points.clone(),
        stroke: stroke.color.clone(),
        stroke_width: stroke.size,
        composite: match stroke.tool {
            StrokeTool::Pen => CompositeMode::SourceOver,
            StrokeTool::Erase => CompositeMode::DestinationOut,
        },
    }
}

// ===== COLOR =====

/// Parse `#rgb` or `#rrggbb`. Anything unparsable comes back opaque black.
pub fn parse_hex_color(hex: &str) -> Rgba<u8> {
    let digits = hex.trim().trim_start_matches('#');
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();

    let rgb = match digits.len() {
        3 => {
            let mut it = digits.chars();
            let expand = |c: char| channel(&format!("{c}{c}"));
            match (it.next(), it.next(), it.next()) {
                (Some(r), Some(g), Some(b)) => match (expand(r), expand(g), expand(b)) {
                    (Some(r), Some(g), Some(b)) => Some((r, g, b)),
                    _ => None,
                },
                _ => None,
            }
        }
        6 => match (
            channel(&digits[0..2]),
            channel(&digits[2..4]),
            channel(&digits[4..6]),
        ) {
            (Some(r), Some(g), Some(b)) => Some((r, g, b)),
            _ => None,
        },
        _ => None,
    };

    let (r, g, b) = rgb.unwrap_or((0, 0, 0));
    Rgba([r, g, b, 255])
}

// ===== SUB-RECT ROTATION (crop pipeline) =====

/// A rectangle in source pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SrcRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Draw `rect` of `src` into a fresh `out_w` x `out_h` surface, stretched to
/// fill it and rotated about the surface's own center by `angle` degrees.
/// Output pixels with no source coverage stay transparent.
pub fn draw_sub_image_rotated(
    src: &RgbaImage,
    rect: SrcRect,
    out_w: u32,
    out_h: u32,
    angle: f64,
) -> RgbaImage {
    let mut dst = RgbaImage::new(out_w.max(1), out_h.max(1));
    let cx = dst.width() as f32 * 0.5;
    let cy = dst.height() as f32 * 0.5;

    // Inverse rotation: walk output pixels back into un-rotated output space,
    // then through the crop-to-output stretch into source space.
    let (sin, cos) = (-(angle as f32).to_radians()).sin_cos();
    let scale_x = rect.width as f32 / dst.width() as f32;
    let scale_y = rect.height as f32 / dst.height() as f32;
    let (rx, ry) = (rect.x as f32, rect.y as f32);

    let src_w = src.width() as i32;
    let src_h = src.height() as i32;
    let src_stride = src_w as usize * 4;
    let src_raw = src.as_raw();

    let out_stride = dst.width() as usize * 4;
    let dst_w = dst.width() as usize;
    let dst_raw: &mut [u8] = dst.as_mut();

    dst_raw.par_chunks_mut(out_stride).enumerate().for_each(|(dy, row)| {
        let v = dy as f32 + 0.5 - cy;
        for dx in 0..dst_w {
            let u = dx as f32 + 0.5 - cx;
            let ux = cos * u - sin * v + cx;
            let uy = sin * u + cos * v + cy;

            let src_x = rx + ux * scale_x - 0.5;
            let src_y = ry + uy * scale_y - 0.5;

            let x0 = src_x.floor() as i32;
            let y0 = src_y.floor() as i32;
            if x0 < -1 || y0 < -1 || x0 >= src_w || y0 >= src_h {
                continue;
            }

            let fx = src_x - x0 as f32;
            let fy = src_y - y0 as f32;

            let sample = |sx: i32, sy: i32| -> [f32; 4] {
                if sx < 0 || sy < 0 || sx >= src_w || sy >= src_h {
                    [0.0; 4]
                } else {
                    let idx = sy as usize * src_stride + sx as usize * 4;
                    [
                        src_raw[idx] as f32,
                        src_raw[idx + 1] as f32,
                        src_raw[idx + 2] as f32,
                        src_raw[idx + 3] as f32,
                    ]
                }
            };

            let tl = sample(x0, y0);
            let tr = sample(x0 + 1, y0);
            let bl = sample(x0, y0 + 1);
            let br = sample(x0 + 1, y0 + 1);

            let px = dx * 4;
            for c in 0..4 {
                let top = tl[c] + (tr[c] - tl[c]) * fx;
                let bot = bl[c] + (br[c] - bl[c]) * fx;
                row[px + c] = (top + (bot - top) * fy).round().clamp(0.0, 255.0) as u8;
            }
        }
    });
    dst
}

// ===== BLOCK LAYER RASTERIZATION =====

/// Rasterize an image block in its own local space: the source raster (or
/// the filter cache, when present) stretched to the block's display size,
/// with every stroke stamped on top. Erase strokes knock alpha out.
pub fn render_image_block_layer(block: &ImageBlock) -> RgbaImage {
    let w = (block.width.round() as u32).max(1);
    let h = (block.height.round() as u32).max(1);

    let base: &RgbaImage = match &block.filter_cache {
        Some(cache) => &cache.image,
        None => &block.image,
    };
    let mut layer = if base.width() == w && base.height() == h {
        base.clone()
    } else {
        imageops::resize(base, w, h, imageops::FilterType::Triangle)
    };

    for stroke in &block.lines {
        stamp_stroke(&mut layer, stroke);
    }
    layer
}

/// Rasterize a text block in local space with word wrapping inside the box.
/// When no usable font file is found the layer stays transparent.
pub fn render_text_block_layer(block: &TextBlock) -> RgbaImage {
    let w = (block.width.round() as u32).max(1);
    let h = (block.height.round() as u32).max(1);
    let mut layer = RgbaImage::new(w, h);

    let Some(font) = load_font(&block.font_family) else {
        log_warn!("no usable font for '{}', skipping text render", block.font_family);
        return layer;
    };

    let fill = parse_hex_color(&block.fill);
    let scale = ab_glyph::PxScale::from(block.font_size as f32);
    let scaled = font.as_scaled(scale);
    let line_height = scaled.height() + scaled.line_gap();

    let mut pen_y = scaled.ascent();
    for line in wrap_text(&block.text, &scaled, block.width as f32) {
        if pen_y - scaled.ascent() >= h as f32 {
            break;
        }
        let mut pen_x = 0.0f32;
        let mut previous: Option<ab_glyph::GlyphId> = None;
        for ch in line.chars() {
            let glyph_id = scaled.glyph_id(ch);
            if let Some(prev) = previous {
                pen_x += scaled.kern(prev, glyph_id);
            }
            let glyph = glyph_id.with_scale_and_position(scale, ab_glyph::point(pen_x, pen_y));
            if let Some(outline) = font.outline_glyph(glyph) {
                let bounds = outline.px_bounds();
                outline.draw(|gx, gy, coverage| {
                    let px = bounds.min.x as i32 + gx as i32;
                    let py = bounds.min.y as i32 + gy as i32;
                    if px >= 0 && py >= 0 && (px as u32) < w && (py as u32) < h {
                        let alpha = (coverage * fill[3] as f32) as u8;
                        blend_over(
                            layer.get_pixel_mut(px as u32, py as u32),
                            Rgba([fill[0], fill[1], fill[2], alpha]),
                        );
                    }
                });
            }
            pen_x += scaled.h_advance(glyph_id);
            previous = Some(glyph_id);
        }
        pen_y += line_height;
    }
    layer
}

/// Composite a local-space layer onto `canvas` with the block's transform:
/// out = pos + R(rotation) * diag(scale_x, scale_y) * p.
pub fn composite_block_layer(
    canvas: &mut RgbaImage,
    layer: &RgbaImage,
    position: (f64, f64),
    rotation: f64,
    scale_x: f64,
    scale_y: f64,
) {
    let (sin, cos) = (rotation as f32).to_radians().sin_cos();
    let (px, py) = (position.0 as f32, position.1 as f32);
    let (sx, sy) = (scale_x as f32, scale_y as f32);
    if sx.abs() < 1e-6 || sy.abs() < 1e-6 {
        return;
    }

    let layer_w = layer.width() as i32;
    let layer_h = layer.height() as i32;
    let canvas_w = canvas.width() as usize;
    let out_stride = canvas_w * 4;
    let layer_stride = layer_w as usize * 4;
    let layer_raw = layer.as_raw();
    let canvas_raw: &mut [u8] = canvas.as_mut();

    canvas_raw.par_chunks_mut(out_stride).enumerate().for_each(|(oy, row)| {
        let dy = oy as f32 + 0.5 - py;
        for ox in 0..canvas_w {
            let dx = ox as f32 + 0.5 - px;
            // Inverse: undo rotation, then the flip signs.
            let lx = (cos * dx + sin * dy) / sx - 0.5;
            let ly = (-sin * dx + cos * dy) / sy - 0.5;

            let x0 = lx.floor() as i32;
            let y0 = ly.floor() as i32;
            if x0 < -1 || y0 < -1 || x0 >= layer_w || y0 >= layer_h {
                continue;
            }

            let fx = lx - x0 as f32;
            let fy = ly - y0 as f32;
            let sample = |sx: i32, sy: i32| -> [f32; 4] {
                if sx < 0 || sy < 0 || sx >= layer_w || sy >= layer_h {
                    [0.0; 4]
                } else {
                    let idx = sy as usize * layer_stride + sx as usize * 4;
                    [
                        layer_raw[idx] as f32,
                        layer_raw[idx + 1] as f32,
                        layer_raw[idx + 2] as f32,
                        layer_raw[idx + 3] as f32,
                    ]
                }
            };

            let tl = sample(x0, y0);
            let tr = sample(x0 + 1, y0);
            let bl = sample(x0, y0 + 1);
            let br = sample(x0 + 1, y0 + 1);

            let mut src = [0f32; 4];
            for c in 0..4 {
                let top = tl[c] + (tr[c] - tl[c]) * fx;
                let bot = bl[c] + (br[c] - bl[c]) * fx;
                src[c] = top + (bot - top) * fy;
            }

            let pi = ox * 4;
            let src_a = src[3] / 255.0;
            if src_a <= 0.0 {
                continue;
            }
            let dst_a = row[pi + 3] as f32 / 255.0;
            let out_a = src_a + dst_a * (1.0 - src_a);
            for c in 0..3 {
                let blended =
                    (src[c] * src_a + row[pi + c] as f32 * dst_a * (1.0 - src_a)) / out_a;
                row[pi + c] = blended.round().clamp(0.0, 255.0) as u8;
            }
            row[pi + 3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    });
}

/// Render the whole composition onto one surface. `background` of `None`
/// leaves uncovered pixels transparent.
pub fn render_blocks(
    blocks: &[Block],
    width: u32,
    height: u32,
    background: Option<Rgba<u8>>,
) -> RgbaImage {
    let mut canvas = RgbaImage::new(width.max(1), height.max(1));
    if let Some(color) = background {
        for pixel in canvas.pixels_mut() {
            *pixel = color;
        }
    }

    for block in blocks {
        match block {
            Block::Image(b) => {
                let layer = render_image_block_layer(b);
                composite_block_layer(
                    &mut canvas,
                    &layer,
                    (b.x, b.y),
                    b.rotation,
                    b.scale_x,
                    b.scale_y,
                );
            }
            Block::Text(b) => {
                let layer = render_text_block_layer(b);
                composite_block_layer(
                    &mut canvas,
                    &layer,
                    (b.x, b.y),
                    b.rotation,
                    b.scale_x,
                    b.scale_y,
                );
            }
        }
    }
    canvas
}

// ===== STROKE STAMPING =====

fn stamp_stroke(layer: &mut RgbaImage, stroke: &Stroke) {
    if stroke.points.len() < 2 {
        return;
    }
    let color = parse_hex_color(&stroke.color);
    let radius = (stroke.size as f32 / 2.0).max(0.5);

    let points: Vec<(f32, f32)> = stroke
        .points
        .chunks_exact(2)
        .map(|p| (p[0] as f32, p[1] as f32))
        .collect();

    if points.len() == 1 {
        stamp_dab(layer, points[0], radius, color, stroke.tool);
        return;
    }
    for pair in points.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        let distance = (x1 - x0).hypot(y1 - y0);
        let steps = (distance.ceil() as usize).max(1);
        for step in 0..=steps {
            let t = step as f32 / steps as f32;
            stamp_dab(
                layer,
                (x0 + (x1 - x0) * t, y0 + (y1 - y0) * t),
                radius,
                color,
                stroke.tool,
            );
        }
    }
}

fn stamp_dab(
    layer: &mut RgbaImage,
    center: (f32, f32),
    radius: f32,
    color: Rgba<u8>,
    tool: StrokeTool,
) {
    let (cx, cy) = center;
    let min_x = ((cx - radius).floor() as i32).max(0);
    let min_y = ((cy - radius).floor() as i32).max(0);
    let max_x = ((cx + radius).ceil() as i32).min(layer.width() as i32 - 1);
    let max_y = ((cy + radius).ceil() as i32).min(layer.height() as i32 - 1);

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let pixel = layer.get_pixel_mut(x as u32, y as u32);
            match tool {
                StrokeTool::Pen => *pixel = color,
                // destination-out: subtract coverage instead of painting.
                StrokeTool::Erase => pixel[3] = 0,
            }
        }
    }
}

fn blend_over(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    let sa = src[3] as f32 / 255.0;
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let oa = sa + da * (1.0 - sa);
    for c in 0..3 {
        let blended = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / oa;
        dst[c] = blended.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (oa * 255.0).round().clamp(0.0, 255.0) as u8;
}

// ===== FONT LOOKUP =====

/// Look for a usable TTF in the usual system locations. The requested family
/// is preferred, then a small list of ubiquitous fallbacks.
fn load_font(family: &str) -> Option<FontVec> {
    for path in font_candidates(family) {
        if let Ok(bytes) = std::fs::read(&path) {
            if let Ok(font) = FontVec::try_from_vec(bytes) {
                return Some(font);
            }
        }
    }
    None
}

fn font_candidates(family: &str) -> Vec<PathBuf> {
    let normalized = family.trim().to_lowercase().replace(' ', "");
    let roots = [
        "/usr/share/fonts",
        "/usr/local/share/fonts",
        "/Library/Fonts",
        "/System/Library/Fonts",
        "C:\\Windows\\Fonts",
    ];

    let mut candidates = Vec::new();
    for root in roots {
        candidates.push(PathBuf::from(root).join(format!("{normalized}.ttf")));
        candidates.push(PathBuf::from(root).join(format!("truetype/{normalized}.ttf")));
    }
    candidates.push(PathBuf::from(
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    ));
    candidates.push(PathBuf::from(
        "/usr/share/fonts/truetype/liberation/LiberationSerif-Regular.ttf",
    ));
    candidates.push(PathBuf::from("/usr/share/fonts/TTF/DejaVuSans.ttf"));
    candidates.push(PathBuf::from("/System/Library/Fonts/Supplemental/Georgia.ttf"));
    candidates.push(PathBuf::from("C:\\Windows\\Fonts\\georgia.ttf"));
    candidates
}

fn wrap_text<F>(text: &str, scaled: &ab_glyph::PxScaleFont<F>, max_width: f32) -> Vec<String>
where
    F: Font,
{
    let measure = |s: &str| -> f32 {
        s.chars().map(|c| scaled.h_advance(scaled.glyph_id(c))).sum()
    };

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if measure(&candidate) <= max_width || current.is_empty() {
                current = candidate;
            } else {
                lines.push(std::mem::take(&mut current));
                current = word.to_string();
            }
        }
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(width: u32, height: u32) -> RgbaImage {
        let mut img = RgbaImage::new(width, height);
        for (x, y, p) in img.enumerate_pixels_mut() {
            let v = if (x / 4 + y / 4) % 2 == 0 { 255 } else { 0 };
            *p = Rgba([v, v, v, 255]);
        }
        img
    }

    #[test]
    fn hex_parsing_handles_short_long_and_garbage() {
        assert_eq!(parse_hex_color("#0f766e"), Rgba([15, 118, 110, 255]));
        assert_eq!(parse_hex_color("#fff"), Rgba([255, 255, 255, 255]));
        assert_eq!(parse_hex_color("teal"), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn zero_rotation_sub_rect_is_a_plain_crop() {
        let src = checkerboard(64, 64);
        let rect = SrcRect { x: 8.0, y: 8.0, width: 16.0, height: 16.0 };
        let out = draw_sub_image_rotated(&src, rect, 16, 16, 0.0);
        assert_eq!(out.dimensions(), (16, 16));
        assert_eq!(out.get_pixel(4, 4), src.get_pixel(12, 12));
    }

    #[test]
    fn rotation_180_flips_the_crop() {
        let mut src = RgbaImage::new(8, 8);
        *src.get_pixel_mut(0, 0) = Rgba([255, 0, 0, 255]);
        let rect = SrcRect { x: 0.0, y: 0.0, width: 8.0, height: 8.0 };
        let out = draw_sub_image_rotated(&src, rect, 8, 8, 180.0);
        assert_eq!(*out.get_pixel(7, 7), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn erase_strokes_knock_out_alpha() {
        let mut layer = checkerboard(32, 32);
        stamp_stroke(
            &mut layer,
            &Stroke {
                id: "line-1".to_string(),
                tool: StrokeTool::Erase,
                color: "#000000".to_string(),
                size: 8.0,
                points: vec![16.0, 16.0, 16.0, 16.0],
            },
        );
        assert_eq!(layer.get_pixel(16, 16)[3], 0);
        assert_eq!(layer.get_pixel(0, 0)[3], 255);
    }

    #[test]
    fn compositing_respects_position_offset() {
        let mut canvas = RgbaImage::new(32, 32);
        let mut layer = RgbaImage::new(4, 4);
        for p in layer.pixels_mut() {
            *p = Rgba([0, 255, 0, 255]);
        }
        composite_block_layer(&mut canvas, &layer, (10.0, 10.0), 0.0, 1.0, 1.0);
        assert_eq!(canvas.get_pixel(11, 11)[1], 255);
        assert_eq!(canvas.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn descriptors_carry_erase_composite_mode() {
        let config = line_node_config(&Stroke {
            id: "line-2".to_string(),
            tool: StrokeTool::Erase,
            color: "#000000".to_string(),
            size: 22.0,
            points: vec![0.0, 0.0, 5.0, 5.0],
        });
        assert_eq!(config.composite, CompositeMode::DestinationOut);
    }
}
