// ============================================================================
// TONAL FILTERS — brightness, contrast, saturation, hue + the filter cache
// ============================================================================
//
// Tonal scalars live on the image block; applying them to pixels is deferred
// behind an explicit recache step. The cached raster is rendered at a bounded
// pixel ratio so very large blocks never blow up memory.

use std::sync::Arc;

use image::{RgbaImage, imageops};
use rayon::prelude::*;

use crate::block::ImageBlock;
use crate::number::clamp;

/// Scalars this close to zero count as "no filter".
pub const FILTER_TOLERANCE: f64 = 1e-4;

/// Longest edge, in device pixels, a cached filter raster may have.
pub const CACHE_MAX_EDGE: f64 = 1200.0;

/// A filtered raster baked at a known pixel ratio.
#[derive(Clone, Debug)]
pub struct FilterCache {
    pub pixel_ratio: f64,
    pub image: Arc<RgbaImage>,
}

/// True when at least one tonal scalar is outside the tolerance band.
pub fn has_active_filters(block: &ImageBlock) -> bool {
    block.brightness.abs() > FILTER_TOLERANCE
        || block.contrast.abs() > FILTER_TOLERANCE
        || block.saturation.abs() > FILTER_TOLERANCE
        || block.hue.abs() > FILTER_TOLERANCE
}

/// Pixel ratio for a block's filter cache: full resolution up to
/// `CACHE_MAX_EDGE` on the longest display edge, then scaled down,
/// clamped to [0.35, 1].
pub fn cache_pixel_ratio(width: f64, height: f64) -> f64 {
    let longest = width.max(height).round().max(1.0);
    clamp(CACHE_MAX_EDGE / longest, 0.35, 1.0)
}

/// Render a block's source raster with its tonal scalars applied, at the
/// block's display size times the cache pixel ratio.
pub fn render_filtered(block: &ImageBlock) -> FilterCache {
    let pixel_ratio = cache_pixel_ratio(block.width, block.height);
    let out_w = ((block.width * pixel_ratio).round() as u32).max(1);
    let out_h = ((block.height * pixel_ratio).round() as u32).max(1);

    let resized = if block.image.width() == out_w && block.image.height() == out_h {
        (*block.image).clone()
    } else {
        imageops::resize(&*block.image, out_w, out_h, imageops::FilterType::Triangle)
    };

    let brightness = block.brightness as f32;
    let contrast_adjust = {
        let c = block.contrast as f32;
        ((c + 100.0) / 100.0).powi(2)
    };
    let saturation = block.saturation as f32;
    let hue_shift = (block.hue as f32) / 360.0;
    let tonal_active = has_active_filters(block);

    let filtered = if tonal_active {
        apply_pixel_transform(&resized, |r, g, b, a| {
            // Brighten: uniform offset in 8-bit space.
            let mut r = r + brightness * 255.0;
            let mut g = g + brightness * 255.0;
            let mut b = b + brightness * 255.0;

            // Contrast: expand or compress around mid-grey.
            r = ((r / 255.0 - 0.5) * contrast_adjust + 0.5) * 255.0;
            g = ((g / 255.0 - 0.5) * contrast_adjust + 0.5) * 255.0;
            b = ((b / 255.0 - 0.5) * contrast_adjust + 0.5) * 255.0;

            if hue_shift.abs() > 1e-6 || saturation.abs() > 1e-6 {
                let rn = (r / 255.0).clamp(0.0, 1.0);
                let gn = (g / 255.0).clamp(0.0, 1.0);
                let bn = (b / 255.0).clamp(0.0, 1.0);
                let (h, s, l) = rgb_to_hsl(rn, gn, bn);
                let nh = (h + hue_shift).rem_euclid(1.0);
                let ns = (s * (1.0 + saturation)).clamp(0.0, 1.0);
                let (nr, ng, nb) = hsl_to_rgb(nh, ns, l);
                r = nr * 255.0;
                g = ng * 255.0;
                b = nb * 255.0;
            }

            (r, g, b, a)
        })
    } else {
        resized
    };

    FilterCache {
        pixel_ratio,
        image: Arc::new(filtered),
    }
}

/// Rebuild or drop a block's filter cache to match its current scalars.
pub fn recache_image_block(block: &mut ImageBlock) {
    if has_active_filters(block) {
        block.filter_cache = Some(render_filtered(block));
    } else {
        block.filter_cache = None;
    }
}

/// Apply a per-pixel transform over an RGBA raster, one rayon task per row.
/// `transform` receives (r, g, b, a) as f32 and returns the same.
fn apply_pixel_transform<F>(src: &RgbaImage, transform: F) -> RgbaImage
where
    F: Fn(f32, f32, f32, f32) -> (f32, f32, f32, f32) + Sync,
{
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 {
        return src.clone();
    }

    let src_raw = src.as_raw();
    let mut dst_raw = vec![0u8; w * h * 4];
    let stride = w * 4;

    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * stride..(y + 1) * stride];
        for x in 0..w {
            let pi = x * 4;
            let r = row_in[pi] as f32;
            let g = row_in[pi + 1] as f32;
            let b = row_in[pi + 2] as f32;
            let a = row_in[pi + 3] as f32;
            let (nr, ng, nb, na) = transform(r, g, b, a);
            row_out[pi] = nr.round().clamp(0.0, 255.0) as u8;
            row_out[pi + 1] = ng.round().clamp(0.0, 255.0) as u8;
            row_out[pi + 2] = nb.round().clamp(0.0, 255.0) as u8;
            row_out[pi + 3] = na.round().clamp(0.0, 255.0) as u8;
        }
    });

    RgbaImage::from_raw(w as u32, h as u32, dst_raw).unwrap_or_else(|| src.clone())
}

/// RGB (0..1) → HSL (all 0..1).
pub fn rgb_to_hsl(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if (max - min).abs() < 1e-6 {
        return (0.0, 0.0, l);
    }

    let d = max - min;
    let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };

    let h = if (max - r).abs() < 1e-6 {
        let mut h = (g - b) / d;
        if h < 0.0 { h += 6.0; }
        h / 6.0
    } else if (max - g).abs() < 1e-6 {
        ((b - r) / d + 2.0) / 6.0
    } else {
        ((r - g) / d + 4.0) / 6.0
    };

    (h, s, l)
}

/// HSL (all 0..1) → RGB (0..1).
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s.abs() < 1e-6 {
        return (l, l, l);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    let r = hue_to_rgb(p, q, h + 1.0 / 3.0);
    let g = hue_to_rgb(p, q, h);
    let b = hue_to_rgb(p, q, h - 1.0 / 3.0);

    (r, g, b)
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 { t += 1.0; }
    if t > 1.0 { t -= 1.0; }
    if t < 1.0 / 6.0 { return p + (q - p) * 6.0 * t; }
    if t < 1.0 / 2.0 { return q; }
    if t < 2.0 / 3.0 { return p + (q - p) * (2.0 / 3.0 - t) * 6.0; }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::Arc;

    fn block_with_filters(brightness: f64) -> ImageBlock {
        let mut img = RgbaImage::new(4, 4);
        for p in img.pixels_mut() {
            *p = Rgba([100, 100, 100, 255]);
        }
        let mut b = ImageBlock::from_raster(
            "img-1".to_string(),
            "Image",
            String::new(),
            Arc::new(img),
            (0.0, 0.0),
        );
        b.width = 4.0;
        b.height = 4.0;
        b.brightness = brightness;
        b
    }

    #[test]
    fn scalars_inside_tolerance_are_inactive() {
        let b = block_with_filters(0.00005);
        assert!(!has_active_filters(&b));

        let b = block_with_filters(0.01);
        assert!(has_active_filters(&b));
    }

    #[test]
    fn pixel_ratio_scales_down_past_the_max_edge() {
        assert_eq!(cache_pixel_ratio(600.0, 400.0), 1.0);
        assert_eq!(cache_pixel_ratio(2400.0, 100.0), 0.5);
        // Floor kicks in for extreme sizes.
        assert_eq!(cache_pixel_ratio(10_000.0, 10_000.0), 0.35);
    }

    #[test]
    fn brighten_offsets_channels() {
        let b = block_with_filters(0.2);
        let cache = render_filtered(&b);
        let px = cache.image.get_pixel(0, 0);
        // 100 + 0.2 * 255 = 151
        assert_eq!(px[0], 151);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn recache_clears_when_scalars_return_to_zero() {
        let mut b = block_with_filters(0.5);
        recache_image_block(&mut b);
        assert!(b.filter_cache.is_some());

        b.brightness = 0.0;
        recache_image_block(&mut b);
        assert!(b.filter_cache.is_none());
    }

    #[test]
    fn hsl_round_trip_is_stable() {
        let (h, s, l) = rgb_to_hsl(0.8, 0.2, 0.4);
        let (r, g, b) = hsl_to_rgb(h, s, l);
        assert!((r - 0.8).abs() < 1e-5);
        assert!((g - 0.2).abs() < 1e-5);
        assert!((b - 0.4).abs() < 1e-5);
    }
}
