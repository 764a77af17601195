// ============================================================================
// RASTER HANDLING — decoded bitmaps, data-URL transport, and the decode memo
// ============================================================================

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbaImage};

use crate::error::EditorError;

/// A decoded bitmap plus the encoded source reference it was decoded from.
#[derive(Clone)]
pub struct Raster {
    pub image: Arc<RgbaImage>,
    pub src: String,
}

impl Raster {
    pub fn new(image: RgbaImage, src: String) -> Self {
        Self {
            image: Arc::new(image),
            src,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Map a MIME type to the matching file extension for downloads.
pub fn mime_to_extension(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// Map a file extension (lowercase, no dot) to a MIME type.
pub fn extension_to_mime(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        _ => "image/png",
    }
}

/// Encode an image as a PNG data URL (`data:image/png;base64,...`).
pub fn encode_png_data_url(image: &RgbaImage) -> Result<String, EditorError> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ColorType::Rgba8,
        )
        .map_err(|e| EditorError::Load(format!("PNG encoding failed: {}", e)))?;
    Ok(format!("data:image/png;base64,{}", BASE64.encode(&bytes)))
}

/// Encode an image as a JPEG data URL with the given quality (1-100).
/// Alpha is dropped — JPEG has no transparency.
pub fn encode_jpeg_data_url(image: &RgbaImage, quality: u8) -> Result<String, EditorError> {
    let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|e| EditorError::Load(format!("JPEG encoding failed: {}", e)))?;
    Ok(format!("data:image/jpeg;base64,{}", BASE64.encode(&bytes)))
}

/// Read a file's bytes into a data URL, inferring the MIME type from the
/// extension. This is the engine-side equivalent of the browser FileReader.
pub fn read_file_as_data_url(path: &Path) -> Result<String, EditorError> {
    let bytes =
        std::fs::read(path).map_err(|e| EditorError::Read(format!("{}: {}", path.display(), e)))?;
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    Ok(format!(
        "data:{};base64,{}",
        extension_to_mime(&ext),
        BASE64.encode(&bytes)
    ))
}

/// Decode a raster source reference into a bitmap.
///
/// Data URLs are decoded in place; anything else is treated as a filesystem
/// path (used by the headless CLI). Failures surface as `EditorError::Load`.
pub fn decode_source(src: &str) -> Result<RgbaImage, EditorError> {
    if let Some(rest) = src.strip_prefix("data:") {
        let payload = rest
            .split_once(',')
            .map(|(_, body)| body)
            .ok_or_else(|| EditorError::Load("malformed data URL".to_string()))?;
        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| EditorError::Load(format!("base64 decoding failed: {}", e)))?;
        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| EditorError::Load(format!("image decoding failed: {}", e)))?;
        return Ok(decoded.to_rgba8());
    }

    let decoded =
        image::open(src).map_err(|e| EditorError::Load(format!("{}: {}", src, e)))?;
    Ok(decoded.to_rgba8())
}

/// Process-wide raster decode memo, keyed by source reference.
///
/// Repeated hydration of the same source (undo/redo replay, duplicated
/// blocks) hits the memo instead of re-decoding. The cache never evicts on
/// its own; the owning session clears it explicitly — see `clear`/`evict`.
#[derive(Default)]
pub struct RasterCache {
    entries: HashMap<String, Arc<RgbaImage>>,
}

impl RasterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a source reference to a decoded bitmap, memoizing the result.
    pub fn load(&mut self, src: &str) -> Result<Arc<RgbaImage>, EditorError> {
        if let Some(hit) = self.entries.get(src) {
            return Ok(Arc::clone(hit));
        }
        let decoded = Arc::new(decode_source(src)?);
        self.entries.insert(src.to_string(), Arc::clone(&decoded));
        Ok(decoded)
    }

    /// Insert an already-decoded bitmap under its source reference.
    pub fn insert(&mut self, src: &str, image: Arc<RgbaImage>) {
        self.entries.insert(src.to_string(), image);
    }

    /// Drop one memoized source.
    pub fn evict(&mut self, src: &str) {
        self.entries.remove(src);
    }

    /// Drop every memoized source.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checker(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        })
    }

    #[test]
    fn png_data_url_round_trips() {
        let img = checker(8, 6);
        let url = encode_png_data_url(&img).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        let back = decode_source(&url).unwrap();
        assert_eq!(back.dimensions(), (8, 6));
        assert_eq!(back, img);
    }

    #[test]
    fn cache_memoizes_by_source() {
        let url = encode_png_data_url(&checker(4, 4)).unwrap();
        let mut cache = RasterCache::new();
        let a = cache.load(&url).unwrap();
        let b = cache.load(&url).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        cache.evict(&url);
        assert!(cache.is_empty());
    }

    #[test]
    fn malformed_sources_fail_with_load_error() {
        assert!(matches!(
            decode_source("data:image/png;base64"),
            Err(EditorError::Load(_))
        ));
        assert!(matches!(
            decode_source("data:image/png;base64,@@@"),
            Err(EditorError::Load(_))
        ));
    }
}
