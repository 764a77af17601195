// ============================================================================
// BLOCK DATA MODEL — image/text blocks, strokes, construction and hydration
// ============================================================================

use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::components::history::BlockHistory;
use crate::number::{json_number, json_string, to_number};
use crate::ops::filters::FilterCache;

/// Minimum committed width/height of any block, in document units.
pub const MIN_BLOCK_SIZE: f64 = 20.0;
/// New image blocks are fitted into this width (never upscaled).
pub const IMAGE_MAX_START_WIDTH: f64 = 360.0;
/// Position offset applied to duplicated blocks.
pub const DUPLICATE_OFFSET: f64 = 24.0;
/// Minimum text size after any committed transform.
pub const MIN_FONT_SIZE: f64 = 10.0;

pub const DEFAULT_BRUSH_COLOR: &str = "#0f766e";
pub const DEFAULT_TEXT_FILL: &str = "#0f172a";
pub const DEFAULT_FONT_FAMILY: &str = "Georgia";

// ----------------------------------------------------------------------------
//  Identifiers
// ----------------------------------------------------------------------------

/// Prefix-counter id factory (`img-1`, `txt-2`, `line-3`, ...). Ids are
/// opaque and stable for a block's lifetime; imported blocks keep the ids
/// from their document.
#[derive(Debug, Default)]
pub struct IdGenerator {
    counter: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{}-{}", prefix, self.counter)
    }
}

// ----------------------------------------------------------------------------
//  Strokes
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeTool {
    Pen,
    Erase,
}

/// A freehand mark in block-local coordinates. `points` is a flat
/// `[x0, y0, x1, y1, ...]` list relative to the owning block's unscaled box.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: String,
    pub tool: StrokeTool,
    pub color: String,
    pub size: f64,
    pub points: Vec<f64>,
}

impl Stroke {
    /// Normalize an untrusted stroke record: unknown tools become `Pen`,
    /// size is floored at 1, non-numeric points degrade to 0.
    pub fn from_value(value: &Value, id_gen: &mut IdGenerator) -> Self {
        let tool = match value.get("tool").and_then(Value::as_str) {
            Some("erase") => StrokeTool::Erase,
            _ => StrokeTool::Pen,
        };
        let points = value
            .get("points")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .map(|p| json_number(Some(p), 0.0))
                    .collect::<Vec<f64>>()
            })
            .unwrap_or_default();

        Self {
            id: match value.get("id").and_then(Value::as_str) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => id_gen.next("line"),
            },
            tool,
            color: json_string(value.get("color"), DEFAULT_BRUSH_COLOR),
            size: json_number(value.get("size"), 10.0).round().max(1.0),
            points,
        }
    }

    /// Append one local point to the in-progress stroke.
    pub fn push_point(&mut self, x: f64, y: f64) {
        self.points.push(x);
        self.points.push(y);
    }
}

/// Deep-copy a stroke list from untrusted records, normalizing every entry.
pub fn strokes_from_values(list: Option<&Value>, id_gen: &mut IdGenerator) -> Vec<Stroke> {
    match list.and_then(Value::as_array) {
        Some(raw) => raw
            .iter()
            .map(|line| Stroke::from_value(line, id_gen))
            .collect(),
        None => Vec::new(),
    }
}

// ----------------------------------------------------------------------------
//  Blocks
// ----------------------------------------------------------------------------

/// An image block: a placed raster with tonal scalars, strokes, and its own
/// bounded undo history.
pub struct ImageBlock {
    pub id: String,
    pub label: String,
    /// Encoded source reference (data URL or path) for `image`.
    pub src: String,
    /// Decoded raster handle. Shared with the raster cache; never serialized.
    pub image: Arc<RgbaImage>,
    pub x: f64,
    pub y: f64,
    /// Unscaled box size. `scale_x`/`scale_y` carry only the flip sign.
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
    pub hue: f64,
    pub lines: Vec<Stroke>,
    pub history: BlockHistory,
    /// Guard held while a history snapshot is being re-applied. Suppresses
    /// history pushes so playback does not pollute the stack.
    pub is_restoring_history: bool,
    /// Rasterized tonal-filter output, present only while filters are active.
    pub filter_cache: Option<FilterCache>,
}

impl ImageBlock {
    /// Create a block from a decoded raster, auto-fitting the start size
    /// within `IMAGE_MAX_START_WIDTH` while preserving aspect ratio and
    /// never upscaling.
    pub fn from_raster(
        id: String,
        label: &str,
        src: String,
        image: Arc<RgbaImage>,
        position: (f64, f64),
    ) -> Self {
        let source_width = image.width().max(1) as f64;
        let source_height = image.height().max(1) as f64;
        let start_scale = (IMAGE_MAX_START_WIDTH / source_width).min(1.0);

        Self {
            id,
            label: label.to_string(),
            src,
            image,
            x: to_number(position.0, 36.0).round(),
            y: to_number(position.1, 36.0).round(),
            width: (source_width * start_scale).round().max(MIN_BLOCK_SIZE),
            height: (source_height * start_scale).round().max(MIN_BLOCK_SIZE),
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            brightness: 0.0,
            contrast: 0.0,
            saturation: 0.0,
            hue: 0.0,
            lines: Vec::new(),
            history: BlockHistory::new(),
            is_restoring_history: false,
            filter_cache: None,
        }
    }

    /// Deep copy at a +24/+24 offset. Strokes are cloned, history starts
    /// fresh — undo on the copy never replays the source's past.
    pub fn duplicate(&self, id: String) -> Self {
        Self {
            id,
            label: self.label.clone(),
            src: self.src.clone(),
            image: Arc::clone(&self.image),
            x: self.x + DUPLICATE_OFFSET,
            y: self.y + DUPLICATE_OFFSET,
            width: self.width,
            height: self.height,
            rotation: self.rotation,
            scale_x: self.scale_x,
            scale_y: self.scale_y,
            brightness: self.brightness,
            contrast: self.contrast,
            saturation: self.saturation,
            hue: self.hue,
            lines: self.lines.clone(),
            history: BlockHistory::new(),
            is_restoring_history: false,
            filter_cache: None,
        }
    }

    /// Build from an untrusted document record plus its resolved raster.
    /// Every numeric field is coerced; size defaults to the raster size.
    pub fn from_value(
        value: &Value,
        src: String,
        image: Arc<RgbaImage>,
        id_gen: &mut IdGenerator,
    ) -> Self {
        let fallback_width = image.width() as f64;
        let fallback_height = image.height() as f64;
        let scale_x = non_zero_or(json_number(value.get("scaleX"), 1.0), 1.0);
        let scale_y = non_zero_or(json_number(value.get("scaleY"), 1.0), 1.0);

        Self {
            id: match value.get("id").and_then(Value::as_str) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => id_gen.next("img"),
            },
            label: json_string(value.get("label"), "Image"),
            src,
            image,
            x: json_number(value.get("x"), 0.0),
            y: json_number(value.get("y"), 0.0),
            width: json_number(value.get("width"), fallback_width)
                .round()
                .max(MIN_BLOCK_SIZE),
            height: json_number(value.get("height"), fallback_height)
                .round()
                .max(MIN_BLOCK_SIZE),
            rotation: json_number(value.get("rotation"), 0.0),
            scale_x,
            scale_y,
            brightness: json_number(value.get("brightness"), 0.0),
            contrast: json_number(value.get("contrast"), 0.0),
            saturation: json_number(value.get("saturation"), 0.0),
            hue: json_number(value.get("hue"), 0.0),
            lines: strokes_from_values(value.get("lines"), id_gen),
            history: BlockHistory::new(),
            is_restoring_history: false,
            filter_cache: None,
        }
    }
}

/// A text block. No strokes, no history.
pub struct TextBlock {
    pub id: String,
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub font_size: f64,
    pub font_family: String,
    pub fill: String,
}

impl TextBlock {
    pub fn new(id: String) -> Self {
        Self {
            id,
            text: "Demo text".to_string(),
            x: 48.0,
            y: 48.0,
            width: 240.0,
            height: 84.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            font_size: 30.0,
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            fill: DEFAULT_TEXT_FILL.to_string(),
        }
    }

    /// Build from an untrusted document record.
    pub fn from_value(value: &Value, id_gen: &mut IdGenerator) -> Self {
        Self {
            id: match value.get("id").and_then(Value::as_str) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => id_gen.next("txt"),
            },
            text: json_string(value.get("text"), "Demo text"),
            x: json_number(value.get("x"), 0.0),
            y: json_number(value.get("y"), 0.0),
            width: json_number(value.get("width"), 240.0).round().max(80.0),
            height: json_number(value.get("height"), 80.0).round().max(40.0),
            rotation: json_number(value.get("rotation"), 0.0),
            scale_x: non_zero_or(json_number(value.get("scaleX"), 1.0), 1.0),
            scale_y: non_zero_or(json_number(value.get("scaleY"), 1.0), 1.0),
            font_size: json_number(value.get("fontSize"), 30.0)
                .round()
                .max(MIN_FONT_SIZE),
            font_family: json_string(value.get("fontFamily"), DEFAULT_FONT_FAMILY),
            fill: json_string(value.get("fill"), DEFAULT_TEXT_FILL),
        }
    }
}

/// A positioned, transformable unit of content. List order is z-order.
pub enum Block {
    Image(ImageBlock),
    Text(TextBlock),
}

impl Block {
    pub fn id(&self) -> &str {
        match self {
            Block::Image(b) => &b.id,
            Block::Text(b) => &b.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Block::Image(_) => "image",
            Block::Text(_) => "text",
        }
    }

    pub fn position(&self) -> (f64, f64) {
        match self {
            Block::Image(b) => (b.x, b.y),
            Block::Text(b) => (b.x, b.y),
        }
    }

    pub fn size(&self) -> (f64, f64) {
        match self {
            Block::Image(b) => (b.width, b.height),
            Block::Text(b) => (b.width, b.height),
        }
    }

    pub fn scale(&self) -> (f64, f64) {
        match self {
            Block::Image(b) => (b.scale_x, b.scale_y),
            Block::Text(b) => (b.scale_x, b.scale_y),
        }
    }

    pub fn rotation(&self) -> f64 {
        match self {
            Block::Image(b) => b.rotation,
            Block::Text(b) => b.rotation,
        }
    }

    pub fn as_image(&self) -> Option<&ImageBlock> {
        match self {
            Block::Image(b) => Some(b),
            Block::Text(_) => None,
        }
    }

    pub fn as_image_mut(&mut self) -> Option<&mut ImageBlock> {
        match self {
            Block::Image(b) => Some(b),
            Block::Text(_) => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut TextBlock> {
        match self {
            Block::Image(_) => None,
            Block::Text(b) => Some(b),
        }
    }
}

fn non_zero_or(value: f64, fallback: f64) -> f64 {
    if value == 0.0 { fallback } else { value }
}

// ----------------------------------------------------------------------------
//  Geometry queries
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// Axis-aligned bounds of one block. The scale sign flips which corner the
/// box extends from, so both corners are ordered here.
pub fn block_bounds(block: &Block) -> Bounds {
    let (x, y) = block.position();
    let (w, h) = block.size();
    let (sx, sy) = block.scale();
    let x2 = x + sx * w;
    let y2 = y + sy * h;

    Bounds {
        min_x: x.min(x2),
        min_y: y.min(y2),
        max_x: x.max(x2),
        max_y: y.max(y2),
    }
}

/// Combined bounds of a block list, or `None` when the list is empty.
/// Consumed by viewport-fit features.
pub fn blocks_bounds(blocks: &[Block]) -> Option<Bounds> {
    let mut iter = blocks.iter().map(block_bounds);
    let first = iter.next()?;
    Some(iter.fold(first, |acc, b| Bounds {
        min_x: acc.min_x.min(b.min_x),
        min_y: acc.min_y.min(b.min_y),
        max_x: acc.max_x.max(b.max_x),
        max_y: acc.max_y.max(b.max_y),
    }))
}

/// Next free position for a new image block: to the right of the existing
/// image blocks with a 48-unit gutter, wrapping to a new row when the stage
/// width would be exceeded.
pub fn next_image_block_position(blocks: &[Block], stage_width: f64) -> (f64, f64) {
    let image_blocks: Vec<&Block> = blocks
        .iter()
        .filter(|b| matches!(b, Block::Image(_)))
        .collect();
    if image_blocks.is_empty() {
        return (36.0, 36.0);
    }

    let mut bounds: Option<Bounds> = None;
    for block in image_blocks {
        let b = block_bounds(block);
        bounds = Some(match bounds {
            None => b,
            Some(acc) => Bounds {
                min_x: acc.min_x.min(b.min_x),
                min_y: acc.min_y.min(b.min_y),
                max_x: acc.max_x.max(b.max_x),
                max_y: acc.max_y.max(b.max_y),
            },
        });
    }
    let bounds = match bounds {
        Some(b) => b,
        None => return (36.0, 36.0),
    };

    let next_x = (bounds.max_x + 48.0).round();
    let next_y = bounds.min_y.round();

    if stage_width.is_finite() && stage_width > 0.0 {
        let wrap_threshold = (stage_width - 220.0).round().max(220.0);
        if next_x > wrap_threshold {
            return (36.0, (bounds.max_y + 48.0).round());
        }
    }

    (next_x, next_y)
}

/// Clamp a block-local pointer position into the block's unscaled box.
pub fn clamp_pointer_to_image_block(pointer: (f64, f64), block: &ImageBlock) -> (f64, f64) {
    (
        crate::number::clamp(to_number(pointer.0, 0.0), 0.0, block.width),
        crate::number::clamp(to_number(pointer.1, 0.0), 0.0, block.height),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raster(w: u32, h: u32) -> Arc<RgbaImage> {
        Arc::new(RgbaImage::new(w, h))
    }

    fn image_block(id: &str, x: f64, y: f64, w: f64, h: f64) -> Block {
        let mut b = ImageBlock::from_raster(id.to_string(), "Image", String::new(), raster(1, 1), (x, y));
        b.width = w;
        b.height = h;
        Block::Image(b)
    }

    #[test]
    fn start_size_fits_max_width_without_upscaling() {
        let wide = ImageBlock::from_raster("a".into(), "w", String::new(), raster(1024, 640), (0.0, 0.0));
        assert_eq!(wide.width, 360.0);
        assert_eq!(wide.height, 225.0); // 640 * (360/1024)

        let small = ImageBlock::from_raster("b".into(), "s", String::new(), raster(120, 90), (0.0, 0.0));
        assert_eq!((small.width, small.height), (120.0, 90.0));
    }

    #[test]
    fn duplicate_offsets_and_resets_history() {
        let mut src = ImageBlock::from_raster("a".into(), "src", String::new(), raster(64, 64), (10.0, 20.0));
        src.lines.push(Stroke {
            id: "line-1".into(),
            tool: StrokeTool::Pen,
            color: "#0f766e".into(),
            size: 10.0,
            points: vec![1.0, 2.0],
        });
        src.history.push(crate::components::history::BlockSnapshot::capture(&src));

        let dup = src.duplicate("b".into());
        assert_eq!((dup.x, dup.y), (src.x + 24.0, src.y + 24.0));
        assert_eq!(dup.lines, src.lines);
        assert_eq!(dup.history.len(), 0);
    }

    #[test]
    fn hydration_coerces_malformed_fields() {
        let raw = json!({
            "id": "img-7",
            "label": "photo",
            "x": "not-a-number",
            "width": 5,
            "height": null,
            "scaleX": 0,
            "brightness": "0.25",
            "lines": [{"tool": "erase", "size": 0, "points": [1, "2", null]}],
        });
        let mut ids = IdGenerator::new();
        let block = ImageBlock::from_value(&raw, "src".into(), raster(100, 50), &mut ids);

        assert_eq!(block.id, "img-7");
        assert_eq!(block.x, 0.0);
        assert_eq!(block.width, MIN_BLOCK_SIZE); // 5 floored to minimum
        assert_eq!(block.height, 50.0); // falls back to raster height
        assert_eq!(block.scale_x, 1.0); // zero scale degrades to 1
        assert_eq!(block.brightness, 0.25);
        let line = &block.lines[0];
        assert_eq!(line.tool, StrokeTool::Erase);
        assert_eq!(line.size, 1.0);
        assert_eq!(line.points, vec![1.0, 2.0, 0.0]);
    }

    #[test]
    fn bounds_honor_flip_sign() {
        let mut b = ImageBlock::from_raster("a".into(), "f", String::new(), raster(1, 1), (100.0, 40.0));
        b.width = 60.0;
        b.height = 30.0;
        b.scale_x = -1.0;
        let bounds = block_bounds(&Block::Image(b));
        assert_eq!(bounds.min_x, 40.0);
        assert_eq!(bounds.max_x, 100.0);
        assert_eq!(bounds.min_y, 40.0);
        assert_eq!(bounds.max_y, 70.0);
    }

    #[test]
    fn next_position_wraps_at_stage_edge() {
        let blocks = vec![image_block("a", 36.0, 36.0, 300.0, 200.0)];
        // 36 + 300 + 48 = 384, past the wrap threshold of max(220, 500-220)
        let (x, y) = next_image_block_position(&blocks, 500.0);
        assert_eq!((x, y), (36.0, 236.0 + 48.0));

        let (x, y) = next_image_block_position(&blocks, 2000.0);
        assert_eq!((x, y), (384.0, 36.0));
    }

    #[test]
    fn empty_list_has_no_bounds() {
        assert!(blocks_bounds(&[]).is_none());
        assert_eq!(next_image_block_position(&[], 960.0), (36.0, 36.0));
    }

    #[test]
    fn pointer_clamps_into_block_box() {
        let mut b = ImageBlock::from_raster("a".into(), "c", String::new(), raster(1, 1), (0.0, 0.0));
        b.width = 200.0;
        b.height = 100.0;
        assert_eq!(clamp_pointer_to_image_block((-5.0, 50.0), &b), (0.0, 50.0));
        assert_eq!(clamp_pointer_to_image_block((250.0, 120.0), &b), (200.0, 100.0));
    }
}
