// ============================================================================
// EDITOR SESSION — block set ownership, commands, events, crop workflow
// ============================================================================
//
// All mutation of blocks flows through this type. Commands return plain
// results; consumers that need to know what happened drain the event queue
// instead of watching fields. Fallible steps resolve their inputs first and
// mutate only once everything they need is in hand, so a failed operation
// leaves the previous state intact.

use std::collections::HashSet;

use uuid::Uuid;

use crate::block::{
    Block, Bounds, IdGenerator, ImageBlock, MIN_FONT_SIZE, Stroke, TextBlock, blocks_bounds,
    clamp_pointer_to_image_block, next_image_block_position,
};
use crate::components::history::{BlockSnapshot, push_block_history};
use crate::components::tools::{BrushSettings, DrawState, Tool};
use crate::document::{self, DocumentFile};
use crate::error::{EditorError, Result};
use crate::ops::crop::{CropMode, CropSession};
use crate::ops::filters::recache_image_block;
use crate::ops::transform::{
    FlipAxis, TransformGesture, apply_block_transform, flip_image_block, reset_block,
    rescale_strokes, rotate_block_by,
};
use crate::placeholders;
use crate::raster::{RasterCache, encode_png_data_url};
use crate::render::render_blocks;
use crate::{log_info, log_warn};

pub const DEFAULT_STAGE_WIDTH: f64 = 960.0;
pub const DEFAULT_STAGE_HEIGHT: f64 = 620.0;

/// Re-render signals emitted after committed mutations. Drained, not
/// observed: the display layer pulls these once per frame.
#[derive(Clone, Debug, PartialEq)]
pub enum EditorEvent {
    BlockAdded(String),
    BlockChanged(String),
    BlockRemoved(String),
    SelectionChanged(Option<String>),
    DocumentReplaced,
    Notice(String),
}

/// Which tonal scalar an adjustment command targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Adjustment {
    Brightness,
    Contrast,
    Saturation,
    Hue,
}

pub struct EditorSession {
    pub session_id: Uuid,
    pub stage_width: f64,
    pub stage_height: f64,

    blocks: Vec<Block>,
    selected_id: Option<String>,
    tool: Tool,
    pan_mode: bool,
    draw: DrawState,
    pub brush: BrushSettings,
    pub crop: CropSession,

    rasters: RasterCache,
    id_gen: IdGenerator,
    /// Block ids with a recache scheduled but not yet run. One slot per
    /// block, so rapid scalar edits coalesce into a single recache.
    pending_recache: HashSet<String>,
    events: Vec<EditorEvent>,
    notice: Option<String>,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorSession {
    pub fn new() -> Self {
        let session_id = Uuid::new_v4();
        log_info!("editor session {} started", session_id);
        Self {
            session_id,
            stage_width: DEFAULT_STAGE_WIDTH,
            stage_height: DEFAULT_STAGE_HEIGHT,
            blocks: Vec::new(),
            selected_id: None,
            tool: Tool::Select,
            pan_mode: false,
            draw: DrawState::default(),
            brush: BrushSettings::default(),
            crop: CropSession::default(),
            rasters: RasterCache::new(),
            id_gen: IdGenerator::new(),
            pending_recache: HashSet::new(),
            events: Vec::new(),
            notice: None,
        }
    }

    // ===== QUERIES =====

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected_id.as_deref()
    }

    pub fn selected_block(&self) -> Option<&Block> {
        let id = self.selected_id.as_deref()?;
        self.blocks.iter().find(|b| b.id() == id)
    }

    pub fn selected_image(&self) -> Option<&ImageBlock> {
        self.selected_block().and_then(Block::as_image)
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn pan_mode(&self) -> bool {
        self.pan_mode
    }

    pub fn is_drawing(&self) -> bool {
        self.draw.is_drawing
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        blocks_bounds(&self.blocks)
    }

    pub fn can_undo(&self) -> bool {
        self.selected_image().is_some_and(|b| b.history.can_undo())
    }

    pub fn can_redo(&self) -> bool {
        self.selected_image().is_some_and(|b| b.history.can_redo())
    }

    /// Drain every event queued since the last call.
    pub fn take_events(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.events)
    }

    fn image_mut(&mut self, id: &str) -> Option<&mut ImageBlock> {
        self.blocks
            .iter_mut()
            .find(|b| b.id() == id)
            .and_then(Block::as_image_mut)
    }

    fn set_notice(&mut self, message: impl Into<String>) {
        let message = message.into();
        log_warn!("{}", message);
        self.notice = Some(message.clone());
        self.events.push(EditorEvent::Notice(message));
    }

    pub fn clear_notice(&mut self) {
        self.notice = None;
    }

    // ===== BLOCK LIFECYCLE =====

    /// Decode `src` and append a new image block at the next free position.
    pub fn add_image_block_from_src(&mut self, src: &str, label: &str) -> Result<String> {
        let image = self.rasters.load(src)?;
        let position = next_image_block_position(&self.blocks, self.stage_width);
        let id = self.id_gen.next("img");
        let mut block =
            ImageBlock::from_raster(id.clone(), label, src.to_string(), image, position);
        push_block_history(&mut block);

        self.blocks.push(Block::Image(block));
        self.selected_id = Some(id.clone());
        self.events.push(EditorEvent::BlockAdded(id.clone()));
        self.events
            .push(EditorEvent::SelectionChanged(Some(id.clone())));
        log_info!("added image block {} ({})", id, label);
        Ok(id)
    }

    /// Append a procedural placeholder block.
    pub fn add_default_block(&mut self) -> Result<String> {
        let src = placeholders::default_block_data_url()?;
        self.add_image_block_from_src(&src, "new-block.png")
    }

    /// Append the procedural sample photo.
    pub fn add_sample_block(&mut self) -> Result<String> {
        let src = placeholders::sample_image_data_url()?;
        self.add_image_block_from_src(&src, "sample-demo.png")
    }

    pub fn add_text_block(&mut self) -> String {
        let id = self.id_gen.next("txt");
        self.blocks.push(Block::Text(TextBlock::new(id.clone())));
        self.selected_id = Some(id.clone());
        self.events.push(EditorEvent::BlockAdded(id.clone()));
        self.events
            .push(EditorEvent::SelectionChanged(Some(id.clone())));
        id
    }

    /// Deep-copy the selected image block at a +24/+24 offset.
    pub fn duplicate_selected(&mut self) -> Option<String> {
        let source_id = self.selected_id.clone()?;
        let id = self.id_gen.next("img");
        let copy = self.image_mut(&source_id)?.duplicate(id.clone());

        self.blocks.push(Block::Image(copy));
        self.selected_id = Some(id.clone());
        if let Some(block) = self.image_mut(&id) {
            push_block_history(block);
            recache_image_block(block);
        }
        self.events.push(EditorEvent::BlockAdded(id.clone()));
        self.events
            .push(EditorEvent::SelectionChanged(Some(id.clone())));
        Some(id)
    }

    pub fn remove_selected(&mut self) -> Option<String> {
        let id = self.selected_id.clone()?;
        // Killing the block under an active stroke aborts the gesture.
        if self.draw.is_drawing && self.draw.drawing_block_id == id {
            self.draw.cancel();
        }
        self.blocks.retain(|b| b.id() != id);
        self.pending_recache.remove(&id);
        self.selected_id = None;
        self.events.push(EditorEvent::BlockRemoved(id.clone()));
        self.events.push(EditorEvent::SelectionChanged(None));
        Some(id)
    }

    pub fn select_block(&mut self, id: Option<&str>) {
        if self.tool != Tool::Select || self.pan_mode {
            return;
        }
        let next = id
            .filter(|id| self.blocks.iter().any(|b| b.id() == *id))
            .map(str::to_string);
        if next != self.selected_id {
            self.selected_id = next.clone();
            self.events.push(EditorEvent::SelectionChanged(next));
        }
    }

    // ===== TOOLS AND PAN =====

    pub fn set_tool(&mut self, tool: Tool) {
        if self.tool != tool {
            self.finish_stroke();
        }
        self.tool = tool;
        if self.pan_mode || tool != Tool::Select {
            self.set_pan_mode(false);
        }
        if tool != Tool::Select && self.selected_id.is_some() {
            self.selected_id = None;
            self.events.push(EditorEvent::SelectionChanged(None));
        }
    }

    pub fn set_pan_mode(&mut self, enabled: bool) {
        if enabled {
            self.finish_stroke();
            if self.selected_id.is_some() {
                self.selected_id = None;
                self.events.push(EditorEvent::SelectionChanged(None));
            }
        }
        self.pan_mode = enabled;
    }

    pub fn toggle_pan_mode(&mut self) {
        self.set_pan_mode(!self.pan_mode);
    }

    // ===== STROKE ENGINE =====

    /// Pointer-down on a block in its local coordinate space. Starts a
    /// stroke when a drawing tool is active and the target is an image block.
    pub fn pointer_down(&mut self, block_id: &str, local: (f64, f64)) {
        if self.pan_mode {
            return;
        }
        let Some(stroke_tool) = self.tool.stroke_tool() else {
            return;
        };
        let color = self.brush.stroke_color(stroke_tool);
        let size = self.brush.stroke_size(stroke_tool);
        let stroke_id = self.id_gen.next("line");

        let Some(block) = self.image_mut(block_id) else {
            return;
        };
        let (x, y) = clamp_pointer_to_image_block(local, block);
        block.lines.push(Stroke {
            id: stroke_id,
            tool: stroke_tool,
            color,
            size,
            points: vec![x, y],
        });

        self.draw.begin(block_id);
        self.selected_id = Some(block_id.to_string());
    }

    /// Pointer-move during a stroke: append one clamped point in place.
    pub fn pointer_move(&mut self, local: (f64, f64)) {
        if self.pan_mode || !self.draw.is_drawing {
            return;
        }
        let id = self.draw.drawing_block_id.clone();
        if id.is_empty() {
            return;
        }
        let Some(block) = self.image_mut(&id) else {
            // The block vanished mid-gesture; commit what exists.
            self.finish_stroke();
            return;
        };
        let (x, y) = clamp_pointer_to_image_block(local, block);
        if let Some(stroke) = block.lines.last_mut() {
            stroke.push_point(x, y);
        }
        self.events.push(EditorEvent::BlockChanged(id));
    }

    pub fn pointer_up(&mut self) {
        if self.pan_mode {
            return;
        }
        self.finish_stroke();
    }

    /// Commit the in-flight stroke, pushing exactly one history snapshot.
    pub fn finish_stroke(&mut self) {
        let Some(id) = self.draw.finish() else {
            return;
        };
        if let Some(block) = self.image_mut(&id) {
            push_block_history(block);
            self.events.push(EditorEvent::BlockChanged(id));
        }
    }

    // ===== TRANSFORMS =====

    /// Commit a drag/resize/rotate gesture. Returns false when the gesture
    /// was rejected by the minimum-size guard.
    pub fn apply_transform(&mut self, block_id: &str, gesture: &TransformGesture) -> bool {
        let Some(index) = self.blocks.iter().position(|b| b.id() == block_id) else {
            return false;
        };
        if !apply_block_transform(&mut self.blocks[index], gesture) {
            return false;
        }
        if let Some(block) = self.blocks[index].as_image_mut() {
            recache_image_block(block);
            push_block_history(block);
        }
        self.events
            .push(EditorEvent::BlockChanged(block_id.to_string()));
        true
    }

    /// Commit a plain drag: position only, one history entry.
    pub fn move_block(&mut self, block_id: &str, x: f64, y: f64) {
        let Some(block) = self.blocks.iter_mut().find(|b| b.id() == block_id) else {
            return;
        };
        match block {
            Block::Image(b) => {
                b.x = x;
                b.y = y;
                push_block_history(b);
            }
            Block::Text(b) => {
                b.x = x;
                b.y = y;
            }
        }
        self.events
            .push(EditorEvent::BlockChanged(block_id.to_string()));
    }

    pub fn flip_selected(&mut self, axis: FlipAxis) {
        let Some(id) = self.selected_id.clone() else {
            return;
        };
        if let Some(block) = self.image_mut(&id) {
            flip_image_block(block, axis);
            push_block_history(block);
            self.events.push(EditorEvent::BlockChanged(id));
        }
    }

    pub fn rotate_selected_by(&mut self, delta: f64) {
        let Some(id) = self.selected_id.clone() else {
            return;
        };
        let Some(block) = self.blocks.iter_mut().find(|b| b.id() == id) else {
            return;
        };
        rotate_block_by(block, delta);
        if let Some(image) = block.as_image_mut() {
            push_block_history(image);
        }
        self.events.push(EditorEvent::BlockChanged(id));
    }

    /// Recenter the selected block and clear rotation/flips/filters.
    pub fn reset_selected(&mut self) {
        let Some(id) = self.selected_id.clone() else {
            return;
        };
        let (stage_w, stage_h) = (self.stage_width, self.stage_height);
        let Some(block) = self.blocks.iter_mut().find(|b| b.id() == id) else {
            return;
        };
        reset_block(block, stage_w, stage_h);
        if let Some(image) = block.as_image_mut() {
            recache_image_block(image);
            push_block_history(image);
        }
        self.events.push(EditorEvent::BlockChanged(id));
    }

    // ===== TONAL ADJUSTMENTS =====

    /// Live scalar edit: applied immediately, recache deferred to the next
    /// flush so a slider drag costs one rasterization, not hundreds.
    pub fn set_adjustment(&mut self, adjustment: Adjustment, value: f64) {
        let Some(id) = self.selected_id.clone() else {
            return;
        };
        let Some(block) = self.image_mut(&id) else {
            return;
        };
        match adjustment {
            Adjustment::Brightness => block.brightness = value,
            Adjustment::Contrast => block.contrast = value,
            Adjustment::Saturation => block.saturation = value,
            Adjustment::Hue => block.hue = value,
        }
        self.pending_recache.insert(id.clone());
        self.events.push(EditorEvent::BlockChanged(id));
    }

    /// End-of-drag commit: one history entry for the whole slider gesture.
    pub fn commit_adjustment(&mut self) {
        let Some(id) = self.selected_id.clone() else {
            return;
        };
        if let Some(block) = self.image_mut(&id) {
            push_block_history(block);
        }
    }

    /// Run every scheduled recache. The host calls this once per tick.
    pub fn flush_pending_recaches(&mut self) {
        let pending: Vec<String> = self.pending_recache.drain().collect();
        for id in pending {
            // A scheduled block may have been removed in the meantime.
            if let Some(block) = self.image_mut(&id) {
                recache_image_block(block);
                self.events.push(EditorEvent::BlockChanged(id));
            }
        }
    }

    // ===== TEXT EDITING =====

    pub fn set_text_content(&mut self, value: &str) {
        if let Some(block) = self.selected_text_mut() {
            block.text = value.to_string();
        }
    }

    pub fn set_text_fill(&mut self, value: &str) {
        if let Some(block) = self.selected_text_mut() {
            block.fill = value.to_string();
        }
    }

    pub fn set_text_size(&mut self, value: f64) {
        if let Some(block) = self.selected_text_mut() {
            block.font_size = crate::number::to_number(value, 24.0).round().max(MIN_FONT_SIZE);
        }
    }

    fn selected_text_mut(&mut self) -> Option<&mut TextBlock> {
        let id = self.selected_id.clone()?;
        self.blocks
            .iter_mut()
            .find(|b| b.id() == id)
            .and_then(Block::as_text_mut)
    }

    /// Color sampling needs a host capability this engine does not have.
    pub fn pick_color_with_eyedropper(&mut self) -> Result<String> {
        Err(EditorError::CaptureUnavailable("eyedropper"))
    }

    // ===== HISTORY =====

    pub fn undo(&mut self) {
        let Some((id, index)) = self.selected_history_cursor() else {
            return;
        };
        self.restore_from_history(&id, index - 1);
    }

    pub fn redo(&mut self) {
        let Some((id, index)) = self.selected_history_cursor() else {
            return;
        };
        self.restore_from_history(&id, index + 1);
    }

    fn selected_history_cursor(&self) -> Option<(String, isize)> {
        let block = self.selected_image()?;
        Some((block.id.clone(), block.history.index()))
    }

    /// Re-hydrate the selected block from one of its snapshots. The raster
    /// is resolved first; the block is only touched once it decoded, and the
    /// restoring guard is released on every path.
    fn restore_from_history(&mut self, block_id: &str, target_index: isize) {
        let snapshot: Option<BlockSnapshot> = self
            .image_mut(block_id)
            .and_then(|b| b.history.snapshot_at(target_index).cloned());
        let Some(snapshot) = snapshot else {
            return;
        };

        if let Some(block) = self.image_mut(block_id) {
            block.is_restoring_history = true;
        }
        let loaded = self.rasters.load(&snapshot.src);

        // Re-validate: the load is a suspension point and the block may be
        // gone by the time it resolves.
        let Some(block) = self.image_mut(block_id) else {
            return;
        };
        match loaded {
            Ok(image) => {
                snapshot.apply(block, image);
                block.history.set_index(target_index);
                recache_image_block(block);
                block.is_restoring_history = false;
                self.events
                    .push(EditorEvent::BlockChanged(block_id.to_string()));
            }
            Err(error) => {
                block.is_restoring_history = false;
                self.set_notice(format!("History restore failed: {error}"));
            }
        }
    }

    // ===== CROP WORKFLOW =====

    /// Queue sources for the upload flow and open the first one if the
    /// session is idle.
    pub fn queue_crop_sources(&mut self, sources: &[(String, String)]) -> Result<()> {
        for (name, src) in sources {
            self.crop.enqueue(name, src);
        }
        if !self.crop.visible {
            self.open_next_queued_crop()?;
        }
        Ok(())
    }

    /// Open the crop session on an existing block's current source.
    pub fn open_crop_for_selected(&mut self) -> Result<()> {
        let Some(block) = self.selected_image() else {
            return Err(EditorError::MissingSource);
        };
        let (id, label, src) = (block.id.clone(), block.label.clone(), block.src.clone());

        self.crop.reset_and_clear_queue();
        let image = self.rasters.load(&src)?;
        self.crop.mode = CropMode::Edit;
        self.crop.preserve_block_size = false;
        self.crop.target_id = Some(id);
        self.crop.set_source(&label, &src, image);
        self.crop.visible = true;
        Ok(())
    }

    /// Open the crop session to replace the selected block's image with a
    /// new source, keeping the block's on-screen size.
    pub fn open_crop_replace_selected(&mut self, name: &str, src: &str) -> Result<()> {
        let Some(block) = self.selected_image() else {
            self.set_notice("Select an image block first.");
            return Ok(());
        };
        let (id, width, height) = (block.id.clone(), block.width, block.height);

        self.crop.reset_and_clear_queue();
        let image = self.rasters.load(src)?;
        self.crop.mode = CropMode::Edit;
        self.crop.preserve_block_size = true;
        self.crop.target_id = Some(id);
        self.crop.set_source(name, src, image);
        // Preserve mode starts from the block's display size, not the
        // source size.
        self.crop.output_width = width;
        self.crop.output_height = height;
        self.crop.normalize();
        self.crop.visible = true;
        Ok(())
    }

    fn open_next_queued_crop(&mut self) -> Result<()> {
        let Some(entry) = self.crop.pop_queued() else {
            self.crop.reset_and_clear_queue();
            return Ok(());
        };
        self.crop.reset();
        let image = self.rasters.load(&entry.src)?;
        self.crop.mode = CropMode::Upload;
        self.crop.set_source(&entry.name, &entry.src, image);
        self.crop.visible = true;
        Ok(())
    }

    /// Commit the crop session: composite, then either append a new block
    /// (upload, continuing the queue FIFO) or replace the target's source.
    pub fn apply_crop(&mut self) -> Result<()> {
        let output = match self.crop.render_output() {
            Ok(output) => output,
            Err(error) => {
                self.set_notice(format!("Crop failed: {error}"));
                return Ok(());
            }
        };
        let data_url = encode_png_data_url(&output)?;
        let image = std::sync::Arc::new(output);
        self.rasters.insert(&data_url, std::sync::Arc::clone(&image));

        match self.crop.mode {
            CropMode::Upload => {
                let name = if self.crop.source_name.is_empty() {
                    "Image".to_string()
                } else {
                    self.crop.source_name.clone()
                };
                self.add_image_block_from_src(&data_url, &name)?;

                if !self.crop.queue.is_empty() {
                    return self.open_next_queued_crop();
                }
                self.crop.reset_and_clear_queue();
            }
            CropMode::Edit => {
                let preserve = self.crop.preserve_block_size;
                let (output_w, output_h) = (self.crop.output_width, self.crop.output_height);
                let target_id = self.crop.target_id.clone();

                let Some(block) = target_id.as_deref().and_then(|id| self.image_mut(id)) else {
                    // Target removed while the session was open.
                    self.crop.reset_and_clear_queue();
                    return Ok(());
                };

                let previous_w = block.width.max(1.0);
                let previous_h = block.height.max(1.0);
                block.src = data_url;
                block.image = image;

                if !preserve {
                    block.width = output_w;
                    block.height = output_h;
                    rescale_strokes(
                        &mut block.lines,
                        output_w / previous_w,
                        output_h / previous_h,
                    );
                }

                recache_image_block(block);
                // The image content changed wholesale: old snapshots no
                // longer apply.
                block.history.reset();
                block.is_restoring_history = false;
                push_block_history(block);

                let id = block.id.clone();
                self.events.push(EditorEvent::BlockChanged(id));
                self.crop.reset_and_clear_queue();
            }
        }
        Ok(())
    }

    pub fn close_crop(&mut self) {
        self.crop.reset_and_clear_queue();
    }

    // ===== DOCUMENT BRIDGE =====

    pub fn export_document(&self) -> DocumentFile {
        document::export_document(&self.blocks)
    }

    /// Replace the live block set from a document. Blocks whose raster
    /// cannot be resolved are skipped with a notice; a payload without a
    /// blocks array fails outright and leaves the live set untouched.
    pub fn import_document(&mut self, text: &str) -> Result<()> {
        let payload = document::parse_document(text)?;

        let mut hydrated: Vec<Block> = Vec::with_capacity(payload.blocks.len());
        let mut skipped = 0usize;
        for raw in &payload.blocks {
            match self.hydrate_block(raw) {
                Ok(block) => hydrated.push(block),
                Err(error) => {
                    skipped += 1;
                    log_warn!("skipping block during import: {}", error);
                }
            }
        }

        // Legacy documents stored strokes at the top level; adopt them into
        // the first image block that has none of its own.
        if !payload.legacy_lines.is_empty() {
            let legacy: Vec<Stroke> = payload
                .legacy_lines
                .iter()
                .map(|line| Stroke::from_value(line, &mut self.id_gen))
                .collect();
            if let Some(block) = hydrated
                .iter_mut()
                .filter_map(Block::as_image_mut)
                .find(|b| b.lines.is_empty())
            {
                block.lines = legacy;
            }
        }

        self.blocks = hydrated;
        self.selected_id = None;
        self.draw.cancel();
        self.pending_recache.clear();

        for block in self.blocks.iter_mut().filter_map(Block::as_image_mut) {
            recache_image_block(block);
            block.history.reset();
            block.is_restoring_history = false;
            push_block_history(block);
        }

        self.events.push(EditorEvent::DocumentReplaced);
        self.events.push(EditorEvent::SelectionChanged(None));
        if skipped > 0 {
            self.set_notice(format!("Import skipped {skipped} unloadable block(s)."));
        }
        log_info!("imported document with {} blocks", self.blocks.len());
        Ok(())
    }

    fn hydrate_block(&mut self, raw: &serde_json::Value) -> Result<Block> {
        let kind = raw.get("kind").and_then(serde_json::Value::as_str);
        if kind == Some("text") {
            return Ok(Block::Text(TextBlock::from_value(raw, &mut self.id_gen)));
        }

        let src = match raw.get("src").and_then(serde_json::Value::as_str) {
            Some(src) if !src.is_empty() => src.to_string(),
            _ => placeholders::default_block_data_url()?,
        };
        let image = self.rasters.load(&src).map_err(|_| EditorError::MissingSource)?;
        Ok(Block::Image(ImageBlock::from_value(
            raw,
            src,
            image,
            &mut self.id_gen,
        )))
    }

    // ===== RENDERED EXPORT =====

    /// Render the composition to a raster at the given size. Transparent
    /// background; list order is z-order.
    pub fn render_composition(&self, width: u32, height: u32) -> image::RgbaImage {
        render_blocks(&self.blocks, width, height, None)
    }

    pub fn render_composition_data_url(&self, width: u32, height: u32) -> Result<String> {
        encode_png_data_url(&self.render_composition(width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MIN_BLOCK_SIZE;
    use crate::components::history::MAX_HISTORY_STATES;
    use crate::ops::filters::has_active_filters;

    fn session_with_block() -> (EditorSession, String) {
        let mut session = EditorSession::new();
        let id = session.add_default_block().unwrap();
        (session, id)
    }

    fn gesture(session: &EditorSession, id: &str, x: f64) -> TransformGesture {
        let block = session.blocks().iter().find(|b| b.id() == id).unwrap();
        TransformGesture {
            x,
            ..TransformGesture::identity(block)
        }
    }

    #[test]
    fn undo_redo_restores_the_exact_prior_snapshot() {
        let (mut session, id) = session_with_block();

        let before = BlockSnapshot::capture(session.selected_image().unwrap());
        for step in 0..3 {
            let g = gesture(&session, &id, 100.0 + f64::from(step) * 10.0);
            assert!(session.apply_transform(&id, &g));
        }
        let after = BlockSnapshot::capture(session.selected_image().unwrap());
        assert_ne!(before, after);

        for _ in 0..3 {
            session.undo();
        }
        assert_eq!(BlockSnapshot::capture(session.selected_image().unwrap()), before);

        for _ in 0..3 {
            session.redo();
        }
        assert_eq!(BlockSnapshot::capture(session.selected_image().unwrap()), after);
    }

    #[test]
    fn history_stays_bounded_and_evicts_oldest() {
        let (mut session, id) = session_with_block();

        for step in 0..10 {
            let g = gesture(&session, &id, 50.0 + f64::from(step));
            assert!(session.apply_transform(&id, &g));
        }
        let block = session.selected_image().unwrap();
        assert_eq!(block.history.len(), MAX_HISTORY_STATES);
        // Oldest surviving state is the push from four transforms before the
        // last, not the initial state.
        assert_eq!(block.history.oldest().unwrap().x, 54.0);
    }

    #[test]
    fn stroke_gesture_commits_one_history_entry() {
        let (mut session, id) = session_with_block();
        session.set_tool(Tool::Pen);
        let before_len = {
            let block = session.blocks().iter().find(|b| b.id() == id).unwrap();
            block.as_image().unwrap().history.len()
        };

        session.pointer_down(&id, (10.0, 10.0));
        session.pointer_move((400.0, 30.0));
        session.pointer_move((50.0, -10.0));
        session.pointer_up();

        let block = session.blocks().iter().find(|b| b.id() == id).unwrap();
        let image = block.as_image().unwrap();
        assert_eq!(image.lines.len(), 1);
        assert_eq!(image.history.len(), before_len + 1);
        // Points were clamped into the block box.
        let points = &image.lines[0].points;
        assert!(points.iter().step_by(2).all(|x| *x >= 0.0 && *x <= image.width));
        assert!(points.iter().skip(1).step_by(2).all(|y| *y >= 0.0 && *y <= image.height));
    }

    #[test]
    fn erase_strokes_store_black_and_tool_switch_commits() {
        let (mut session, id) = session_with_block();
        session.set_tool(Tool::Erase);
        session.pointer_down(&id, (5.0, 5.0));
        session.pointer_move((8.0, 8.0));
        // Switching tools mid-gesture commits the stroke.
        session.set_tool(Tool::Select);

        let image = session
            .blocks()
            .iter()
            .find(|b| b.id() == id)
            .and_then(Block::as_image)
            .unwrap();
        assert!(!session.is_drawing());
        assert_eq!(image.lines[0].color, "#000000");
        assert_eq!(image.lines[0].size, 22.0);
    }

    #[test]
    fn rejected_transform_pushes_no_history() {
        let (mut session, id) = session_with_block();
        let before_len = session.selected_image().unwrap().history.len();

        let mut g = gesture(&session, &id, 0.0);
        g.scale_x = MIN_BLOCK_SIZE / 10_000.0;
        assert!(!session.apply_transform(&id, &g));
        assert_eq!(session.selected_image().unwrap().history.len(), before_len);
    }

    #[test]
    fn adjustments_coalesce_until_flush() {
        let (mut session, _id) = session_with_block();

        for step in 1..=20 {
            session.set_adjustment(Adjustment::Brightness, f64::from(step) * 0.01);
        }
        assert!(session.selected_image().unwrap().filter_cache.is_none());

        session.flush_pending_recaches();
        let image = session.selected_image().unwrap();
        assert!(has_active_filters(image));
        assert!(image.filter_cache.is_some());

        // Back to zero clears the cache on the next flush.
        session.set_adjustment(Adjustment::Brightness, 0.0);
        session.flush_pending_recaches();
        assert!(session.selected_image().unwrap().filter_cache.is_none());
    }

    #[test]
    fn import_round_trip_reproduces_blocks() {
        let (mut session, _id) = session_with_block();
        session.add_text_block();

        let doc = session.export_document();
        let json = crate::document::document_to_json(&doc).unwrap();

        let mut fresh = EditorSession::new();
        fresh.import_document(&json).unwrap();

        assert_eq!(fresh.blocks().len(), 2);
        let original = session.blocks()[0].as_image().unwrap();
        let imported = fresh.blocks()[0].as_image().unwrap();
        assert_eq!(imported.x, original.x);
        assert_eq!(imported.width, original.width);
        assert_eq!(fresh.blocks()[1].kind(), "text");
        // History reseeded to a single entry.
        assert_eq!(imported.history.len(), 1);
    }

    #[test]
    fn invalid_document_leaves_live_blocks_untouched() {
        let (mut session, _id) = session_with_block();
        let result = session.import_document(r#"{"snapshot":{"blocks":42}}"#);
        assert!(matches!(result, Err(EditorError::InvalidDocument(_))));
        assert_eq!(session.blocks().len(), 1);
    }

    #[test]
    fn crop_edit_replaces_source_and_reseeds_history() {
        let (mut session, id) = session_with_block();
        for step in 0..3 {
            let g = gesture(&session, &id, 60.0 + f64::from(step));
            session.apply_transform(&id, &g);
        }
        assert!(session.selected_image().unwrap().history.len() > 1);

        session.open_crop_for_selected().unwrap();
        session.crop.set_square_center();
        session.apply_crop().unwrap();

        let image = session.selected_image().unwrap();
        assert_eq!(image.history.len(), 1);
        assert!(!session.crop.visible);
        // Non-preserve edit adopts the crop output size.
        assert_eq!(image.width, 520.0);
        assert_eq!(image.height, 520.0);
    }

    #[test]
    fn crop_upload_queue_is_fifo() {
        let mut session = EditorSession::new();
        let first = placeholders::default_block_data_url().unwrap();
        let second = placeholders::sample_image_data_url().unwrap();
        session
            .queue_crop_sources(&[
                ("first.png".to_string(), first),
                ("second.png".to_string(), second),
            ])
            .unwrap();

        assert!(session.crop.visible);
        assert_eq!(session.crop.source_name, "first.png");
        assert_eq!(session.crop.queue.len(), 1);

        session.apply_crop().unwrap();
        assert!(session.crop.visible);
        assert_eq!(session.crop.source_name, "second.png");

        session.apply_crop().unwrap();
        assert!(!session.crop.visible);
        assert_eq!(session.blocks().len(), 2);
    }

    #[test]
    fn removing_the_drawing_block_aborts_the_gesture() {
        let (mut session, id) = session_with_block();
        session.set_tool(Tool::Pen);
        session.pointer_down(&id, (5.0, 5.0));
        assert!(session.is_drawing());

        session.selected_id = Some(id);
        session.remove_selected();
        assert!(!session.is_drawing());
        assert!(session.blocks().is_empty());
    }

    #[test]
    fn eyedropper_is_capture_unavailable() {
        let mut session = EditorSession::new();
        assert!(matches!(
            session.pick_color_with_eyedropper(),
            Err(EditorError::CaptureUnavailable(_))
        ));
    }

    #[test]
    fn events_drain_once() {
        let (mut session, id) = session_with_block();
        let events = session.take_events();
        assert!(events.contains(&EditorEvent::BlockAdded(id)));
        assert!(session.take_events().is_empty());
    }
}
