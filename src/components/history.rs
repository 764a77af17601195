// ============================================================================
// BLOCK HISTORY — bounded per-image-block undo/redo snapshot stack
// ============================================================================
//
// Each image block carries its own independent stack. A snapshot is a deep
// copy of the block's editable state — never the decoded raster handle, the
// history itself, or the restoring guard, so snapshots cannot self-reference
// or duplicate pixel data.

use std::sync::Arc;

use image::RgbaImage;

use crate::block::{ImageBlock, MIN_BLOCK_SIZE, Stroke};
use crate::number::to_number;

/// Undoable steps kept per block.
pub const MAX_UNDO_STEPS: usize = 5;
/// Stack capacity: the undoable steps plus the current state.
pub const MAX_HISTORY_STATES: usize = MAX_UNDO_STEPS + 1;

/// Deep, raster-excluding copy of an image block's editable state.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockSnapshot {
    pub label: String,
    pub src: String,
    pub x: f64,
    pub y: f64,
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
}

impl BlockSnapshot {
    pub fn capture(block: &ImageBlock) -> Self {
        Self {
            label: block.label.clone(),
            src: block.src.clone(),
            x: block.x,
            y: block.y,
            width: block.width,
            height: block.height,
            rotation: block.rotation,
            scale_x: block.scale_x,
            scale_y: block.scale_y,
            brightness: block.brightness,
            contrast: block.contrast,
            saturation: block.saturation,
            hue: block.hue,
            lines: block.lines.clone(),
        }
    }

    /// Overwrite a live block's editable fields from this snapshot. The
    /// caller resolves `src` to a decoded raster first — the block is only
    /// touched once all required data is available.
    pub fn apply(&self, block: &mut ImageBlock, image: Arc<RgbaImage>) {
        block.label = self.label.clone();
        block.src = self.src.clone();
        block.image = image;
        block.x = to_number(self.x, 0.0);
        block.y = to_number(self.y, 0.0);
        block.width = to_number(self.width, block.width).round().max(MIN_BLOCK_SIZE);
        block.height = to_number(self.height, block.height).round().max(MIN_BLOCK_SIZE);
        block.rotation = to_number(self.rotation, 0.0);
        block.scale_x = if self.scale_x == 0.0 { 1.0 } else { self.scale_x };
        block.scale_y = if self.scale_y == 0.0 { 1.0 } else { self.scale_y };
        block.brightness = to_number(self.brightness, 0.0);
        block.contrast = to_number(self.contrast, 0.0);
        block.saturation = to_number(self.saturation, 0.0);
        block.hue = to_number(self.hue, 0.0);
        block.lines = self.lines.clone();
    }
}

/// Bounded snapshot stack plus a cursor into it.
#[derive(Debug, Default)]
pub struct BlockHistory {
    snapshots: Vec<BlockSnapshot>,
    /// Index of the snapshot matching the block's current state; -1 when empty.
    index: isize,
}

impl BlockHistory {
    pub fn new() -> Self {
        Self {
            snapshots: Vec::new(),
            index: -1,
        }
    }

    /// Append a snapshot. Any redo branch past the cursor is discarded
    /// (branch-on-write), and the oldest entry is evicted once the stack
    /// would exceed `MAX_HISTORY_STATES`.
    pub fn push(&mut self, snapshot: BlockSnapshot) {
        let keep = (self.index + 1).max(0) as usize;
        self.snapshots.truncate(keep.min(self.snapshots.len()));
        self.snapshots.push(snapshot);

        while self.snapshots.len() > MAX_HISTORY_STATES {
            self.snapshots.remove(0);
        }
        self.index = self.snapshots.len() as isize - 1;
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index >= 0 && self.index < self.snapshots.len() as isize - 1
    }

    pub fn snapshot_at(&self, index: isize) -> Option<&BlockSnapshot> {
        if index < 0 {
            return None;
        }
        self.snapshots.get(index as usize)
    }

    pub fn index(&self) -> isize {
        self.index
    }

    /// Move the cursor after a successful restore. Out-of-range values are
    /// ignored — the restore path validates before applying.
    pub fn set_index(&mut self, index: isize) {
        if index >= 0 && (index as usize) < self.snapshots.len() {
            self.index = index;
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Discard everything. Used when a block's image content is replaced
    /// wholesale (crop-replace, document import) before reseeding.
    pub fn reset(&mut self) {
        self.snapshots.clear();
        self.index = -1;
    }

    pub fn oldest(&self) -> Option<&BlockSnapshot> {
        self.snapshots.first()
    }
}

/// Push the block's current state onto its own history. No-op while the
/// block is replaying a snapshot.
pub fn push_block_history(block: &mut ImageBlock) {
    if block.is_restoring_history {
        return;
    }
    let snapshot = BlockSnapshot::capture(block);
    block.history.push(snapshot);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::StrokeTool;

    fn block() -> ImageBlock {
        ImageBlock::from_raster(
            "img-1".to_string(),
            "Image",
            String::new(),
            Arc::new(RgbaImage::new(40, 40)),
            (0.0, 0.0),
        )
    }

    fn snapshot_with_x(x: f64) -> BlockSnapshot {
        let mut b = block();
        b.x = x;
        BlockSnapshot::capture(&b)
    }

    #[test]
    fn stack_is_bounded_and_evicts_oldest() {
        let mut history = BlockHistory::new();
        for i in 0..7 {
            history.push(snapshot_with_x(i as f64));
        }
        assert_eq!(history.len(), MAX_HISTORY_STATES);
        // The 7th push evicted x=0; the old 2nd-oldest is now first.
        assert_eq!(history.oldest().map(|s| s.x), Some(1.0));
        assert_eq!(history.index(), MAX_HISTORY_STATES as isize - 1);
    }

    #[test]
    fn push_after_undo_discards_redo_branch() {
        let mut history = BlockHistory::new();
        history.push(snapshot_with_x(0.0));
        history.push(snapshot_with_x(1.0));
        history.push(snapshot_with_x(2.0));

        history.set_index(0);
        assert!(history.can_redo());

        history.push(snapshot_with_x(9.0));
        assert!(!history.can_redo());
        assert_eq!(history.len(), 2);
        assert_eq!(history.snapshot_at(1).map(|s| s.x), Some(9.0));
    }

    #[test]
    fn cursor_flags_at_bounds() {
        let mut history = BlockHistory::new();
        assert!(!history.can_undo());
        assert!(!history.can_redo());

        history.push(snapshot_with_x(0.0));
        assert!(!history.can_undo());
        assert!(!history.can_redo());

        history.push(snapshot_with_x(1.0));
        assert!(history.can_undo());
        assert!(!history.can_redo());

        history.set_index(0);
        assert!(!history.can_undo());
        assert!(history.can_redo());
    }

    #[test]
    fn restoring_guard_suppresses_push() {
        let mut b = block();
        push_block_history(&mut b);
        assert_eq!(b.history.len(), 1);

        b.is_restoring_history = true;
        push_block_history(&mut b);
        assert_eq!(b.history.len(), 1);
    }

    #[test]
    fn snapshot_excludes_raster_and_history() {
        let mut b = block();
        b.lines.push(Stroke {
            id: "line-1".into(),
            tool: StrokeTool::Erase,
            color: "#000000".into(),
            size: 22.0,
            points: vec![0.0, 0.0, 5.0, 5.0],
        });
        let snap = BlockSnapshot::capture(&b);
        assert_eq!(snap.lines, b.lines);

        // Applying onto another block restores every editable field.
        let mut other = block();
        other.x = 99.0;
        let raster = Arc::new(RgbaImage::new(40, 40));
        snap.apply(&mut other, Arc::clone(&raster));
        assert_eq!(other.x, b.x);
        assert_eq!(other.lines, b.lines);
        assert!(Arc::ptr_eq(&other.image, &raster));
    }
}
