// ============================================================================
// CROP PIPELINE — session state, rectangle normalization, output rendering
// ============================================================================
//
// One transient session drives both crop flows: `Upload` turns the composited
// result into a brand-new block (queued sources are worked through FIFO),
// `Edit` swaps the result into an existing block's source. Normalization
// runs before every preview and commit so the rectangle can never leave the
// source bounds regardless of what the inputs did.

use std::collections::VecDeque;
use std::sync::Arc;

use image::RgbaImage;

use crate::error::{EditorError, Result};
use crate::number::clamp;
use crate::render::{SrcRect, draw_sub_image_rotated};

/// Largest output edge a crop commit may request.
pub const MAX_OUTPUT_EDGE: f64 = 4096.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CropMode {
    /// Composited raster becomes a new image block.
    #[default]
    Upload,
    /// Composited raster replaces an existing block's source.
    Edit,
}

/// A source waiting its turn in the upload flow.
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedSource {
    pub name: String,
    pub src: String,
}

#[derive(Clone, Debug, Default)]
pub struct CropSession {
    pub visible: bool,
    pub mode: CropMode,
    pub preserve_block_size: bool,
    /// Block being re-sourced when `mode == Edit`.
    pub target_id: Option<String>,
    pub queue: VecDeque<QueuedSource>,

    pub source_name: String,
    pub source_src: String,
    pub source_width: f64,
    pub source_height: f64,
    pub source_image: Option<Arc<RgbaImage>>,

    pub crop_x: f64,
    pub crop_y: f64,
    pub crop_width: f64,
    pub crop_height: f64,
    pub output_width: f64,
    pub output_height: f64,
    pub rotation: f64,
}

impl CropSession {
    /// Stale session fields must never leak into the next source, so every
    /// close and every commit funnels through here.
    pub fn reset(&mut self) {
        let queue = std::mem::take(&mut self.queue);
        *self = Self::default();
        self.queue = queue;
    }

    /// Full reset including any queued sources. Used when the workflow is
    /// dismissed outright.
    pub fn reset_and_clear_queue(&mut self) {
        *self = Self::default();
    }

    /// Install a decoded source and start from the full-image preset.
    pub fn set_source(&mut self, name: &str, src: &str, image: Arc<RgbaImage>) {
        self.source_name = name.to_string();
        self.source_src = src.to_string();
        self.source_width = f64::from(image.width().max(1));
        self.source_height = f64::from(image.height().max(1));
        self.source_image = Some(image);
        self.set_full_image();
    }

    /// Clamp every session field into the source's coordinate space. The
    /// rectangle can never extend past the source bounds.
    pub fn normalize(&mut self) {
        let sw = self.source_width.round().max(1.0);
        let sh = self.source_height.round().max(1.0);

        self.crop_x = clamp(self.crop_x.round(), 0.0, (sw - 1.0).max(0.0));
        self.crop_y = clamp(self.crop_y.round(), 0.0, (sh - 1.0).max(0.0));
        self.crop_width = clamp(self.crop_width.round(), 1.0, (sw - self.crop_x).max(1.0));
        self.crop_height = clamp(self.crop_height.round(), 1.0, (sh - self.crop_y).max(1.0));
        self.output_width = clamp(self.output_width.round(), 1.0, MAX_OUTPUT_EDGE);
        self.output_height = clamp(self.output_height.round(), 1.0, MAX_OUTPUT_EDGE);
        self.rotation = clamp(self.rotation, -180.0, 180.0);
    }

    /// Preset: crop the entire source at native size, rotation cleared.
    pub fn set_full_image(&mut self) {
        self.crop_x = 0.0;
        self.crop_y = 0.0;
        self.crop_width = self.source_width;
        self.crop_height = self.source_height;
        self.output_width = self.source_width;
        self.output_height = self.source_height;
        self.rotation = 0.0;
        self.normalize();
    }

    /// Preset: the largest centered square that fits the source, output at
    /// the square's side.
    pub fn set_square_center(&mut self) {
        let side = self.source_width.min(self.source_height);
        self.crop_x = ((self.source_width - side) / 2.0).floor();
        self.crop_y = ((self.source_height - side) / 2.0).floor();
        self.crop_width = side;
        self.crop_height = side;
        self.output_width = side;
        self.output_height = side;
        self.normalize();
    }

    /// Composite the normalized crop into an output raster. Also serves as
    /// the live preview; the preview and the commit must never disagree.
    pub fn render_output(&mut self) -> Result<RgbaImage> {
        self.normalize();
        let image = self
            .source_image
            .as_ref()
            .ok_or(EditorError::MissingSource)?;

        Ok(draw_sub_image_rotated(
            image,
            SrcRect {
                x: self.crop_x,
                y: self.crop_y,
                width: self.crop_width,
                height: self.crop_height,
            },
            self.output_width as u32,
            self.output_height as u32,
            self.rotation,
        ))
    }

    pub fn enqueue(&mut self, name: &str, src: &str) {
        self.queue.push_back(QueuedSource {
            name: name.to_string(),
            src: src.to_string(),
        });
    }

    /// Take the next queued source, strictly first-in-first-out.
    pub fn pop_queued(&mut self) -> Option<QueuedSource> {
        self.queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_source(width: u32, height: u32) -> CropSession {
        let mut session = CropSession::default();
        session.set_source("photo.png", "data:image/png;base64,", Arc::new(RgbaImage::new(width, height)));
        session
    }

    #[test]
    fn normalization_keeps_the_rect_inside_the_source() {
        let mut s = session_with_source(800, 600);
        s.crop_x = 750.0;
        s.crop_y = 0.0;
        s.crop_width = 200.0;
        s.crop_height = 100.0;
        s.normalize();

        assert_eq!(s.crop_x, 750.0);
        assert_eq!(s.crop_width, 50.0);
        assert_eq!(s.crop_height, 100.0);
    }

    #[test]
    fn normalization_clamps_output_and_rotation() {
        let mut s = session_with_source(800, 600);
        s.output_width = 9000.0;
        s.output_height = 0.0;
        s.rotation = 270.0;
        s.normalize();

        assert_eq!(s.output_width, 4096.0);
        assert_eq!(s.output_height, 1.0);
        assert_eq!(s.rotation, 180.0);
    }

    #[test]
    fn square_center_preset_on_landscape_source() {
        let mut s = session_with_source(1024, 640);
        s.set_square_center();

        assert_eq!(s.crop_x, 192.0);
        assert_eq!(s.crop_y, 0.0);
        assert_eq!(s.crop_width, 640.0);
        assert_eq!(s.crop_height, 640.0);
        assert_eq!(s.output_width, 640.0);
    }

    #[test]
    fn reset_clears_fields_but_keeps_the_queue() {
        let mut s = session_with_source(64, 64);
        s.visible = true;
        s.enqueue("next.png", "data:image/png;base64,");
        s.reset();

        assert!(!s.visible);
        assert!(s.source_image.is_none());
        assert_eq!(s.source_width, 0.0);
        assert_eq!(s.queue.len(), 1);

        s.reset_and_clear_queue();
        assert!(s.queue.is_empty());
    }

    #[test]
    fn render_without_source_is_an_error() {
        let mut s = CropSession::default();
        assert!(matches!(s.render_output(), Err(EditorError::MissingSource)));
    }

    #[test]
    fn render_output_matches_requested_size() {
        let mut s = session_with_source(100, 80);
        s.crop_x = 10.0;
        s.crop_y = 10.0;
        s.crop_width = 40.0;
        s.crop_height = 40.0;
        s.output_width = 20.0;
        s.output_height = 20.0;
        let out = s.render_output().unwrap();
        assert_eq!(out.dimensions(), (20, 20));
    }
}
