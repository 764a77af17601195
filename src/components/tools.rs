// ============================================================================
// TOOL STATE — active tool, brush settings, and the freehand drawing gesture
// ============================================================================

use crate::block::{DEFAULT_BRUSH_COLOR, StrokeTool};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Select,
    Pen,
    Erase,
}

impl Tool {
    /// Pen and erase drive the stroke state machine; select drives
    /// move/transform gestures.
    pub fn is_drawing_tool(&self) -> bool {
        matches!(self, Tool::Pen | Tool::Erase)
    }

    pub fn stroke_tool(&self) -> Option<StrokeTool> {
        match self {
            Tool::Pen => Some(StrokeTool::Pen),
            Tool::Erase => Some(StrokeTool::Erase),
            Tool::Select => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tool::Select => "select",
            Tool::Pen => "pen",
            Tool::Erase => "erase",
        }
    }
}

/// Brush configuration shared by both drawing tools.
#[derive(Clone, Debug)]
pub struct BrushSettings {
    pub brush_color: String,
    pub brush_size: f64,
    pub eraser_size: f64,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            brush_color: DEFAULT_BRUSH_COLOR.to_string(),
            brush_size: 10.0,
            eraser_size: 22.0,
        }
    }
}

impl BrushSettings {
    /// Stroke color recorded for a new stroke. Erase strokes store black;
    /// the destination-out compositing mode is what subtracts pigment.
    pub fn stroke_color(&self, tool: StrokeTool) -> String {
        match tool {
            StrokeTool::Pen => self.brush_color.clone(),
            StrokeTool::Erase => "#000000".to_string(),
        }
    }

    pub fn stroke_size(&self, tool: StrokeTool) -> f64 {
        match tool {
            StrokeTool::Pen => self.brush_size,
            StrokeTool::Erase => self.eraser_size,
        }
    }
}

/// The stroke gesture state machine: `Idle -> Drawing -> Idle`. While
/// drawing, `drawing_block_id` names the image block receiving points.
#[derive(Clone, Debug, Default)]
pub struct DrawState {
    pub is_drawing: bool,
    pub drawing_block_id: String,
}

impl DrawState {
    pub fn begin(&mut self, block_id: &str) {
        self.is_drawing = true;
        self.drawing_block_id = block_id.to_string();
    }

    /// Leave `Drawing`, returning the id of the block whose stroke should be
    /// committed (history push happens at the session level).
    pub fn finish(&mut self) -> Option<String> {
        if !self.is_drawing {
            return None;
        }
        self.is_drawing = false;
        Some(std::mem::take(&mut self.drawing_block_id))
    }

    /// Abort without committing — used when the target block was removed
    /// mid-gesture.
    pub fn cancel(&mut self) {
        self.is_drawing = false;
        self.drawing_block_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erase_strokes_always_record_black() {
        let brush = BrushSettings {
            brush_color: "#ff0000".to_string(),
            ..Default::default()
        };
        assert_eq!(brush.stroke_color(StrokeTool::Pen), "#ff0000");
        assert_eq!(brush.stroke_color(StrokeTool::Erase), "#000000");
        assert_eq!(brush.stroke_size(StrokeTool::Erase), 22.0);
    }

    #[test]
    fn draw_state_round_trips() {
        let mut draw = DrawState::default();
        assert!(draw.finish().is_none());

        draw.begin("img-1");
        assert!(draw.is_drawing);
        assert_eq!(draw.finish().as_deref(), Some("img-1"));
        assert!(!draw.is_drawing);
        assert!(draw.finish().is_none());
    }
}
