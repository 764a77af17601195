// ============================================================================
// TRANSFORM OPERATIONS — gesture bake-down, flips, rotation, block reset
// ============================================================================
//
// Interactive transforms arrive as a final position/rotation plus signed
// scale factors. Committing a gesture bakes the scale magnitude into the
// stored width/height and re-derives the ±1 flip sign, so `scale_x`/`scale_y`
// never carry magnitude between gestures.

use crate::block::{Block, ImageBlock, MIN_BLOCK_SIZE, MIN_FONT_SIZE, Stroke};

/// Final node state of a drag-resize/rotate gesture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformGesture {
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl TransformGesture {
    /// An identity gesture at the block's current position.
    pub fn identity(block: &Block) -> Self {
        let (x, y) = block.position();
        Self {
            x,
            y,
            rotation: block.rotation(),
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlipAxis {
    Horizontal,
    Vertical,
}

/// Commit a transform gesture onto a block.
///
/// Returns `false` (leaving the block untouched) when the resulting box
/// would be under `MIN_BLOCK_SIZE` device units on either axis — the
/// anti-degenerate-box guard, not an error.
///
/// On commit: position/rotation are recorded verbatim, |scale| is baked
/// into width/height (rounded, floored at the minimum), the stored sign is
/// re-derived from the input sign, image strokes are rescaled per axis and
/// text size by the vertical factor.
pub fn apply_block_transform(block: &mut Block, gesture: &TransformGesture) -> bool {
    let abs_x = gesture.scale_x.abs();
    let abs_y = gesture.scale_y.abs();
    let (width, height) = block.size();

    if (width * abs_x).abs() < MIN_BLOCK_SIZE || (height * abs_y).abs() < MIN_BLOCK_SIZE {
        return false;
    }

    let sign_x = if gesture.scale_x < 0.0 { -1.0 } else { 1.0 };
    let sign_y = if gesture.scale_y < 0.0 { -1.0 } else { 1.0 };

    match block {
        Block::Image(b) => {
            b.x = gesture.x;
            b.y = gesture.y;
            b.rotation = gesture.rotation;
            b.width = (b.width * abs_x).round().max(MIN_BLOCK_SIZE);
            b.height = (b.height * abs_y).round().max(MIN_BLOCK_SIZE);
            rescale_strokes(&mut b.lines, abs_x, abs_y);
            b.scale_x = sign_x;
            b.scale_y = sign_y;
        }
        Block::Text(b) => {
            b.x = gesture.x;
            b.y = gesture.y;
            b.rotation = gesture.rotation;
            b.width = (b.width * abs_x).round().max(MIN_BLOCK_SIZE);
            b.height = (b.height * abs_y).round().max(MIN_BLOCK_SIZE);
            b.scale_x = sign_x;
            b.scale_y = sign_y;
            b.font_size = (b.font_size * abs_y).round().max(MIN_FONT_SIZE);
        }
    }
    true
}

/// Rescale every stroke's points so they stay pixel-aligned to the resized
/// box. Even indices are x values, odd indices y values.
pub fn rescale_strokes(lines: &mut [Stroke], scale_x: f64, scale_y: f64) {
    for line in lines.iter_mut() {
        for (index, value) in line.points.iter_mut().enumerate() {
            if index % 2 == 0 {
                *value *= scale_x;
            } else {
                *value *= scale_y;
            }
        }
    }
}

/// Toggle a flip sign, translating the anchor so the visual bounding box
/// stays where it was. Applying the same flip twice is an involution.
pub fn flip_image_block(block: &mut ImageBlock, axis: FlipAxis) {
    match axis {
        FlipAxis::Horizontal => {
            let previous_sign = if block.scale_x < 0.0 { -1.0 } else { 1.0 };
            block.x += previous_sign * block.width;
            block.scale_x *= -1.0;
        }
        FlipAxis::Vertical => {
            let previous_sign = if block.scale_y < 0.0 { -1.0 } else { 1.0 };
            block.y += previous_sign * block.height;
            block.scale_y *= -1.0;
        }
    }
}

/// Rotation nudge used by the toolbar's rotate buttons.
pub fn rotate_block_by(block: &mut Block, delta: f64) {
    match block {
        Block::Image(b) => b.rotation += delta,
        Block::Text(b) => b.rotation += delta,
    }
}

/// Recenter a block on the stage and clear rotation, flips, and (for image
/// blocks) every tonal scalar.
pub fn reset_block(block: &mut Block, stage_width: f64, stage_height: f64) {
    let (width, height) = block.size();
    let x = ((stage_width - width) / 2.0).round().max(0.0);
    let y = ((stage_height - height) / 2.0).round().max(0.0);

    match block {
        Block::Image(b) => {
            b.x = x;
            b.y = y;
            b.rotation = 0.0;
            b.scale_x = 1.0;
            b.scale_y = 1.0;
            b.brightness = 0.0;
            b.contrast = 0.0;
            b.saturation = 0.0;
            b.hue = 0.0;
        }
        Block::Text(b) => {
            b.x = x;
            b.y = y;
            b.rotation = 0.0;
            b.scale_x = 1.0;
            b.scale_y = 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{StrokeTool, TextBlock};
    use image::RgbaImage;
    use std::sync::Arc;

    fn image_block() -> ImageBlock {
        let mut b = ImageBlock::from_raster(
            "img-1".to_string(),
            "Image",
            String::new(),
            Arc::new(RgbaImage::new(1, 1)),
            (10.0, 20.0),
        );
        b.width = 100.0;
        b.height = 50.0;
        b.lines.push(Stroke {
            id: "line-1".to_string(),
            tool: StrokeTool::Pen,
            color: "#0f766e".to_string(),
            size: 10.0,
            points: vec![10.0, 5.0, 40.0, 25.0],
        });
        b
    }

    #[test]
    fn bake_multiplies_size_and_strokes_then_normalizes_sign() {
        let mut block = Block::Image(image_block());
        let applied = apply_block_transform(
            &mut block,
            &TransformGesture {
                x: 15.0,
                y: 25.0,
                rotation: 30.0,
                scale_x: -2.0,
                scale_y: 0.5,
            },
        );
        assert!(applied);

        let b = block.as_image().unwrap();
        assert_eq!((b.x, b.y, b.rotation), (15.0, 25.0, 30.0));
        assert_eq!((b.width, b.height), (200.0, 25.0));
        assert_eq!((b.scale_x, b.scale_y), (-1.0, 1.0));
        assert_eq!(b.lines[0].points, vec![20.0, 2.5, 80.0, 12.5]);
    }

    #[test]
    fn identity_gesture_is_idempotent() {
        let mut block = Block::Image(image_block());
        let gesture = TransformGesture::identity(&block);

        for _ in 0..3 {
            assert!(apply_block_transform(&mut block, &gesture));
        }
        let b = block.as_image().unwrap();
        assert_eq!((b.width, b.height), (100.0, 50.0));
        assert_eq!(b.lines[0].points, vec![10.0, 5.0, 40.0, 25.0]);
    }

    #[test]
    fn degenerate_box_is_rejected_unchanged() {
        let mut block = Block::Image(image_block());
        let rejected = apply_block_transform(
            &mut block,
            &TransformGesture {
                x: 0.0,
                y: 0.0,
                rotation: 0.0,
                scale_x: 0.1,
                scale_y: 1.0,
            },
        );
        assert!(!rejected);

        let b = block.as_image().unwrap();
        assert_eq!((b.x, b.y), (10.0, 20.0));
        assert_eq!((b.width, b.height), (100.0, 50.0));
    }

    #[test]
    fn flip_is_an_involution() {
        let mut b = image_block();
        let (x0, sign0) = (b.x, b.scale_x);

        flip_image_block(&mut b, FlipAxis::Horizontal);
        assert_eq!(b.scale_x, -sign0);
        assert_eq!(b.x, x0 + b.width);

        flip_image_block(&mut b, FlipAxis::Horizontal);
        assert_eq!(b.scale_x, sign0);
        assert_eq!(b.x, x0);
    }

    #[test]
    fn text_bake_rescales_font_size_by_vertical_factor() {
        let mut block = Block::Text(TextBlock::new("txt-1".to_string()));
        assert!(apply_block_transform(
            &mut block,
            &TransformGesture {
                x: 0.0,
                y: 0.0,
                rotation: 0.0,
                scale_x: 1.0,
                scale_y: 2.0,
            },
        ));
        match &block {
            Block::Text(b) => {
                assert_eq!(b.height, 168.0);
                assert_eq!(b.font_size, 60.0);
                assert_eq!(b.scale_y, 1.0);
            }
            Block::Image(_) => unreachable!(),
        }
    }
}
