// ============================================================================
// CollageFE — block composition editing engine
// ============================================================================
//
// Image and text blocks arranged in document space: freehand pen/erase
// strokes, non-destructive tonal filters, crop/rotate/resample of sources,
// bounded per-image-block undo/redo, and JSON document round-tripping.
// Headless by design; `cli.rs` drives it for batch rendering.

#![allow(clippy::too_many_arguments)]

pub mod block;
pub mod cli;
pub mod components;
pub mod document;
pub mod editor;
pub mod error;
pub mod logger;
pub mod number;
pub mod ops;
pub mod placeholders;
pub mod raster;
pub mod render;

pub use block::{Block, ImageBlock, Stroke, StrokeTool, TextBlock};
pub use editor::{EditorEvent, EditorSession};
pub use error::{EditorError, Result};
