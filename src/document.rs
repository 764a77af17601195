// ============================================================================
// DOCUMENT BRIDGE — versioned export records and import unwrapping
// ============================================================================
//
// Export goes through typed camelCase records so the on-disk shape is fixed
// by this module, not by whatever the live structs happen to look like.
// Import is the reverse but paranoid: payloads are untrusted JSON and only
// the `blocks` list being a real array is a hard requirement.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::block::{Block, Stroke};
use crate::error::{EditorError, Result};

pub const DOCUMENT_VERSION: u32 = 1;

// ===== EXPORT RECORDS =====

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFile {
    pub version: u32,
    pub generated_at: String,
    pub snapshot: SnapshotRecord,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub blocks: Vec<BlockRecord>,
    /// Always empty on export; kept for compatibility with older documents
    /// that stored strokes at the top level.
    pub lines: Vec<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BlockRecord {
    #[serde(rename_all = "camelCase")]
    Image {
        id: String,
        label: String,
        src: String,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        rotation: f64,
        scale_x: f64,
        scale_y: f64,
        brightness: f64,
        contrast: f64,
        saturation: f64,
        hue: f64,
        lines: Vec<Stroke>,
    },
    #[serde(rename_all = "camelCase")]
    Text {
        id: String,
        text: String,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        rotation: f64,
        scale_x: f64,
        scale_y: f64,
        font_size: f64,
        font_family: String,
        fill: String,
    },
}

impl BlockRecord {
    pub fn from_block(block: &Block) -> Self {
        match block {
            Block::Image(b) => BlockRecord::Image {
                id: b.id.clone(),
                label: b.label.clone(),
                src: b.src.clone(),
                x: b.x,
                y: b.y,
                width: b.width,
                height: b.height,
                rotation: b.rotation,
                scale_x: b.scale_x,
                scale_y: b.scale_y,
                brightness: b.brightness,
                contrast: b.contrast,
                saturation: b.saturation,
                hue: b.hue,
                lines: b.lines.clone(),
            },
            Block::Text(b) => BlockRecord::Text {
                id: b.id.clone(),
                text: b.text.clone(),
                x: b.x,
                y: b.y,
                width: b.width,
                height: b.height,
                rotation: b.rotation,
                scale_x: b.scale_x,
                scale_y: b.scale_y,
                font_size: b.font_size,
                font_family: b.font_family.clone(),
                fill: b.fill.clone(),
            },
        }
    }
}

/// Snapshot the live block set into a persistable document.
pub fn export_document(blocks: &[Block]) -> DocumentFile {
    DocumentFile {
        version: DOCUMENT_VERSION,
        generated_at: iso_timestamp(),
        snapshot: SnapshotRecord {
            blocks: blocks.iter().map(BlockRecord::from_block).collect(),
            lines: Vec::new(),
        },
    }
}

pub fn document_to_json(document: &DocumentFile) -> Result<String> {
    serde_json::to_string_pretty(document)
        .map_err(|e| EditorError::InvalidDocument(e.to_string()))
}

// ===== IMPORT =====

/// Parsed-but-unhydrated import payload: raw block records plus any legacy
/// top-level stroke list.
#[derive(Debug)]
pub struct ImportPayload {
    pub blocks: Vec<Value>,
    pub legacy_lines: Vec<Value>,
}

/// Parse an import payload. The document may be the snapshot itself or wrap
/// it under `.snapshot`, `.board.snapshot`, or `.boards[0].snapshot`.
pub fn parse_document(text: &str) -> Result<ImportPayload> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| EditorError::InvalidDocument(e.to_string()))?;
    let snapshot = unwrap_snapshot(&value);

    let blocks = match snapshot.get("blocks") {
        Some(Value::Array(list)) => list.clone(),
        _ => {
            return Err(EditorError::InvalidDocument(
                "document has no blocks list".to_string(),
            ));
        }
    };

    let legacy_lines = match snapshot.get("lines") {
        Some(Value::Array(list)) => list.clone(),
        _ => Vec::new(),
    };

    Ok(ImportPayload { blocks, legacy_lines })
}

fn unwrap_snapshot(value: &Value) -> &Value {
    if let Some(snapshot) = value.get("snapshot") {
        return snapshot;
    }
    if let Some(snapshot) = value.get("board").and_then(|b| b.get("snapshot")) {
        return snapshot;
    }
    if let Some(snapshot) = value
        .get("boards")
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(|b| b.get("snapshot"))
    {
        return snapshot;
    }
    value
}

// ===== TIMESTAMP =====

/// UTC wall-clock as `YYYY-MM-DDTHH:MM:SSZ`, derived from the system clock
/// without a calendar dependency.
pub fn iso_timestamp() -> String {
    let secs = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs(),
        Err(_) => 0,
    };
    let days = (secs / 86_400) as i64;
    let time = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        time / 3600,
        (time / 60) % 60,
        time % 60
    )
}

/// Days-since-epoch to (year, month, day), proleptic Gregorian.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if month <= 2 { year + 1 } else { year };
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ImageBlock, TextBlock};
    use image::RgbaImage;
    use std::sync::Arc;

    fn sample_blocks() -> Vec<Block> {
        let image = Block::Image(ImageBlock::from_raster(
            "img-1".to_string(),
            "Image",
            "data:image/png;base64,".to_string(),
            Arc::new(RgbaImage::new(8, 8)),
            (36.0, 36.0),
        ));
        let text = Block::Text(TextBlock::new("txt-1".to_string()));
        vec![image, text]
    }

    #[test]
    fn export_shape_is_versioned_and_camel_cased() {
        let doc = export_document(&sample_blocks());
        let json = document_to_json(&doc).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["version"], 1);
        assert!(value["generatedAt"].as_str().unwrap().ends_with('Z'));
        let blocks = value["snapshot"]["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["kind"], "image");
        assert!(blocks[0]["scaleX"].is_number());
        assert_eq!(blocks[1]["kind"], "text");
        assert!(blocks[1]["fontSize"].is_number());
        assert!(value["snapshot"]["lines"].as_array().unwrap().is_empty());
    }

    #[test]
    fn import_unwraps_wrapped_snapshots() {
        for wrapper in [
            r#"{"snapshot":{"blocks":[{"kind":"text"}]}}"#,
            r#"{"board":{"snapshot":{"blocks":[{"kind":"text"}]}}}"#,
            r#"{"boards":[{"snapshot":{"blocks":[{"kind":"text"}]}}]}"#,
            r#"{"blocks":[{"kind":"text"}]}"#,
        ] {
            let payload = parse_document(wrapper).unwrap();
            assert_eq!(payload.blocks.len(), 1, "failed for {wrapper}");
        }
    }

    #[test]
    fn non_array_blocks_is_invalid() {
        let result = parse_document(r#"{"snapshot":{"blocks":"nope"}}"#);
        assert!(matches!(result, Err(EditorError::InvalidDocument(_))));
    }

    #[test]
    fn legacy_top_level_lines_are_surfaced() {
        let payload = parse_document(
            r#"{"blocks":[],"lines":[{"tool":"pen","points":[1,2,3,4]}]}"#,
        )
        .unwrap();
        assert_eq!(payload.legacy_lines.len(), 1);
    }

    #[test]
    fn civil_conversion_handles_known_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
    }
}
