// ============================================================================
// CollageFE CLI — headless document processing via command-line arguments
// ============================================================================
//
// Usage examples:
//   collagefe --input board.json --output composition.png
//   collagefe -i board.json -o out.jpg --quality 85 --width 1920 --height 1240
//   collagefe -i board.json --output normalized.json      (re-emit the document)
//   collagefe -i photo.png -o board.json                  (wrap an image in a document)
//
// All processing runs synchronously on the current thread.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::document;
use crate::editor::{DEFAULT_STAGE_HEIGHT, DEFAULT_STAGE_WIDTH, EditorSession};
use crate::error::EditorError;
use crate::raster::read_file_as_data_url;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// CollageFE headless composition processor.
///
/// Render block documents to rasters and normalize documents — no GUI required.
#[derive(Parser, Debug)]
#[command(
    name = "collagefe",
    about = "CollageFE headless composition renderer",
    long_about = "Load a block-composition document and render it to PNG/JPEG, or\n\
                  re-emit it as a normalized document. Plain image inputs are wrapped\n\
                  into a single-block document first.\n\n\
                  Example:\n  \
                  collagefe --input board.json --output composition.png\n  \
                  collagefe -i board.json -o normalized.json"
)]
pub struct CliArgs {
    /// Input file: a composition document (.json) or a plain image.
    #[arg(short, long, value_name = "FILE", required = true)]
    pub input: PathBuf,

    /// Output file path. Extension selects the mode: .png/.jpg render the
    /// composition, .json writes a normalized document.
    #[arg(short, long, value_name = "FILE", required = true)]
    pub output: PathBuf,

    /// Render width in pixels. Defaults to the bounding box of the blocks,
    /// falling back to the stage size for empty documents.
    #[arg(long, value_name = "PX")]
    pub width: Option<u32>,

    /// Render height in pixels.
    #[arg(long, value_name = "PX")]
    pub height: Option<u32>,

    /// JPEG quality (1-100, default 90).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Print per-step timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the CLI and return an OS exit code. `0` = success, `1` = failure.
pub fn run(args: CliArgs) -> ExitCode {
    let started = Instant::now();
    match process(&args) {
        Ok(summary) => {
            if args.verbose {
                println!("{summary} in {:.1?}", started.elapsed());
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn process(args: &CliArgs) -> Result<String, EditorError> {
    let mut session = EditorSession::new();
    load_input(&mut session, &args.input)?;

    let extension = args
        .output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match extension.as_str() {
        "json" => {
            let doc = session.export_document();
            let json = document::document_to_json(&doc)?;
            std::fs::write(&args.output, json)
                .map_err(|e| EditorError::Read(format!("{}: {e}", args.output.display())))?;
            Ok(format!(
                "wrote document with {} block(s) to {}",
                doc.snapshot.blocks.len(),
                args.output.display()
            ))
        }
        "png" | "jpg" | "jpeg" => {
            let (width, height) = render_size(args, &session);
            let rendered = session.render_composition(width, height);
            write_raster(&rendered, &args.output, &extension, args.quality)?;
            Ok(format!(
                "rendered {width}x{height} composition to {}",
                args.output.display()
            ))
        }
        other => Err(EditorError::InvalidDocument(format!(
            "unsupported output extension '{other}' (use .png, .jpg, or .json)"
        ))),
    }
}

/// A JSON input is a document; anything else is treated as an image and
/// wrapped into a fresh single-block document.
fn load_input(session: &mut EditorSession, input: &Path) -> Result<(), EditorError> {
    let is_document = input
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_document {
        let text = std::fs::read_to_string(input)
            .map_err(|e| EditorError::Read(format!("{}: {e}", input.display())))?;
        session.import_document(&text)?;
    } else {
        let src = read_file_as_data_url(input)?;
        let label = input
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("Image");
        session.add_image_block_from_src(&src, label)?;
    }
    Ok(())
}

fn render_size(args: &CliArgs, session: &EditorSession) -> (u32, u32) {
    let fallback = session.bounds().map_or(
        (DEFAULT_STAGE_WIDTH, DEFAULT_STAGE_HEIGHT),
        |b| (b.max_x.max(1.0), b.max_y.max(1.0)),
    );
    (
        args.width.unwrap_or(fallback.0.ceil() as u32).max(1),
        args.height.unwrap_or(fallback.1.ceil() as u32).max(1),
    )
}

fn write_raster(
    image: &image::RgbaImage,
    path: &Path,
    extension: &str,
    quality: u8,
) -> Result<(), EditorError> {
    let wrap = |e: image::ImageError| EditorError::Load(format!("{}: {e}", path.display()));
    match extension {
        "jpg" | "jpeg" => {
            let file = std::fs::File::create(path)
                .map_err(|e| EditorError::Read(format!("{}: {e}", path.display())))?;
            let mut writer = std::io::BufWriter::new(file);
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                &mut writer,
                quality.clamp(1, 100),
            );
            let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            encoder
                .encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ColorType::Rgb8)
                .map_err(wrap)
        }
        _ => image.save(path).map_err(wrap),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn arg_definition_is_consistent() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn render_size_prefers_explicit_flags() {
        let args = CliArgs {
            input: PathBuf::from("in.json"),
            output: PathBuf::from("out.png"),
            width: Some(640),
            height: Some(480),
            quality: 90,
            verbose: false,
        };
        let session = EditorSession::new();
        assert_eq!(render_size(&args, &session), (640, 480));
    }

    #[test]
    fn empty_session_falls_back_to_stage_size() {
        let args = CliArgs {
            input: PathBuf::from("in.json"),
            output: PathBuf::from("out.png"),
            width: None,
            height: None,
            quality: 90,
            verbose: false,
        };
        let session = EditorSession::new();
        assert_eq!(render_size(&args, &session), (960, 620));
    }
}
