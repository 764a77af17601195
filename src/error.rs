// ============================================================================
// ERROR TAXONOMY — every fallible editor operation resolves to one of these
// ============================================================================
//
// Failures are caught at the operation boundary that initiated them and
// converted to a user-visible notice; no failure leaves a block in a
// partially-mutated state.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditorError {
    /// A raster source could not be decoded into a loaded image.
    #[error("image loading failed: {0}")]
    Load(String),

    /// A file's bytes could not be read into a transportable encoding.
    #[error("could not read file: {0}")]
    Read(String),

    /// An import payload is structurally unusable (e.g. `blocks` is not a list).
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// An image block has no usable source and no placeholder could be built.
    #[error("image source is missing")]
    MissingSource,

    /// An optional host capability (e.g. a color sampler) is absent.
    #[error("{0} is not available")]
    CaptureUnavailable(&'static str),
}

pub type Result<T> = std::result::Result<T, EditorError>;
