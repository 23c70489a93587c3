use std::path::PathBuf;
use thiserror::Error;

/// Every failure a processing call can surface.
///
/// Single-file calls return these directly. Batch calls catch them per file
/// and fold the rendered message into the aggregate [`ProcessingResult`].
///
/// [`ProcessingResult`]: crate::image_processing::ProcessingResult
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Input path does not exist: {}", .0.display())]
    InputNotFound(PathBuf),
    #[error("Input path is neither a file nor a directory: {}", .0.display())]
    InvalidInputKind(PathBuf),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Watermark needs exactly one of a text or an image")]
    AmbiguousWatermarkKind,
    #[error("Watermark image not found: {}", .0.display())]
    OverlayNotFound(PathBuf),
    #[error("Unsupported watermark image format: {0} (expected jpeg, png, svg or webp)")]
    UnsupportedOverlayFormat(String),
    #[error("Invalid size {0}: must be greater than 0 and at most 100")]
    InvalidSize(f32),
    #[error(
        "Text watermark at {font_size}px needs a {width}x{height} layer, too large for a {canvas_width}x{canvas_height} image"
    )]
    TextLayerTooLarge {
        font_size: u32,
        width: u64,
        height: u64,
        canvas_width: u32,
        canvas_height: u32,
    },
    #[error("Invalid padding '{0}': expected a non-negative number of pixels or a percentage between 0% and 100%")]
    InvalidPadding(String),
    #[error("Output file already exists: {} (use --overwrite to replace it)", .0.display())]
    OutputExists(PathBuf),
    #[error(
        "Requested region {requested_width}x{requested_height}+{left}+{top} exceeds source dimensions {source_width}x{source_height}"
    )]
    DimensionsExceedSource {
        requested_width: u32,
        requested_height: u32,
        left: u32,
        top: u32,
        source_width: u32,
        source_height: u32,
    },
    #[error("exiftool failed: {0}")]
    ExternalToolFailure(String),
    #[error("Font unavailable: {0}")]
    FontUnavailable(String),
    #[error("Invalid option: {0}")]
    InvalidOption(String),
    #[error("Resize failed: {0}")]
    Resize(String),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl From<walkdir::Error> for ProcessingError {
    fn from(err: walkdir::Error) -> Self {
        ProcessingError::Io(err.into())
    }
}

pub type Result<T> = std::result::Result<T, ProcessingError>;
