pub mod alpha;
pub mod batch;
pub mod convert;
pub mod crop;
pub mod encode;
pub mod geometry;
pub mod metadata;
pub mod resize;
pub mod strip;
pub mod text;
pub mod watermark;

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Raster formats the pixel operations (resize, crop, watermark) can decode.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "tif", "tiff"];

/// Inputs accepted by `convert`.
pub const CONVERT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Everything exiftool can read or rewrite: images, camera raw, video,
/// audio and PDF documents.
pub const METADATA_EXTENSIONS: &[&str] = &[
    // images
    "jpg", "jpeg", "png", "webp", "gif", "tif", "tiff", "heic", "heif", "avif", "bmp",
    // camera raw
    "dng", "cr2", "cr3", "nef", "arw", "orf", "rw2", "raf",
    // video
    "mp4", "mov", "m4v", "avi", "mkv", "webm", "3gp",
    // audio
    "mp3", "wav", "flac", "m4a", "aac", "ogg",
    // documents
    "pdf",
];

/// Outcome of a top-level call, single file or whole directory.
///
/// `success` is always `errors == 0`; construct through the helpers so the
/// invariant cannot drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub processed: usize,
    pub errors: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub error_messages: Vec<String>,
}

impl ProcessingResult {
    /// Nothing matched; nothing failed.
    pub fn empty() -> Self {
        Self::from_outcome(0, Vec::new())
    }

    /// A single file processed successfully.
    pub fn single() -> Self {
        Self::from_outcome(1, Vec::new())
    }

    pub fn from_outcome(processed: usize, error_messages: Vec<String>) -> Self {
        let errors = error_messages.len();
        Self {
            success: errors == 0,
            processed,
            errors,
            error_messages,
        }
    }
}

/// A per-file operation the batch orchestrator can fan out.
pub trait FileOperation: Sync {
    /// Verb used in per-file error messages, e.g. "resizing".
    fn verb(&self) -> &'static str;

    /// Lower-case extensions this operation accepts.
    fn extensions(&self) -> &'static [&'static str];

    /// How many files run concurrently before the orchestrator waits for the
    /// group to settle.
    fn batch_size(&self) -> usize;

    /// Final output path for a file whose mirrored destination is `mirrored`.
    fn output_path(&self, mirrored: PathBuf) -> PathBuf {
        mirrored
    }

    fn process_file(&self, input: &Path, output: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_invariant() {
        assert_eq!(
            ProcessingResult::empty(),
            ProcessingResult {
                success: true,
                processed: 0,
                errors: 0,
                error_messages: vec![]
            }
        );

        let result = ProcessingResult::from_outcome(5, vec!["a".into(), "b".into()]);
        assert!(!result.success);
        assert_eq!(result.errors, 2);
        assert_eq!(result.processed, 5);
    }

    #[test]
    fn test_error_messages_omitted_when_clean() {
        let json = serde_json::to_string(&ProcessingResult::single()).unwrap();
        assert_eq!(json, r#"{"success":true,"processed":1,"errors":0}"#);
    }

    #[test]
    fn test_allow_lists_are_nested() {
        for ext in CONVERT_EXTENSIONS {
            assert!(IMAGE_EXTENSIONS.contains(ext));
        }
        for ext in IMAGE_EXTENSIONS {
            assert!(METADATA_EXTENSIONS.contains(ext));
        }
    }
}
