use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use super::metadata::ExifTool;
use super::{FileOperation, METADATA_EXTENSIONS};
use crate::error::{ProcessingError, Result};

pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Copies each file to its output path, then strips every tag from the copy.
pub struct StripOperation<'a> {
    exiftool: &'a ExifTool,
    batch_size: usize,
}

impl<'a> StripOperation<'a> {
    pub fn new(exiftool: &'a ExifTool, batch_size: usize) -> Self {
        Self {
            exiftool,
            batch_size,
        }
    }
}

/// Whether `a` and `b` name the same existing file.
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

impl FileOperation for StripOperation<'_> {
    fn verb(&self) -> &'static str {
        "stripping metadata from"
    }

    fn extensions(&self) -> &'static [&'static str] {
        METADATA_EXTENSIONS
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn process_file(&self, input: &Path, output: &Path) -> Result<()> {
        if !input.is_file() {
            return Err(ProcessingError::InputNotFound(input.to_path_buf()));
        }
        if same_file(input, output) {
            debug!("Stripping metadata in place from {}", output.display());
            return self.exiftool.strip_all(output);
        }

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Only a fully stripped file may appear under the output name.
        let staging = staging_path(output);
        fs::copy(input, &staging)?;
        debug!("Stripping metadata from {}", staging.display());
        match self
            .exiftool
            .strip_all(&staging)
            .and_then(|_| fs::rename(&staging, output).map_err(ProcessingError::from))
        {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = fs::remove_file(&staging);
                Err(e)
            }
        }
    }
}

/// Hidden sibling of `output` that keeps its extension, so exiftool still
/// recognises the file type.
fn staging_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(".stripping-{}", name))
}
