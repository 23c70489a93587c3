use image::{ImageFormat, ImageReader};
use log::debug;
use std::path::{Path, PathBuf};
use strum_macros::{Display, EnumString};

use super::encode::write_image;
use super::{FileOperation, CONVERT_EXTENSIONS};
use crate::error::{ProcessingError, Result};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_QUALITY: u8 = 80;

/// Target format for `convert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ConvertFormat {
    #[default]
    Webp,
    Png,
    #[strum(to_string = "jpeg", serialize = "jpg")]
    Jpeg,
}

impl ConvertFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ConvertFormat::Webp => "webp",
            ConvertFormat::Png => "png",
            ConvertFormat::Jpeg => "jpg",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            ConvertFormat::Webp => ImageFormat::WebP,
            ConvertFormat::Png => ImageFormat::Png,
            ConvertFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertSpec {
    pub format: ConvertFormat,
    /// JPEG quality, 1-100. WebP output is lossless and ignores it.
    pub quality: u8,
    pub overwrite: bool,
}

impl ConvertSpec {
    pub fn new(format: ConvertFormat, quality: Option<u8>, overwrite: bool) -> Result<Self> {
        let quality = quality.unwrap_or(DEFAULT_QUALITY);
        if !(1..=100).contains(&quality) {
            return Err(ProcessingError::InvalidOption(format!(
                "quality must be between 1 and 100, got {}",
                quality
            )));
        }
        Ok(Self {
            format,
            quality,
            overwrite,
        })
    }
}

pub struct ConvertOperation {
    spec: ConvertSpec,
    batch_size: usize,
}

impl ConvertOperation {
    pub fn new(spec: ConvertSpec, batch_size: usize) -> Self {
        Self { spec, batch_size }
    }
}

impl FileOperation for ConvertOperation {
    fn verb(&self) -> &'static str {
        "converting"
    }

    fn extensions(&self) -> &'static [&'static str] {
        CONVERT_EXTENSIONS
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn output_path(&self, mirrored: PathBuf) -> PathBuf {
        mirrored.with_extension(self.spec.format.extension())
    }

    fn process_file(&self, input: &Path, output: &Path) -> Result<()> {
        if !input.is_file() {
            return Err(ProcessingError::InputNotFound(input.to_path_buf()));
        }
        if output.exists() && !self.spec.overwrite {
            return Err(ProcessingError::OutputExists(output.to_path_buf()));
        }

        let img = ImageReader::open(input)?.with_guessed_format()?.decode()?;
        debug!(
            "Converting {} -> {} ({})",
            input.display(),
            output.display(),
            self.spec.format
        );
        write_image(
            &img,
            output,
            self.spec.format.image_format(),
            Some(self.spec.quality),
        )
    }
}
