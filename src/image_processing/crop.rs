use image::{DynamicImage, ImageReader};
use log::debug;
use std::path::Path;

use super::encode::{output_format_for, write_image};
use super::{FileOperation, IMAGE_EXTENSIONS};
use crate::error::{ProcessingError, Result};

pub const DEFAULT_BATCH_SIZE: usize = 10;

/// A crop region. Without an explicit `left`/`top` the region is centred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropSpec {
    pub width: u32,
    pub height: u32,
    pub left: Option<u32>,
    pub top: Option<u32>,
}

impl CropSpec {
    pub fn new(width: u32, height: u32, left: Option<u32>, top: Option<u32>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ProcessingError::InvalidOption(
                "crop dimensions must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            width,
            height,
            left,
            top,
        })
    }

    /// Resolve to `(left, top)` on a `src_width x src_height` source, failing
    /// when the region does not fit.
    pub fn resolve(&self, src_width: u32, src_height: u32) -> Result<(u32, u32)> {
        let left = self
            .left
            .unwrap_or_else(|| src_width.saturating_sub(self.width) / 2);
        let top = self
            .top
            .unwrap_or_else(|| src_height.saturating_sub(self.height) / 2);

        let fits_x = left.checked_add(self.width).is_some_and(|right| right <= src_width);
        let fits_y = top.checked_add(self.height).is_some_and(|bottom| bottom <= src_height);
        if !fits_x || !fits_y {
            return Err(ProcessingError::DimensionsExceedSource {
                requested_width: self.width,
                requested_height: self.height,
                left,
                top,
                source_width: src_width,
                source_height: src_height,
            });
        }

        Ok((left, top))
    }
}

pub fn crop_image(img: &DynamicImage, spec: &CropSpec) -> Result<DynamicImage> {
    let (left, top) = spec.resolve(img.width(), img.height())?;
    debug!(
        "Crop {}x{} at ({}, {}) from {}x{}",
        spec.width,
        spec.height,
        left,
        top,
        img.width(),
        img.height()
    );
    Ok(img.crop_imm(left, top, spec.width, spec.height))
}

pub struct CropOperation {
    spec: CropSpec,
    batch_size: usize,
}

impl CropOperation {
    pub fn new(spec: CropSpec, batch_size: usize) -> Self {
        Self { spec, batch_size }
    }
}

impl FileOperation for CropOperation {
    fn verb(&self) -> &'static str {
        "cropping"
    }

    fn extensions(&self) -> &'static [&'static str] {
        IMAGE_EXTENSIONS
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn process_file(&self, input: &Path, output: &Path) -> Result<()> {
        if !input.is_file() {
            return Err(ProcessingError::InputNotFound(input.to_path_buf()));
        }
        let reader = ImageReader::open(input)?.with_guessed_format()?;
        let native_format = reader.format();
        let img = reader.decode()?;

        let cropped = crop_image(&img, &self.spec)?;
        let format = output_format_for(output, native_format)?;
        write_image(&cropped, output, format, None)
    }
}
