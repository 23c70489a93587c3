use fast_image_resize::{images::Image, PixelType, ResizeOptions, Resizer};
use image::{imageops, DynamicImage, ImageReader, Rgba, RgbaImage};
use log::debug;
use std::path::Path;
use strum_macros::{Display, EnumString};

use super::encode::{output_format_for, write_image};
use super::{FileOperation, IMAGE_EXTENSIONS};
use crate::error::{ProcessingError, Result};

pub const DEFAULT_BATCH_SIZE: usize = 10;

/// How the source is fitted into a `width x height` box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FitMode {
    /// Crop to the box's aspect ratio, then fill it exactly.
    Cover,
    /// Fit entirely inside the box and letterbox the remainder.
    Contain,
    /// Stretch to the exact box, ignoring aspect ratio.
    Fill,
    /// Fit entirely inside the box; the output is no larger than the image.
    #[default]
    Inside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeSpec {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: FitMode,
    pub without_enlargement: bool,
}

impl ResizeSpec {
    pub fn new(
        width: Option<u32>,
        height: Option<u32>,
        fit: FitMode,
        without_enlargement: bool,
    ) -> Result<Self> {
        if width.is_none() && height.is_none() {
            return Err(ProcessingError::InvalidOption(
                "resize needs --width, --height or both".to_string(),
            ));
        }
        if width == Some(0) || height == Some(0) {
            return Err(ProcessingError::InvalidOption(
                "resize dimensions must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            width,
            height,
            fit,
            without_enlargement,
        })
    }
}

/// Resolved work for one source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResizePlan {
    /// Source region to keep, `(x, y, width, height)`.
    crop: (u32, u32, u32, u32),
    /// Size the kept region is resampled to.
    scaled: (u32, u32),
    /// Final output size; larger than `scaled` only when letterboxing.
    canvas: (u32, u32),
}

impl ResizePlan {
    fn unchanged(full: (u32, u32, u32, u32), width: u32, height: u32) -> Self {
        Self {
            crop: full,
            scaled: (width, height),
            canvas: (width, height),
        }
    }
}

fn scale_dim(value: u32, factor: f64) -> u32 {
    ((value as f64 * factor).round() as u32).max(1)
}

fn plan_resize(src_width: u32, src_height: u32, spec: &ResizeSpec) -> ResizePlan {
    let full = (0, 0, src_width, src_height);

    let (target_width, target_height) = match (spec.width, spec.height) {
        (Some(w), Some(h)) => (w, h),
        // A single dimension keeps the aspect ratio whatever the fit mode.
        (Some(w), None) => {
            let factor = w as f64 / src_width as f64;
            if spec.without_enlargement && factor > 1.0 {
                return ResizePlan::unchanged(full, src_width, src_height);
            }
            let size = (w, scale_dim(src_height, factor));
            return ResizePlan { crop: full, scaled: size, canvas: size };
        }
        (None, Some(h)) => {
            let factor = h as f64 / src_height as f64;
            if spec.without_enlargement && factor > 1.0 {
                return ResizePlan::unchanged(full, src_width, src_height);
            }
            let size = (scale_dim(src_width, factor), h);
            return ResizePlan { crop: full, scaled: size, canvas: size };
        }
        (None, None) => (src_width, src_height),
    };

    let scale_x = target_width as f64 / src_width as f64;
    let scale_y = target_height as f64 / src_height as f64;

    match spec.fit {
        FitMode::Fill => {
            let size = if spec.without_enlargement {
                (target_width.min(src_width), target_height.min(src_height))
            } else {
                (target_width, target_height)
            };
            ResizePlan { crop: full, scaled: size, canvas: size }
        }
        FitMode::Inside | FitMode::Contain => {
            let mut factor = scale_x.min(scale_y);
            if spec.without_enlargement {
                factor = factor.min(1.0);
            }
            let scaled = (
                scale_dim(src_width, factor).min(target_width.max(1)),
                scale_dim(src_height, factor).min(target_height.max(1)),
            );
            let canvas = if spec.fit == FitMode::Contain {
                (target_width, target_height)
            } else {
                scaled
            };
            ResizePlan { crop: full, scaled, canvas }
        }
        FitMode::Cover => {
            // Crop the source to the target aspect ratio, centred.
            let target_aspect = target_width as f64 / target_height as f64;
            let source_aspect = src_width as f64 / src_height as f64;

            let (crop_width, crop_height) = if source_aspect > target_aspect {
                // Source is wider - crop width
                let new_width = (src_height as f64 * target_aspect).round() as u32;
                (new_width.clamp(1, src_width), src_height)
            } else {
                // Source is taller - crop height
                let new_height = (src_width as f64 / target_aspect).round() as u32;
                (src_width, new_height.clamp(1, src_height))
            };
            let crop_x = src_width.saturating_sub(crop_width) / 2;
            let crop_y = src_height.saturating_sub(crop_height) / 2;

            let size = if spec.without_enlargement && scale_x.max(scale_y) > 1.0 {
                (crop_width, crop_height)
            } else {
                (target_width, target_height)
            };
            ResizePlan {
                crop: (crop_x, crop_y, crop_width, crop_height),
                scaled: size,
                canvas: size,
            }
        }
    }
}

/// Resize `img` according to `spec`. Images without alpha come back
/// without alpha; letterbox bars are transparent when alpha is available
/// and black otherwise.
pub fn resize_image(img: &DynamicImage, spec: &ResizeSpec) -> Result<DynamicImage> {
    let (src_width, src_height) = (img.width(), img.height());
    let plan = plan_resize(src_width, src_height, spec);
    debug!("Resize {}x{} -> {:?}", src_width, src_height, plan);

    let rgba = img.to_rgba8();
    let (crop_x, crop_y, crop_width, crop_height) = plan.crop;
    let region = if plan.crop == (0, 0, src_width, src_height) {
        rgba
    } else {
        imageops::crop_imm(&rgba, crop_x, crop_y, crop_width, crop_height).to_image()
    };

    let scaled = resample(region, plan.scaled.0, plan.scaled.1)?;
    let output = if plan.canvas == plan.scaled {
        scaled
    } else {
        let mut canvas = RgbaImage::from_pixel(plan.canvas.0, plan.canvas.1, Rgba([0, 0, 0, 0]));
        let left = (plan.canvas.0 - plan.scaled.0) / 2;
        let top = (plan.canvas.1 - plan.scaled.1) / 2;
        imageops::replace(&mut canvas, &scaled, left as i64, top as i64);
        canvas
    };

    Ok(if img.color().has_alpha() {
        DynamicImage::ImageRgba8(output)
    } else {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(output).into_rgb8())
    })
}

/// Resample to exact dimensions with fast_image_resize's default
/// convolution filter.
fn resample(img: RgbaImage, width: u32, height: u32) -> Result<RgbaImage> {
    let (src_width, src_height) = img.dimensions();
    if src_width == width && src_height == height {
        return Ok(img);
    }

    let src_image = Image::from_vec_u8(src_width, src_height, img.into_raw(), PixelType::U8x4)
        .map_err(|e| ProcessingError::Resize(e.to_string()))?;
    let mut dst_image = Image::new(width, height, PixelType::U8x4);

    let mut resizer = Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, Some(&ResizeOptions::default()))
        .map_err(|e| ProcessingError::Resize(e.to_string()))?;

    RgbaImage::from_raw(width, height, dst_image.buffer().to_vec()).ok_or_else(|| {
        ProcessingError::Resize(format!("resized buffer does not match {}x{}", width, height))
    })
}

pub struct ResizeOperation {
    spec: ResizeSpec,
    batch_size: usize,
}

impl ResizeOperation {
    pub fn new(spec: ResizeSpec, batch_size: usize) -> Self {
        Self { spec, batch_size }
    }
}

impl FileOperation for ResizeOperation {
    fn verb(&self) -> &'static str {
        "resizing"
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

        let resized = resize_image(&img, &self.spec)?;
        let format = output_format_for(output, native_format)?;
        write_image(&resized, output, format, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, RgbImage};
    use tempfile::TempDir;

    fn create_test_image(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    fn spec(width: Option<u32>, height: Option<u32>, fit: FitMode, no_enlarge: bool) -> ResizeSpec {
        ResizeSpec::new(width, height, fit, no_enlarge).unwrap()
    }

    #[test]
    fn test_spec_validation() {
        assert!(ResizeSpec::new(None, None, FitMode::Inside, false).is_err());
        assert!(ResizeSpec::new(Some(0), Some(10), FitMode::Inside, false).is_err());
        assert!(ResizeSpec::new(Some(10), None, FitMode::Inside, false).is_ok());
    }

    #[test]
    fn test_fit_mode_parsing() {
        assert_eq!("cover".parse::<FitMode>().unwrap(), FitMode::Cover);
        assert_eq!("CONTAIN".parse::<FitMode>().unwrap(), FitMode::Contain);
        assert_eq!(FitMode::default(), FitMode::Inside);
        assert!("stretch".parse::<FitMode>().is_err());
    }

    #[test]
    fn test_single_dimension_keeps_aspect() {
        let plan = plan_resize(200, 100, &spec(Some(100), None, FitMode::Fill, false));
        assert_eq!(plan.canvas, (100, 50));

        let plan = plan_resize(200, 100, &spec(None, Some(300), FitMode::Cover, true));
        assert_eq!(plan.canvas, (200, 100));
    }

    #[test]
    fn test_inside_fits_box() {
        let plan = plan_resize(200, 100, &spec(Some(100), Some(100), FitMode::Inside, false));
        assert_eq!(plan.scaled, (100, 50));
        assert_eq!(plan.canvas, (100, 50));

        let plan = plan_resize(200, 100, &spec(Some(800), Some(800), FitMode::Inside, true));
        assert_eq!(plan.canvas, (200, 100));
    }

    #[test]
    fn test_contain_letterboxes() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([255, 255, 255])));
        let contain = spec(Some(100), Some(100), FitMode::Contain, false);
        let resized = resize_image(&img, &contain).unwrap();

        assert_eq!((resized.width(), resized.height()), (100, 100));
        assert!(!resized.color().has_alpha());
        let rgb = resized.to_rgb8();
        assert_eq!(*rgb.get_pixel(50, 5), Rgb([0, 0, 0]));
        assert_eq!(*rgb.get_pixel(50, 50), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_cover_crops_center() {
        let plan = plan_resize(200, 100, &spec(Some(50), Some(50), FitMode::Cover, false));
        assert_eq!(plan.crop, (50, 0, 100, 100));
        assert_eq!(plan.canvas, (50, 50));

        let img = DynamicImage::ImageRgb8(create_test_image(200, 100));
        let resized = resize_image(&img, &spec(Some(50), Some(50), FitMode::Cover, false)).unwrap();
        assert_eq!((resized.width(), resized.height()), (50, 50));
    }

    #[test]
    fn test_fill_stretches() {
        let img = DynamicImage::ImageRgb8(create_test_image(100, 100));
        let resized = resize_image(&img, &spec(Some(40), Some(10), FitMode::Fill, false)).unwrap();
        assert_eq!((resized.width(), resized.height()), (40, 10));
    }

    #[test]
    fn test_resize_operation_writes_output() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.png");
        create_test_image(120, 60).save(&input).unwrap();
        let output = dir.path().join("out/in.png");

        let op = ResizeOperation::new(
            spec(Some(60), None, FitMode::Inside, false),
            DEFAULT_BATCH_SIZE,
        );
        op.process_file(&input, &output).unwrap();

        let result = image::open(&output).unwrap();
        assert_eq!((result.width(), result.height()), (60, 30));
    }
}
