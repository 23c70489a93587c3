use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use crate::error::{ProcessingError, Result};
use crate::utils::get_file_extension;

/// Default JPEG quality when the caller does not ask for one.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Pick the encoder from the output file's extension, falling back to the
/// source's native format for anything unrecognised.
pub fn output_format_for(path: &Path, native: Option<ImageFormat>) -> Result<ImageFormat> {
    let by_extension = match get_file_extension(path).as_deref() {
        Some("jpg") | Some("jpeg") => Some(ImageFormat::Jpeg),
        Some("png") => Some(ImageFormat::Png),
        Some("webp") => Some(ImageFormat::WebP),
        _ => None,
    };

    by_extension.or(native).ok_or_else(|| {
        ProcessingError::UnsupportedFormat(format!(
            "cannot determine output format for {}",
            path.display()
        ))
    })
}

/// Encode `img` as `format` at `path`, creating the parent directory first.
///
/// JPEG has no alpha channel, so images are flattened to RGB for it.
/// `quality` only affects JPEG.
pub fn write_image(
    img: &DynamicImage,
    path: &Path,
    format: ImageFormat,
    quality: Option<u8>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    match format {
        ImageFormat::Jpeg => {
            let writer = BufWriter::new(File::create(path)?);
            let encoder =
                JpegEncoder::new_with_quality(writer, quality.unwrap_or(DEFAULT_JPEG_QUALITY));
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
        }
        ImageFormat::WebP => {
            // The bundled WebP encoder is lossless and takes 8-bit RGB(A) only.
            let normalized = if img.color().has_alpha() {
                DynamicImage::ImageRgba8(img.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            };
            normalized.save_with_format(path, ImageFormat::WebP)?;
        }
        other => img.save_with_format(path, other)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_output_format_for() {
        let native = Some(ImageFormat::Tiff);
        assert_eq!(
            output_format_for(&PathBuf::from("a/b.JPG"), native).unwrap(),
            ImageFormat::Jpeg
        );
        assert_eq!(
            output_format_for(&PathBuf::from("b.jpeg"), native).unwrap(),
            ImageFormat::Jpeg
        );
        assert_eq!(
            output_format_for(&PathBuf::from("b.png"), native).unwrap(),
            ImageFormat::Png
        );
        assert_eq!(
            output_format_for(&PathBuf::from("b.webp"), native).unwrap(),
            ImageFormat::WebP
        );
        assert_eq!(
            output_format_for(&PathBuf::from("b.tif"), native).unwrap(),
            ImageFormat::Tiff
        );
        assert!(output_format_for(&PathBuf::from("b"), None).is_err());
    }

    #[test]
    fn test_write_image_flattens_alpha_for_jpeg() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out.jpg");
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([10, 200, 30, 128])));

        write_image(&img, &path, ImageFormat::Jpeg, Some(85)).unwrap();

        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
        assert!(!decoded.color().has_alpha());
    }
}
