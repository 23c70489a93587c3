//! Overlay decoding and opacity scaling.
//!
//! Overlays come from four source formats. JPEG carries no alpha channel,
//! so it gets a synthesized one; PNG, WebP and rasterized SVG carry their
//! own, which is rescaled sample by sample.

use image::{DynamicImage, ImageFormat, ImageReader, RgbaImage};
use log::debug;
use resvg::{tiny_skia, usvg};
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::{ProcessingError, Result};

/// Formats accepted as image watermarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayFormat {
    Jpeg,
    Png,
    Svg,
    WebP,
}

impl OverlayFormat {
    /// Whether the decoded source stores per-pixel transparency itself.
    pub fn has_native_alpha(&self) -> bool {
        !matches!(self, OverlayFormat::Jpeg)
    }

    /// Map a decoder-reported format onto the allow-list.
    pub fn from_image_format(format: ImageFormat) -> Result<Self> {
        match format {
            ImageFormat::Jpeg => Ok(OverlayFormat::Jpeg),
            ImageFormat::Png => Ok(OverlayFormat::Png),
            ImageFormat::WebP => Ok(OverlayFormat::WebP),
            other => Err(ProcessingError::UnsupportedOverlayFormat(
                format!("{:?}", other).to_lowercase(),
            )),
        }
    }
}

/// A decoded overlay together with the format it was decoded from.
#[derive(Debug, Clone)]
pub struct DecodedOverlay {
    pub image: DynamicImage,
    pub format: OverlayFormat,
}

/// Decode a watermark image, rejecting anything outside the allow-list
/// before any pixels are touched.
pub fn load_overlay(path: &Path) -> Result<DecodedOverlay> {
    if !path.is_file() {
        return Err(ProcessingError::OverlayNotFound(path.to_path_buf()));
    }

    if is_svg(path)? {
        debug!("Rasterizing SVG watermark {}", path.display());
        return Ok(DecodedOverlay {
            image: rasterize_svg(path)?,
            format: OverlayFormat::Svg,
        });
    }

    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = match reader.format() {
        Some(format) => OverlayFormat::from_image_format(format)?,
        None => {
            return Err(ProcessingError::UnsupportedOverlayFormat(
                "unknown".to_string(),
            ))
        }
    };
    let image = reader.decode()?;

    debug!(
        "Loaded {:?} watermark {} ({}x{})",
        format,
        path.display(),
        image.width(),
        image.height()
    );

    Ok(DecodedOverlay { image, format })
}

/// Scale the overlay's alpha by `opacity` and return an RGBA buffer ready
/// for compositing.
///
/// `opacity` is not clamped: every alpha sample is multiplied and the
/// product is clipped to the valid sample range, so negative values end up
/// fully transparent and values above 1 saturate.
pub fn apply_opacity(overlay: DecodedOverlay, opacity: f32) -> RgbaImage {
    if overlay.format.has_native_alpha() {
        let mut rgba = overlay.image.into_rgba8();
        let samples: &mut [u8] = &mut rgba;
        scale_alpha_samples(samples, opacity);
        rgba
    } else {
        // No alpha in the source: start fully opaque, then scale uniformly.
        let mut rgba = DynamicImage::ImageRgb8(overlay.image.into_rgb8()).into_rgba8();
        let alpha = scale_alpha(u8::MAX, opacity);
        for pixel in rgba.pixels_mut() {
            pixel[3] = alpha;
        }
        rgba
    }
}

/// Rescale every fourth byte, starting at offset 3, of a raw RGBA buffer.
pub fn scale_alpha_samples(samples: &mut [u8], opacity: f32) {
    for alpha in samples.iter_mut().skip(3).step_by(4) {
        *alpha = scale_alpha(*alpha, opacity);
    }
}

fn scale_alpha(alpha: u8, opacity: f32) -> u8 {
    let scaled = (alpha as f32 * opacity).round();
    if scaled.is_nan() {
        0
    } else {
        scaled.clamp(0.0, 255.0) as u8
    }
}

fn is_svg(path: &Path) -> Result<bool> {
    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("svg"))
        .unwrap_or(false);
    if by_extension {
        return Ok(true);
    }

    // Extension-less or misnamed files: sniff the head of the document.
    let mut head = Vec::with_capacity(512);
    fs::File::open(path)?.take(512).read_to_end(&mut head)?;
    let head = String::from_utf8_lossy(&head);
    let head = head.trim_start();
    Ok(head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")))
}

fn rasterize_svg(path: &Path) -> Result<DynamicImage> {
    let data = fs::read(path)?;
    let tree = usvg::Tree::from_data(&data, &usvg::Options::default()).map_err(|e| {
        ProcessingError::UnsupportedOverlayFormat(format!("svg ({})", e))
    })?;

    let size = tree.size().to_int_size();
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height()).ok_or_else(|| {
        ProcessingError::InvalidOption(format!(
            "SVG watermark has no drawable area: {}",
            path.display()
        ))
    })?;
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    // tiny-skia stores premultiplied RGBA.
    let mut rgba = RgbaImage::new(size.width(), size.height());
    for (pixel, source) in rgba.pixels_mut().zip(pixmap.pixels()) {
        let color = source.demultiply();
        *pixel = image::Rgba([color.red(), color.green(), color.blue(), color.alpha()]);
    }

    Ok(DynamicImage::ImageRgba8(rgba))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, RgbImage, Rgba};
    use tempfile::TempDir;

    fn gradient_rgba(width: u32, height: u32) -> RgbaImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([
                (x % 256) as u8,
                (y % 256) as u8,
                128,
                ((x * 7 + y * 13) % 256) as u8,
            ])
        })
    }

    fn overlay(image: DynamicImage, format: OverlayFormat) -> DecodedOverlay {
        DecodedOverlay { image, format }
    }

    #[test]
    fn test_full_opacity_is_identity() {
        let source = gradient_rgba(40, 30);
        let result = apply_opacity(
            overlay(DynamicImage::ImageRgba8(source.clone()), OverlayFormat::Png),
            1.0,
        );
        assert_eq!(result, source);
    }

    #[test]
    fn test_zero_opacity_clears_alpha() {
        let source = gradient_rgba(40, 30);
        let result = apply_opacity(
            overlay(DynamicImage::ImageRgba8(source.clone()), OverlayFormat::WebP),
            0.0,
        );
        assert!(result.pixels().all(|p| p[3] == 0));
        // Colour samples are untouched.
        assert_eq!(result.get_pixel(5, 5)[0], source.get_pixel(5, 5)[0]);
    }

    #[test]
    fn test_half_opacity_rounds() {
        let mut samples = vec![10, 20, 30, 255, 10, 20, 30, 101, 10, 20, 30, 0];
        scale_alpha_samples(&mut samples, 0.5);
        assert_eq!(samples, vec![10, 20, 30, 128, 10, 20, 30, 51, 10, 20, 30, 0]);
    }

    #[test]
    fn test_out_of_range_opacity_is_clipped() {
        let mut samples = vec![0, 0, 0, 200, 0, 0, 0, 100];
        scale_alpha_samples(&mut samples, 3.0);
        assert_eq!(samples[3], 255);
        assert_eq!(samples[7], 255);

        let mut samples = vec![0, 0, 0, 200];
        scale_alpha_samples(&mut samples, -1.0);
        assert_eq!(samples[3], 0);
    }

    #[test]
    fn test_jpeg_overlay_gets_synthesized_alpha() {
        let rgb = ImageBuffer::from_fn(8, 8, |x, _| Rgb([x as u8 * 10, 0, 0]));
        let result = apply_opacity(
            overlay(DynamicImage::ImageRgb8(rgb), OverlayFormat::Jpeg),
            0.25,
        );
        assert!(result.pixels().all(|p| p[3] == 64));
        assert_eq!(result.get_pixel(3, 0)[0], 30);
    }

    #[test]
    fn test_load_overlay_rejects_tiff() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mark.tiff");
        DynamicImage::ImageRgb8(RgbImage::new(4, 4)).save(&path).unwrap();

        match load_overlay(&path) {
            Err(ProcessingError::UnsupportedOverlayFormat(name)) => assert_eq!(name, "tiff"),
            other => panic!("expected UnsupportedOverlayFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_load_overlay_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_overlay(&dir.path().join("nope.png")),
            Err(ProcessingError::OverlayNotFound(_))
        ));
    }

    #[test]
    fn test_load_overlay_png_and_svg() {
        let dir = TempDir::new().unwrap();

        let png_path = dir.path().join("mark.png");
        DynamicImage::ImageRgba8(gradient_rgba(6, 4)).save(&png_path).unwrap();
        let png = load_overlay(&png_path).unwrap();
        assert_eq!(png.format, OverlayFormat::Png);
        assert_eq!((png.image.width(), png.image.height()), (6, 4));

        let svg_path = dir.path().join("mark.svg");
        fs::write(
            &svg_path,
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="20" height="10"><rect width="20" height="10" fill="#ff0000"/></svg>"##,
        )
        .unwrap();
        let svg = load_overlay(&svg_path).unwrap();
        assert_eq!(svg.format, OverlayFormat::Svg);
        assert_eq!((svg.image.width(), svg.image.height()), (20, 10));
        let pixel = svg.image.to_rgba8().get_pixel(10, 5).0;
        assert_eq!(pixel, [255, 0, 0, 255]);
    }
}
