//! Text and image watermarking of a single file.
//!
//! Per file the engine walks `validate -> load canvas -> prepare overlay ->
//! composite -> encode`, and any failing stage aborts only that file.
//! Nothing is written until every stage before encoding has succeeded.

use ab_glyph::FontVec;
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, ImageReader, RgbaImage};
use log::debug;
use std::path::{Path, PathBuf};

use super::alpha::{apply_opacity, load_overlay, DecodedOverlay};
use super::encode::{output_format_for, write_image};
use super::geometry::{resolve_image_geometry, resolve_padding, Position};
use super::text::{load_font, render_text_overlay, TextColor, TextStyle};
use super::{FileOperation, IMAGE_EXTENSIONS};
use crate::error::{ProcessingError, Result};

pub const DEFAULT_OPACITY: f32 = 0.5;
pub const DEFAULT_SIZE_PERCENT: f32 = 20.0;
pub const DEFAULT_PADDING: &str = "20";
pub const DEFAULT_FONT: &str = "Arial";
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// What gets stamped onto the canvas.
#[derive(Debug, Clone, PartialEq)]
pub enum WatermarkKind {
    Text { text: String, color: TextColor },
    Image { source: PathBuf },
}

/// Validated watermark settings shared by every file of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkSpec {
    pub kind: WatermarkKind,
    pub position: Position,
    pub opacity: f32,
    pub size_percent: f32,
    pub padding_x: String,
    pub padding_y: String,
    pub font: String,
}

/// Loosely-typed watermark input as it arrives from the CLI or a config
/// file. Turned into a [`WatermarkSpec`] once, at the boundary.
#[derive(Debug, Clone, Default)]
pub struct WatermarkOptions {
    pub text: Option<String>,
    pub image: Option<PathBuf>,
    pub text_color: Option<String>,
    pub position: Option<String>,
    pub opacity: Option<f32>,
    pub size: Option<f32>,
    pub padding_x: Option<String>,
    pub padding_y: Option<String>,
    pub font: Option<String>,
}

impl WatermarkSpec {
    /// Exactly one of text or image must be given. Unknown positions and
    /// text colours fall back leniently; opacity is passed through
    /// unclamped. Padding and size are validated per file, against each
    /// canvas.
    pub fn from_options(options: WatermarkOptions) -> Result<Self> {
        let text = options.text.filter(|t| !t.is_empty());
        let kind = match (text, options.image) {
            (Some(text), None) => WatermarkKind::Text {
                text,
                color: options
                    .text_color
                    .as_deref()
                    .map(TextColor::parse_lenient)
                    .unwrap_or(TextColor::White),
            },
            (None, Some(source)) => WatermarkKind::Image { source },
            _ => return Err(ProcessingError::AmbiguousWatermarkKind),
        };

        Ok(Self {
            kind,
            position: options
                .position
                .as_deref()
                .map(Position::parse_lenient)
                .unwrap_or(Position::BottomRight),
            opacity: options.opacity.unwrap_or(DEFAULT_OPACITY),
            size_percent: options.size.unwrap_or(DEFAULT_SIZE_PERCENT),
            padding_x: options
                .padding_x
                .unwrap_or_else(|| DEFAULT_PADDING.to_string()),
            padding_y: options
                .padding_y
                .unwrap_or_else(|| DEFAULT_PADDING.to_string()),
            font: options.font.unwrap_or_else(|| DEFAULT_FONT.to_string()),
        })
    }
}

pub struct WatermarkEngine {
    spec: WatermarkSpec,
    font: Option<FontVec>,
    batch_size: usize,
}

impl WatermarkEngine {
    /// Text watermarks resolve their font here, once per run.
    pub fn new(spec: WatermarkSpec, batch_size: usize) -> Result<Self> {
        let font = match &spec.kind {
            WatermarkKind::Text { .. } => Some(load_font(&spec.font)?),
            WatermarkKind::Image { .. } => None,
        };
        Ok(Self {
            spec,
            font,
            batch_size,
        })
    }

    pub fn watermark_file(&self, input: &Path, output: &Path) -> Result<()> {
        if !input.is_file() {
            return Err(ProcessingError::InputNotFound(input.to_path_buf()));
        }
        if let WatermarkKind::Image { source } = &self.spec.kind {
            if !source.is_file() {
                return Err(ProcessingError::OverlayNotFound(source.clone()));
            }
        }

        let reader = ImageReader::open(input)?.with_guessed_format()?;
        let native_format = reader.format();
        let canvas = reader.decode()?;
        let (canvas_width, canvas_height) = (canvas.width(), canvas.height());

        let padding_x = resolve_padding(&self.spec.padding_x, canvas_width)?;
        let padding_y = resolve_padding(&self.spec.padding_y, canvas_height)?;

        let (layer, offset_x, offset_y) = match &self.spec.kind {
            WatermarkKind::Text { text, color } => {
                let font = self.font.as_ref().ok_or_else(|| {
                    ProcessingError::FontUnavailable("text watermark without a font".to_string())
                })?;
                let style = TextStyle {
                    color: *color,
                    position: self.spec.position,
                    size_percent: self.spec.size_percent,
                    opacity: self.spec.opacity,
                    padding_x,
                    padding_y,
                };
                let overlay =
                    render_text_overlay(text, font, canvas_width, canvas_height, &style)?;
                (overlay.layer, overlay.offset_x, overlay.offset_y)
            }
            WatermarkKind::Image { source } => self.prepare_image_overlay(
                source,
                (canvas_width, canvas_height),
                padding_x,
                padding_y,
            )?,
        };

        let composed = composite(canvas, layer, offset_x, offset_y);
        let format = output_format_for(output, native_format)?;
        debug!(
            "Watermarked {} ({}x{}) -> {} as {:?}",
            input.display(),
            canvas_width,
            canvas_height,
            output.display(),
            format
        );
        write_image(&composed, output, format, None)
    }

    fn prepare_image_overlay(
        &self,
        source: &Path,
        canvas_size: (u32, u32),
        padding_x: u32,
        padding_y: u32,
    ) -> Result<(RgbaImage, i64, i64)> {
        let overlay = load_overlay(source)?;
        let source_size = (overlay.image.width(), overlay.image.height());

        let geometry = resolve_image_geometry(
            source_size,
            canvas_size,
            self.spec.size_percent,
            self.spec.position,
            padding_x,
            padding_y,
        )?;

        let overlay = match geometry.scaled_size {
            Some((width, height)) if (width, height) != source_size => DecodedOverlay {
                image: overlay.image.resize_exact(width, height, FilterType::Lanczos3),
                format: overlay.format,
            },
            _ => overlay,
        };

        Ok((
            apply_opacity(overlay, self.spec.opacity),
            geometry.offset_x,
            geometry.offset_y,
        ))
    }
}

/// "Over" blend `layer` onto `canvas` at the given offset. Pixels outside
/// the layer are untouched, and the result keeps the canvas' colour type
/// and bit depth.
fn composite(
    canvas: DynamicImage,
    layer: RgbaImage,
    offset_x: i64,
    offset_y: i64,
) -> DynamicImage {
    let color = canvas.color();
    let layer = DynamicImage::ImageRgba8(layer);

    let composed = match color {
        ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => {
            let mut base = canvas.into_rgba16();
            imageops::overlay(&mut base, &layer.into_rgba16(), offset_x, offset_y);
            DynamicImage::ImageRgba16(base)
        }
        ColorType::Rgb32F | ColorType::Rgba32F => {
            let mut base = canvas.into_rgba32f();
            imageops::overlay(&mut base, &layer.into_rgba32f(), offset_x, offset_y);
            DynamicImage::ImageRgba32F(base)
        }
        _ => {
            let mut base = canvas.into_rgba8();
            imageops::overlay(&mut base, &layer.into_rgba8(), offset_x, offset_y);
            DynamicImage::ImageRgba8(base)
        }
    };
    restore_color(composed, color)
}

fn restore_color(image: DynamicImage, color: ColorType) -> DynamicImage {
    match color {
        ColorType::L8 => DynamicImage::ImageLuma8(image.into_luma8()),
        ColorType::La8 => DynamicImage::ImageLumaA8(image.into_luma_alpha8()),
        ColorType::Rgb8 => DynamicImage::ImageRgb8(image.into_rgb8()),
        ColorType::L16 => DynamicImage::ImageLuma16(image.into_luma16()),
        ColorType::La16 => DynamicImage::ImageLumaA16(image.into_luma_alpha16()),
        ColorType::Rgb16 => DynamicImage::ImageRgb16(image.into_rgb16()),
        ColorType::Rgb32F => DynamicImage::ImageRgb32F(image.into_rgb32f()),
        _ => image,
    }
}

impl FileOperation for WatermarkEngine {
    fn verb(&self) -> &'static str {
        "watermarking"
    }

    fn extensions(&self) -> &'static [&'static str] {
        IMAGE_EXTENSIONS
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn process_file(&self, input: &Path, output: &Path) -> Result<()> {
        self.watermark_file(input, output)
    }
}
