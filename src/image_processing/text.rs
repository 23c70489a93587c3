//! Text watermarks: font lookup and rendering of a glowing text layer.

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{imageops, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use log::{debug, warn};
use std::path::Path;
use std::str::FromStr;
use strum_macros::{Display, EnumString};

use super::alpha::scale_alpha_samples;
use super::geometry::{
    resolve_text_anchor, text_font_size, text_horizontal_anchor, Position, TextAnchor,
};
use crate::error::{ProcessingError, Result};

/// The text layer may cover at most this many times the canvas area, with a
/// floor so small canvases still take the minimum font size.
const MAX_LAYER_AREA_FACTOR: u64 = 16;
const MIN_LAYER_AREA_LIMIT: u64 = 4_000_000;

/// Fill colour for text watermarks. The glow behind the glyphs uses the
/// opposite colour so the text stays legible on any background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TextColor {
    Black,
    White,
}

impl TextColor {
    /// Parse a colour name, falling back to white for anything else.
    pub fn parse_lenient(value: &str) -> Self {
        match TextColor::from_str(value.trim()) {
            Ok(color) => color,
            Err(_) => {
                warn!("Unknown text color '{}', falling back to white", value);
                TextColor::White
            }
        }
    }

    pub fn fill(&self) -> Rgba<u8> {
        match self {
            TextColor::Black => Rgba([0, 0, 0, 255]),
            TextColor::White => Rgba([255, 255, 255, 255]),
        }
    }

    pub fn glow(&self) -> Rgba<u8> {
        match self {
            TextColor::Black => TextColor::White.fill(),
            TextColor::White => TextColor::Black.fill(),
        }
    }
}

/// Rendered text layer plus where its top-left corner lands on the canvas.
#[derive(Debug, Clone)]
pub struct TextOverlay {
    pub layer: RgbaImage,
    pub offset_x: i64,
    pub offset_y: i64,
    pub font_size: u32,
}

/// Everything the text path needs besides the font and canvas size.
#[derive(Debug, Clone, Copy)]
pub struct TextStyle {
    pub color: TextColor,
    pub position: Position,
    pub size_percent: f32,
    pub opacity: f32,
    pub padding_x: u32,
    pub padding_y: u32,
}

/// Render `text` into a transparent layer sized to fit it, with a blurred
/// glow in the opposite colour behind the fill, and the requested opacity
/// baked into the layer's alpha.
///
/// Fails with [`ProcessingError::TextLayerTooLarge`] instead of allocating
/// when the font size blows the layer far past the canvas.
pub fn render_text_overlay(
    text: &str,
    font: &FontVec,
    canvas_width: u32,
    canvas_height: u32,
    style: &TextStyle,
) -> Result<TextOverlay> {
    let font_size = text_font_size(canvas_width, canvas_height, style.size_percent);
    let scale = PxScale::from(font_size as f32);

    let (text_width, _) = text_size(scale, font, text);
    let scaled_font = font.as_scaled(scale);
    let text_height = (scaled_font.ascent() - scaled_font.descent()).ceil().max(1.0) as u32;

    let blur_sigma = (font_size as f32 * 0.04).max(1.0);
    let margin = (blur_sigma * 3.0).ceil() as u32;

    let (layer_width, layer_height) = bounded_layer_size(
        text_width,
        text_height,
        margin,
        font_size,
        canvas_width,
        canvas_height,
    )?;

    let mut glow = RgbaImage::new(layer_width, layer_height);
    draw_text_mut(
        &mut glow,
        style.color.glow(),
        margin as i32,
        margin as i32,
        scale,
        font,
        text,
    );
    let mut layer = imageops::blur(&glow, blur_sigma);
    draw_text_mut(
        &mut layer,
        style.color.fill(),
        margin as i32,
        margin as i32,
        scale,
        font,
        text,
    );

    let samples: &mut [u8] = &mut layer;
    scale_alpha_samples(samples, style.opacity);

    let (anchor_x, anchor_y) = resolve_text_anchor(
        style.position,
        canvas_width,
        canvas_height,
        font_size,
        style.padding_x,
        style.padding_y,
    );
    let shift = match text_horizontal_anchor(style.position) {
        TextAnchor::Start => 0,
        TextAnchor::Middle => text_width as i64 / 2,
        TextAnchor::End => text_width as i64,
    };

    debug!(
        "Text watermark '{}' at {}px, {}x{} box anchored at ({}, {})",
        text, font_size, text_width, text_height, anchor_x, anchor_y
    );

    Ok(TextOverlay {
        layer,
        offset_x: anchor_x - shift - margin as i64,
        offset_y: anchor_y - text_height as i64 / 2 - margin as i64,
        font_size,
    })
}

fn bounded_layer_size(
    text_width: u32,
    text_height: u32,
    margin: u32,
    font_size: u32,
    canvas_width: u32,
    canvas_height: u32,
) -> Result<(u32, u32)> {
    let width = text_width as u64 + margin as u64 * 2;
    let height = text_height as u64 + margin as u64 * 2;
    let canvas_area = canvas_width as u64 * canvas_height as u64;
    let limit = canvas_area
        .saturating_mul(MAX_LAYER_AREA_FACTOR)
        .max(MIN_LAYER_AREA_LIMIT);

    let too_large = ProcessingError::TextLayerTooLarge {
        font_size,
        width,
        height,
        canvas_width,
        canvas_height,
    };
    match width.checked_mul(height) {
        Some(area) if area <= limit => {}
        _ => return Err(too_large),
    }
    match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(too_large),
    }
}

/// Load a font for text watermarks.
///
/// Supports three formats:
/// 1. Font name: "Arial" -> searches system font directories
/// 2. Font filename: "Arial.ttf" -> searches in common font directories
/// 3. Full path: "/System/Library/Fonts/Supplemental/Arial.ttf" -> loads directly
///
/// Falls back to common sans and monospace fonts when the requested one is
/// missing, so a default install still renders something.
pub fn load_font(font_spec: &str) -> Result<FontVec> {
    if is_absolute_path(font_spec) {
        return load_font_from_path(font_spec);
    }

    if is_font_filename(font_spec) {
        if let Ok(font) = load_font_by_filename(font_spec) {
            return Ok(font);
        }
    }

    if let Some(font) = first_loadable(get_system_font_paths(font_spec)) {
        return Ok(font);
    }

    warn!("Font '{}' not found, trying fallback fonts", font_spec);
    let fallbacks = [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
        "/System/Library/Fonts/Helvetica.ttc",
        "/System/Library/Fonts/Monaco.ttf",
        "/mnt/c/Windows/Fonts/arial.ttf",
    ];
    first_loadable(fallbacks.iter().map(|p| p.to_string())).ok_or_else(|| {
        ProcessingError::FontUnavailable(format!(
            "no usable font found for '{}'; pass --font with a path to a .ttf/.otf file",
            font_spec
        ))
    })
}

fn first_loadable(paths: impl IntoIterator<Item = String>) -> Option<FontVec> {
    paths
        .into_iter()
        .find_map(|path| load_font_from_path(&expand_path(&path)).ok())
}

/// Check if the input is an absolute path
fn is_absolute_path(path: &str) -> bool {
    Path::new(path).is_absolute()
        || path.starts_with('/')
        || path.starts_with('\\')
        || (path.len() > 2 && path.chars().nth(1) == Some(':'))
}

/// Check if the input looks like a font filename
fn is_font_filename(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    lower.ends_with(".ttf") || lower.ends_with(".otf") || lower.ends_with(".ttc")
}

fn load_font_from_path(font_path: &str) -> Result<FontVec> {
    let data = std::fs::read(font_path).map_err(|e| {
        ProcessingError::FontUnavailable(format!("failed to read {}: {}", font_path, e))
    })?;
    FontVec::try_from_vec(data).map_err(|_| {
        ProcessingError::FontUnavailable(format!("failed to parse font file {}", font_path))
    })
}

fn load_font_by_filename(filename: &str) -> Result<FontVec> {
    get_system_font_directories()
        .into_iter()
        .map(|dir| format!("{}/{}", expand_path(dir), filename))
        .filter(|path| Path::new(path).exists())
        .find_map(|path| load_font_from_path(&path).ok())
        .ok_or_else(|| {
            ProcessingError::FontUnavailable(format!(
                "font file '{}' not found in system directories",
                filename
            ))
        })
}

/// Expand paths with ~ to home directory
fn expand_path(path: &str) -> String {
    if path.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}

fn get_system_font_directories() -> Vec<&'static str> {
    vec![
        // macOS
        "/System/Library/Fonts",
        "/System/Library/Fonts/Supplemental",
        "/Library/Fonts",
        "~/Library/Fonts",
        // Linux
        "/usr/share/fonts",
        "/usr/share/fonts/truetype",
        "/usr/share/fonts/TTF",
        "/usr/share/fonts/opentype",
        "/usr/local/share/fonts",
        "~/.fonts",
        "~/.local/share/fonts",
        // Windows (via WSL)
        "/mnt/c/Windows/Fonts",
    ]
}

fn get_system_font_paths(font_name: &str) -> Vec<String> {
    let normalized = font_name.to_lowercase().replace([' ', '-'], "");

    let mut paths = Vec::new();
    for dir in [
        "/System/Library/Fonts",
        "/System/Library/Fonts/Supplemental",
        "/Library/Fonts",
        "~/Library/Fonts",
        "/usr/share/fonts/TTF",
        "/mnt/c/Windows/Fonts",
    ] {
        paths.push(format!("{}/{}.ttf", dir, font_name));
        paths.push(format!("{}/{}.otf", dir, font_name));
    }
    paths.push(format!(
        "/usr/share/fonts/truetype/{}/{}.ttf",
        normalized, normalized
    ));
    paths.push(format!(
        "/usr/share/fonts/opentype/{}/{}.otf",
        normalized, normalized
    ));

    match normalized.as_str() {
        "arial" => {
            paths.push("/mnt/c/Windows/Fonts/arial.ttf".to_string());
            paths.push(
                "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf".to_string(),
            );
        }
        "helvetica" => paths.push("/System/Library/Fonts/Helvetica.ttc".to_string()),
        "dejavusans" => {
            paths.push("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string())
        }
        _ => {}
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_color_parsing() {
        assert_eq!(TextColor::parse_lenient("black"), TextColor::Black);
        assert_eq!(TextColor::parse_lenient("WHITE"), TextColor::White);
        assert_eq!(TextColor::parse_lenient("magenta"), TextColor::White);
        assert_eq!(TextColor::Black.glow(), TextColor::White.fill());
        assert_eq!(TextColor::White.glow(), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_is_absolute_path() {
        assert!(is_absolute_path("/usr/share/fonts/font.ttf"));
        assert!(is_absolute_path("C:\\Windows\\Fonts\\arial.ttf"));
        assert!(!is_absolute_path("Arial.ttf"));
        assert!(!is_absolute_path("fonts/Arial.ttf"));
    }

    #[test]
    fn test_is_font_filename() {
        assert!(is_font_filename("Arial.TTF"));
        assert!(is_font_filename("font.otf"));
        assert!(!is_font_filename("Arial"));
        assert!(!is_font_filename("Arial.txt"));
    }

    #[test]
    fn test_missing_font_path_is_reported() {
        assert!(matches!(
            load_font("/definitely/not/here.ttf"),
            Err(ProcessingError::FontUnavailable(_))
        ));
    }

    #[test]
    fn test_render_text_overlay_placement() {
        // Skips on machines without any of the fallback fonts.
        let Ok(font) = load_font("DejaVu Sans") else {
            return;
        };
        let style = TextStyle {
            color: TextColor::White,
            position: Position::TopLeft,
            size_percent: 10.0,
            opacity: 0.5,
            padding_x: 10,
            padding_y: 10,
        };
        let overlay = render_text_overlay("Sample", &font, 800, 600, &style).unwrap();

        assert_eq!(overlay.font_size, 60);
        assert!(overlay.layer.width() > 0 && overlay.layer.height() > 0);
        // Opacity is baked in: nothing in the layer is more than half opaque.
        assert!(overlay.layer.pixels().all(|p| p[3] <= 128));
        assert!(overlay.layer.pixels().any(|p| p[3] > 0));
    }

    #[test]
    fn test_huge_text_size_is_rejected() {
        let Ok(font) = load_font("DejaVu Sans") else {
            return;
        };
        let style = TextStyle {
            color: TextColor::Black,
            position: Position::BottomRight,
            size_percent: 1_000_000.0,
            opacity: 0.5,
            padding_x: 20,
            padding_y: 20,
        };
        assert!(matches!(
            render_text_overlay("hello world", &font, 1000, 1000, &style),
            Err(ProcessingError::TextLayerTooLarge { .. })
        ));
    }

    #[test]
    fn test_layer_bound() {
        assert_eq!(
            bounded_layer_size(300, 60, 3, 60, 800, 600).unwrap(),
            (306, 66)
        );
        // Tiny canvases still get room for the minimum font size.
        assert!(bounded_layer_size(200, 30, 3, 20, 10, 10).is_ok());
        assert!(matches!(
            bounded_layer_size(u32::MAX, u32::MAX, u32::MAX, u32::MAX, 1000, 1000),
            Err(ProcessingError::TextLayerTooLarge { .. })
        ));
    }
}
