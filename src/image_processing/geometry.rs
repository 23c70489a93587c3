//! Placement math for watermark overlays.
//!
//! Everything in here is pure: canvas and overlay dimensions in, pixel
//! offsets out. Offsets are signed because an overlay larger than its canvas
//! (or padding larger than the canvas) legitimately lands partly off-canvas;
//! the compositor clips.

use log::warn;
use std::str::FromStr;
use strum_macros::{Display, EnumString};

use crate::error::{ProcessingError, Result};

/// Smallest font size the text path will render, in pixels.
pub const MIN_FONT_SIZE: u32 = 20;

/// Named anchor for an overlay.
///
/// Nine keywords are accepted: the five canonical names plus compass
/// aliases for the four corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Position {
    #[strum(to_string = "top-left", serialize = "northwest")]
    TopLeft,
    #[strum(to_string = "top-right", serialize = "northeast")]
    TopRight,
    #[strum(to_string = "bottom-left", serialize = "southwest")]
    BottomLeft,
    #[strum(to_string = "bottom-right", serialize = "southeast")]
    BottomRight,
    #[strum(to_string = "center")]
    Center,
}

impl Position {
    /// Parse a position keyword, falling back to bottom-right for anything
    /// unrecognised. The fallback is intentional leniency carried over from
    /// the CLI contract and is logged rather than rejected.
    pub fn parse_lenient(value: &str) -> Self {
        match Position::from_str(value.trim()) {
            Ok(position) => position,
            Err(_) => {
                warn!(
                    "Unknown watermark position '{}', falling back to {}",
                    value,
                    Position::BottomRight
                );
                Position::BottomRight
            }
        }
    }

    pub fn is_center(&self) -> bool {
        matches!(self, Position::Center)
    }
}

/// Horizontal alignment of rendered text relative to its anchor point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    Start,
    Middle,
    End,
}

/// Resolved placement of an overlay on a canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub offset_x: i64,
    pub offset_y: i64,
    /// Overlay size after scaling; `None` for text, which is laid out at
    /// its font size instead.
    pub scaled_size: Option<(u32, u32)>,
}

/// Resolve a padding value against one canvas dimension.
///
/// Accepts a plain non-negative number of pixels (`"20"`) or a percentage of
/// `dimension` (`"10%"`). Fractional results round to the nearest pixel.
pub fn resolve_padding(value: &str, dimension: u32) -> Result<u32> {
    let invalid = || ProcessingError::InvalidPadding(value.to_string());
    let trimmed = value.trim();

    if let Some(percent) = trimmed.strip_suffix('%') {
        let percent: f64 = percent.trim().parse().map_err(|_| invalid())?;
        if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
            return Err(invalid());
        }
        return Ok((dimension as f64 * percent / 100.0).round() as u32);
    }

    let pixels: f64 = trimmed.parse().map_err(|_| invalid())?;
    if !pixels.is_finite() || pixels < 0.0 {
        return Err(invalid());
    }
    Ok(pixels.round() as u32)
}

/// Scale an overlay so its larger side matches `size_percent` of the
/// canvas' shorter side, preserving aspect ratio.
pub fn resolve_overlay_size(
    overlay_width: u32,
    overlay_height: u32,
    canvas_width: u32,
    canvas_height: u32,
    size_percent: f32,
) -> Result<(u32, u32)> {
    if size_percent.is_nan() || size_percent <= 0.0 || size_percent > 100.0 {
        return Err(ProcessingError::InvalidSize(size_percent));
    }
    if overlay_width == 0 || overlay_height == 0 {
        return Err(ProcessingError::InvalidOption(format!(
            "watermark image has no pixels ({}x{})",
            overlay_width, overlay_height
        )));
    }

    let target = canvas_width.min(canvas_height) as f64 * size_percent as f64 / 100.0;
    let scale = (target / overlay_width as f64).min(target / overlay_height as f64);

    Ok((
        (overlay_width as f64 * scale).round() as u32,
        (overlay_height as f64 * scale).round() as u32,
    ))
}

/// Top-left offset of a `content_width` x `content_height` box anchored at
/// `position`. Center ignores padding.
pub fn resolve_position(
    position: Position,
    canvas_width: u32,
    canvas_height: u32,
    content_width: u32,
    content_height: u32,
    padding_x: u32,
    padding_y: u32,
) -> (i64, i64) {
    let (cw, ch) = (canvas_width as i64, canvas_height as i64);
    let (w, h) = (content_width as i64, content_height as i64);
    let (px, py) = (padding_x as i64, padding_y as i64);

    match position {
        Position::TopLeft => (px, py),
        Position::TopRight => (cw - w - px, py),
        Position::BottomLeft => (px, ch - h - py),
        Position::BottomRight => (cw - w - px, ch - h - py),
        Position::Center => ((cw - w) / 2, (ch - h) / 2),
    }
}

/// Full placement for an image overlay: scaled size, clamped so the overlay
/// is never enlarged past its source resolution, then the anchored offset.
pub fn resolve_image_geometry(
    overlay_size: (u32, u32),
    canvas_size: (u32, u32),
    size_percent: f32,
    position: Position,
    padding_x: u32,
    padding_y: u32,
) -> Result<Geometry> {
    let (overlay_width, overlay_height) = overlay_size;
    let (canvas_width, canvas_height) = canvas_size;

    let (scaled_width, scaled_height) = resolve_overlay_size(
        overlay_width,
        overlay_height,
        canvas_width,
        canvas_height,
        size_percent,
    )?;
    let (width, height) = if scaled_width > overlay_width || scaled_height > overlay_height {
        (overlay_width, overlay_height)
    } else {
        (scaled_width.max(1), scaled_height.max(1))
    };

    let (offset_x, offset_y) = resolve_position(
        position,
        canvas_width,
        canvas_height,
        width,
        height,
        padding_x,
        padding_y,
    );

    Ok(Geometry {
        offset_x,
        offset_y,
        scaled_size: Some((width, height)),
    })
}

pub fn text_horizontal_anchor(position: Position) -> TextAnchor {
    match position {
        Position::TopLeft | Position::BottomLeft => TextAnchor::Start,
        Position::TopRight | Position::BottomRight => TextAnchor::End,
        Position::Center => TextAnchor::Middle,
    }
}

/// Font size for text watermarks: `size_percent` of the canvas' shorter
/// side, never below [`MIN_FONT_SIZE`]. Unlike image overlays there is no
/// upper bound here; the text renderer refuses layers that dwarf the canvas.
pub fn text_font_size(canvas_width: u32, canvas_height: u32, size_percent: f32) -> u32 {
    let derived = (canvas_width.min(canvas_height) as f64 * size_percent as f64 / 100.0).round();
    if derived.is_nan() || derived < MIN_FONT_SIZE as f64 {
        MIN_FONT_SIZE
    } else {
        derived as u32
    }
}

/// Anchor point for a line of text: x on the horizontal anchor, y on the
/// text's vertical middle, half a font size in from the padded edge.
pub fn resolve_text_anchor(
    position: Position,
    canvas_width: u32,
    canvas_height: u32,
    font_size: u32,
    padding_x: u32,
    padding_y: u32,
) -> (i64, i64) {
    let (cw, ch) = (canvas_width as i64, canvas_height as i64);
    let (px, py) = (padding_x as i64, padding_y as i64);
    let half_font = font_size as i64 / 2;

    let x = match text_horizontal_anchor(position) {
        TextAnchor::Start => px,
        TextAnchor::Middle => cw / 2,
        TextAnchor::End => cw - px,
    };
    let y = match position {
        Position::TopLeft | Position::TopRight => py + half_font,
        Position::BottomLeft | Position::BottomRight => ch - py - half_font,
        Position::Center => ch / 2,
    };

    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KEYWORDS: [&str; 9] = [
        "top-left",
        "top-right",
        "bottom-left",
        "bottom-right",
        "center",
        "northwest",
        "northeast",
        "southwest",
        "southeast",
    ];

    #[test]
    fn test_resolve_padding() {
        assert_eq!(resolve_padding("10%", 800).unwrap(), 80);
        assert_eq!(resolve_padding("20", 800).unwrap(), 20);
        assert_eq!(resolve_padding(" 0% ", 800).unwrap(), 0);
        assert_eq!(resolve_padding("100%", 640).unwrap(), 640);
        assert_eq!(resolve_padding("12.6", 100).unwrap(), 13);
    }

    #[test]
    fn test_resolve_padding_invalid() {
        for value in ["-1", "101%", "-5%", "abc", "NaN", "NaN%", "inf", ""] {
            assert!(
                matches!(
                    resolve_padding(value, 800),
                    Err(ProcessingError::InvalidPadding(_))
                ),
                "expected InvalidPadding for {:?}",
                value
            );
        }
    }

    #[test]
    fn test_resolve_overlay_size_end_to_end_example() {
        assert_eq!(resolve_overlay_size(400, 400, 800, 800, 25.0).unwrap(), (200, 200));
    }

    #[test]
    fn test_resolve_overlay_size_bounds_and_aspect() {
        let canvases = [(800, 600), (1920, 1080), (333, 777), (50, 50)];
        let overlays = [(400, 100), (100, 400), (640, 480), (7, 3), (1000, 1000)];
        let percents = [1.0f32, 12.5, 25.0, 50.0, 99.9, 100.0];

        for &(cw, ch) in &canvases {
            for &(ow, oh) in &overlays {
                for &pct in &percents {
                    let (w, h) = resolve_overlay_size(ow, oh, cw, ch, pct).unwrap();
                    let bound = (cw.min(ch) as f64 * pct as f64 / 100.0).round() as u32;
                    assert!(w <= bound && h <= bound, "{}x{} over bound {}", w, h, bound);

                    if w > 1 && h > 1 {
                        let source_aspect = ow as f64 / oh as f64;
                        let scaled_aspect = w as f64 / h as f64;
                        // One pixel of rounding on the shorter side.
                        let tolerance = source_aspect / w.min(h) as f64 * 2.0;
                        assert!(
                            (source_aspect - scaled_aspect).abs() <= tolerance.max(0.02),
                            "aspect drift {} vs {}",
                            source_aspect,
                            scaled_aspect
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_resolve_overlay_size_invalid() {
        for pct in [0.0f32, -10.0, 100.5, f32::NAN] {
            assert!(matches!(
                resolve_overlay_size(100, 100, 800, 800, pct),
                Err(ProcessingError::InvalidSize(_))
            ));
        }
    }

    #[test]
    fn test_position_keywords() {
        assert_eq!(Position::parse_lenient("top-left"), Position::TopLeft);
        assert_eq!(Position::parse_lenient("NorthEast"), Position::TopRight);
        assert_eq!(Position::parse_lenient("southwest"), Position::BottomLeft);
        assert_eq!(Position::parse_lenient("center"), Position::Center);
        assert_eq!(Position::parse_lenient("middle-ish"), Position::BottomRight);
        assert_eq!(Position::parse_lenient(""), Position::BottomRight);
        assert_eq!(Position::TopRight.to_string(), "top-right");
    }

    #[test]
    fn test_resolve_position_stays_inside_canvas() {
        let canvases = [(800u32, 600u32), (100, 1000), (64, 64)];
        let contents = [(10u32, 10u32), (40, 20), (64, 64)];
        let paddings = [(0u32, 0u32), (5, 7), (20, 20)];

        for keyword in ALL_KEYWORDS {
            let position = Position::parse_lenient(keyword);
            for &(cw, ch) in &canvases {
                for &(w, h) in &contents {
                    for &(px, py) in &paddings {
                        if w + px > cw || h + py > ch {
                            continue;
                        }
                        let (x, y) = resolve_position(position, cw, ch, w, h, px, py);
                        assert!(x >= 0 && y >= 0, "{} placed at {},{}", keyword, x, y);
                        assert!(x + w as i64 <= cw as i64 && y + h as i64 <= ch as i64);
                    }
                }
            }
        }
    }

    #[test]
    fn test_resolve_position_center_ignores_padding() {
        assert_eq!(resolve_position(Position::Center, 800, 600, 200, 100, 50, 50), (300, 250));
        assert_eq!(resolve_position(Position::Center, 800, 600, 200, 100, 0, 0), (300, 250));
    }

    #[test]
    fn test_resolve_image_geometry_end_to_end_example() {
        let geometry =
            resolve_image_geometry((400, 400), (800, 800), 25.0, Position::BottomRight, 20, 20)
                .unwrap();
        assert_eq!(geometry.scaled_size, Some((200, 200)));
        assert_eq!((geometry.offset_x, geometry.offset_y), (580, 580));
    }

    #[test]
    fn test_resolve_image_geometry_never_enlarges() {
        // 50% of a 2000px canvas would ask for 1000px; source is only 100px.
        let geometry =
            resolve_image_geometry((100, 50), (2000, 2000), 50.0, Position::TopLeft, 0, 0).unwrap();
        assert_eq!(geometry.scaled_size, Some((100, 50)));
    }

    #[test]
    fn test_text_font_size_floor() {
        assert_eq!(text_font_size(800, 600, 10.0), 60);
        assert_eq!(text_font_size(100, 100, 5.0), MIN_FONT_SIZE);
        assert_eq!(text_font_size(100, 100, -5.0), MIN_FONT_SIZE);
        assert_eq!(text_font_size(1000, 1000, 250.0), 2500);
    }

    #[test]
    fn test_text_anchor() {
        assert_eq!(text_horizontal_anchor(Position::TopLeft), TextAnchor::Start);
        assert_eq!(text_horizontal_anchor(Position::BottomRight), TextAnchor::End);
        assert_eq!(text_horizontal_anchor(Position::Center), TextAnchor::Middle);

        assert_eq!(resolve_text_anchor(Position::TopLeft, 800, 600, 40, 10, 10), (10, 30));
        assert_eq!(resolve_text_anchor(Position::BottomRight, 800, 600, 40, 10, 10), (790, 570));
        assert_eq!(resolve_text_anchor(Position::Center, 800, 600, 40, 10, 10), (400, 300));
    }
}
