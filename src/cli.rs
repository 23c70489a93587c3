use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;

use crate::image_processing::convert::ConvertFormat;
use crate::image_processing::geometry::Position;
use crate::image_processing::resize::FitMode;
use crate::image_processing::watermark::WatermarkOptions;

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FitArg {
    /// Crop to the target aspect ratio, then fill the box exactly
    #[value(name = "cover")]
    Cover,
    /// Fit inside the box and letterbox the rest
    #[value(name = "contain")]
    Contain,
    /// Stretch to the box, ignoring aspect ratio
    #[value(name = "fill")]
    Fill,
    /// Fit inside the box, preserving aspect ratio
    #[value(name = "inside")]
    Inside,
}

impl From<FitArg> for FitMode {
    fn from(arg: FitArg) -> Self {
        match arg {
            FitArg::Cover => FitMode::Cover,
            FitArg::Contain => FitMode::Contain,
            FitArg::Fill => FitMode::Fill,
            FitArg::Inside => FitMode::Inside,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FormatArg {
    /// Lossless WebP
    #[value(name = "webp")]
    Webp,
    #[value(name = "png")]
    Png,
    #[value(name = "jpeg", alias = "jpg")]
    Jpeg,
}

impl From<FormatArg> for ConvertFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Webp => ConvertFormat::Webp,
            FormatArg::Png => ConvertFormat::Png,
            FormatArg::Jpeg => ConvertFormat::Jpeg,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "media-processor",
    version,
    about = "Batch metadata stripping, resizing, cropping, conversion and watermarking",
    long_about = "
Media Processor

Applies one transformation to a single file or to every supported file in a
directory tree, mirroring the input layout under the output directory. Files
are processed in fixed-size parallel batches; a failing file is reported and
skipped without stopping the rest of the run.

Example Usage:
  # Strip all metadata from a folder of photos
  media-processor strip ~/Photos ~/clean -r

  # Print the tags of one file
  media-processor info ~/Photos/IMG_001.jpg

  # Fit everything inside 1920x1080 without upscaling
  media-processor resize ~/Photos ~/small --width 1920 --height 1080 --no-enlarge

  # Centre-crop to a square
  media-processor crop ~/Photos ~/square --width 1000 --height 1000

  # Convert JPEG/PNG to WebP, replacing earlier results
  media-processor convert ~/Photos ~/webp --format webp --overwrite

  # Logo in the bottom-right corner at 30% opacity
  media-processor watermark ~/Photos ~/marked --image logo.svg --opacity 0.3

  # Text watermark with a config file providing the defaults
  media-processor --config media.json watermark in.jpg out.jpg --text \"(c) 2024\""
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output with detailed progress information
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Emit progress and results as JSON lines on stdout
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Number of parallel processing jobs (0 = auto-detect CPU cores)
    #[arg(short = 'j', long = "jobs", value_name = "N", global = true)]
    pub jobs: Option<usize>,

    /// JSON config file with defaults for jobs, batch sizes and watermarks
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Remove all metadata (EXIF, IPTC, XMP, ...) using exiftool
    Strip(StripArgs),
    /// Print the metadata tags of a file or directory as JSON
    Info(InfoArgs),
    /// Resize images
    Resize(ResizeArgs),
    /// Crop images to a fixed region
    Crop(CropArgs),
    /// Convert JPEG/PNG images to another format
    Convert(ConvertArgs),
    /// Stamp a text or image watermark onto images
    Watermark(WatermarkArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct IoArgs {
    /// Input file or directory
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output file or directory
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Descend into subdirectories
    #[arg(short = 'r', long = "recursive")]
    pub recursive: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct StripArgs {
    #[command(flatten)]
    pub io: IoArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InfoArgs {
    /// File or directory to inspect
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Descend into subdirectories
    #[arg(short = 'r', long = "recursive")]
    pub recursive: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ResizeArgs {
    #[command(flatten)]
    pub io: IoArgs,

    /// Target width in pixels
    #[arg(long = "width", value_name = "PX", required_unless_present = "height")]
    pub width: Option<u32>,

    /// Target height in pixels
    #[arg(long = "height", value_name = "PX")]
    pub height: Option<u32>,

    /// How the image is fitted into WIDTHxHEIGHT
    #[arg(long = "fit", value_enum, default_value = "inside")]
    pub fit: FitArg,

    /// Never upscale images smaller than the target
    #[arg(long = "no-enlarge")]
    pub no_enlarge: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CropArgs {
    #[command(flatten)]
    pub io: IoArgs,

    /// Region width in pixels
    #[arg(long = "width", value_name = "PX")]
    pub width: u32,

    /// Region height in pixels
    #[arg(long = "height", value_name = "PX")]
    pub height: u32,

    /// Left edge of the region (centred when omitted)
    #[arg(long = "left", value_name = "PX")]
    pub left: Option<u32>,

    /// Top edge of the region (centred when omitted)
    #[arg(long = "top", value_name = "PX")]
    pub top: Option<u32>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub io: IoArgs,

    /// Target format
    #[arg(long = "format", value_enum, default_value = "webp")]
    pub format: FormatArg,

    /// JPEG quality (1-100)
    #[arg(long = "quality", value_name = "Q", value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// Replace output files that already exist
    #[arg(long = "overwrite")]
    pub overwrite: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct WatermarkArgs {
    #[command(flatten)]
    pub io: IoArgs,

    /// Text to stamp (exclusive with --image)
    #[arg(long = "text", value_name = "TEXT")]
    pub text: Option<String>,

    /// Overlay image: jpeg, png, svg or webp (exclusive with --text)
    #[arg(long = "image", value_name = "FILE")]
    pub image: Option<PathBuf>,

    /// Text colour: black or white
    #[arg(long = "text-color", value_name = "COLOR")]
    pub text_color: Option<String>,

    /// top-left, top-right, bottom-left, bottom-right, center, or a compass
    /// alias (northwest, northeast, southwest, southeast)
    #[arg(long = "position", value_name = "POSITION")]
    pub position: Option<String>,

    /// Overlay opacity, 0.0-1.0
    #[arg(long = "opacity", value_name = "ALPHA")]
    pub opacity: Option<f32>,

    /// Watermark size as a percentage of the image's shorter side
    #[arg(long = "size", value_name = "PERCENT")]
    pub size: Option<f32>,

    /// Horizontal padding in pixels ("20") or percent of the width ("5%")
    #[arg(long = "padding-x", value_name = "PAD", allow_hyphen_values = true)]
    pub padding_x: Option<String>,

    /// Vertical padding in pixels ("20") or percent of the height ("5%")
    #[arg(long = "padding-y", value_name = "PAD", allow_hyphen_values = true)]
    pub padding_y: Option<String>,

    /// Font specification for text watermarks. Supports three formats:
    /// - Font name: "Arial" (searches system fonts)
    /// - Font filename: "Arial.ttf" (searches in font directories)
    /// - Full path: "/System/Library/Fonts/Arial.ttf" (loads directly)
    #[arg(long = "font", value_name = "FONT")]
    pub font: Option<String>,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Strip(_) => "strip",
            Command::Info(_) => "info",
            Command::Resize(_) => "resize",
            Command::Crop(_) => "crop",
            Command::Convert(_) => "convert",
            Command::Watermark(_) => "watermark",
        }
    }
}

impl WatermarkArgs {
    /// Reject option combinations that cannot be honoured, before any file
    /// is touched.
    pub fn validate(&self) -> Result<(), String> {
        let centered = self
            .position
            .as_deref()
            .is_some_and(|p| Position::from_str(p.trim()).is_ok_and(|p| p.is_center()));
        if centered && (self.padding_x.is_some() || self.padding_y.is_some()) {
            return Err(
                "--padding-x/--padding-y cannot be combined with --position center".to_string(),
            );
        }
        Ok(())
    }

    pub fn to_options(&self) -> WatermarkOptions {
        WatermarkOptions {
            text: self.text.clone(),
            image: self.image.clone(),
            text_color: self.text_color.clone(),
            position: self.position.clone(),
            opacity: self.opacity,
            size: self.size,
            padding_x: self.padding_x.clone(),
            padding_y: self.padding_y.clone(),
            font: self.font.clone(),
        }
    }
}
