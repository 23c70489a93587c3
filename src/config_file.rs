use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::image_processing::watermark::WatermarkOptions;
use crate::image_processing::{convert, crop, resize, strip, watermark};

/// JSON config file passed with `--config`. Every field is optional; values
/// given on the command line win over values from the file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigFile {
    pub jobs: Option<usize>,
    pub recursive: Option<bool>,
    pub batch_sizes: BatchSizes,
    pub watermark: WatermarkDefaults,
}

/// Files processed concurrently per batch, per operation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchSizes {
    pub strip: Option<usize>,
    pub resize: Option<usize>,
    pub crop: Option<usize>,
    pub convert: Option<usize>,
    pub watermark: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatermarkDefaults {
    pub position: Option<String>,
    pub opacity: Option<f32>,
    pub size: Option<f32>,
    pub padding_x: Option<String>,
    pub padding_y: Option<String>,
    pub text_color: Option<String>,
    pub font: Option<String>,
}

impl ConfigFile {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: ConfigFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        debug!("Loaded configuration from {:?}: {:?}", path, config);
        Ok(config)
    }

    /// Load `path` if given, otherwise use built-in defaults.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Worker threads: CLI value, then file value, then 0 (one per CPU).
    pub fn jobs(&self, cli: Option<usize>) -> usize {
        cli.or(self.jobs).unwrap_or(0)
    }

    /// A `-r` on the command line always wins; otherwise the file decides.
    pub fn recursive(&self, cli: bool) -> bool {
        cli || self.recursive.unwrap_or(false)
    }

    /// Fill every watermark option the command line left unset.
    pub fn merge_watermark(&self, mut options: WatermarkOptions) -> WatermarkOptions {
        let defaults = &self.watermark;
        if options.position.is_none() {
            options.position = defaults.position.clone();
        }
        if options.opacity.is_none() {
            options.opacity = defaults.opacity;
        }
        if options.size.is_none() {
            options.size = defaults.size;
        }
        if options.padding_x.is_none() {
            options.padding_x = defaults.padding_x.clone();
        }
        if options.padding_y.is_none() {
            options.padding_y = defaults.padding_y.clone();
        }
        if options.text_color.is_none() {
            options.text_color = defaults.text_color.clone();
        }
        if options.font.is_none() {
            options.font = defaults.font.clone();
        }
        options
    }
}

impl BatchSizes {
    pub fn strip(&self) -> usize {
        positive_or(self.strip, strip::DEFAULT_BATCH_SIZE)
    }

    pub fn resize(&self) -> usize {
        positive_or(self.resize, resize::DEFAULT_BATCH_SIZE)
    }

    pub fn crop(&self) -> usize {
        positive_or(self.crop, crop::DEFAULT_BATCH_SIZE)
    }

    pub fn convert(&self) -> usize {
        positive_or(self.convert, convert::DEFAULT_BATCH_SIZE)
    }

    pub fn watermark(&self) -> usize {
        positive_or(self.watermark, watermark::DEFAULT_BATCH_SIZE)
    }
}

fn positive_or(value: Option<usize>, default: usize) -> usize {
    value.filter(|v| *v > 0).unwrap_or(default)
}
