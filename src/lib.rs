// Library exports for the CLI binary and integration tests
pub mod cli;
pub mod config_file;
pub mod error;
pub mod image_processing;
pub mod json_output;
pub mod utils;

// Re-export commonly used types
pub use error::{ProcessingError, Result};
pub use image_processing::batch::{BatchEvent, BatchOrchestrator};
pub use image_processing::metadata::ExifTool;
pub use image_processing::watermark::{WatermarkEngine, WatermarkOptions, WatermarkSpec};
pub use image_processing::{FileOperation, ProcessingResult};
pub use json_output::JsonMessage;
