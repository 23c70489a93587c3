use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use std::path::Path;
use std::time::Duration;

/// Create a styled progress bar
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let template = ProgressStyle::with_template(
        "{spinner:.blue} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg} ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(template.progress_chars("#>-"));
    pb
}

/// Format duration in a human-readable way
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs >= 60 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        format!("{}m {}s", mins, secs)
    } else if total_secs > 0 {
        format!("{}.{:03}s", total_secs, millis)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Get file extension in lowercase
pub fn get_file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Check if a file has one of the specified extensions
pub fn has_valid_extension(path: &Path, extensions: &[&str]) -> bool {
    if let Some(ext) = get_file_extension(path) {
        extensions.contains(&ext.as_str())
    } else {
        false
    }
}

/// Set up `env_logger`. Warnings only by default, debug output for this
/// crate with `--verbose`; `RUST_LOG` overrides both.
pub fn init_logger(verbose: bool) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Warn);
    if verbose {
        builder.filter_module("media_processor", LevelFilter::Debug);
    }
    builder.parse_default_env();
    builder.format_timestamp(None);
    let _ = builder.try_init();
}

/// Print warning message
pub fn warn_println(message: &str) {
    eprintln!("{} {}", style("[WARNING]").yellow().bold(), message);
}

/// Print error message
pub fn error_println(message: &str) {
    eprintln!("{} {}", style("[ERROR]").red().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(1)), "1.000s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
    }

    #[test]
    fn test_get_file_extension() {
        assert_eq!(
            get_file_extension(&PathBuf::from("a/b/Photo.JPG")),
            Some("jpg".to_string())
        );
        assert_eq!(get_file_extension(&PathBuf::from("README")), None);
    }

    #[test]
    fn test_has_valid_extension() {
        let extensions = ["jpg", "png"];
        assert!(has_valid_extension(&PathBuf::from("x.PNG"), &extensions));
        assert!(!has_valid_extension(&PathBuf::from("x.gif"), &extensions));
        assert!(!has_valid_extension(&PathBuf::from("jpg"), &extensions));
    }
}
