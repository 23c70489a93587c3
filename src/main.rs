use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::ProgressBar;
use log::debug;
use std::path::Path;
use std::process::ExitCode;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use media_processor::cli::{Args, Command, IoArgs};
use media_processor::config_file::ConfigFile;
use media_processor::image_processing::convert::{ConvertOperation, ConvertSpec};
use media_processor::image_processing::crop::{CropOperation, CropSpec};
use media_processor::image_processing::metadata::read_metadata;
use media_processor::image_processing::resize::{ResizeOperation, ResizeSpec};
use media_processor::image_processing::strip::StripOperation;
use media_processor::utils::{
    create_progress_bar, error_println, format_duration, init_logger, warn_println,
};
use media_processor::{
    BatchEvent, BatchOrchestrator, ExifTool, FileOperation, JsonMessage, ProcessingResult,
    WatermarkEngine, WatermarkSpec,
};

fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(args.verbose);
    let json = args.json;

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                JsonMessage::error(format!("{:#}", e));
            } else {
                error_println(&format!("{:#}", e));
            }
            ExitCode::from(1)
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = ConfigFile::load_optional(args.config.as_deref())?;

    // One exiftool process per concurrently stripping worker at most.
    let exiftool = Arc::new(ExifTool::new(config.batch_sizes.strip()));
    install_signal_handler(Arc::clone(&exiftool))?;

    let result = execute(&args, &config, &exiftool);
    exiftool.end();
    result
}

/// SIGINT/SIGTERM shut the exiftool pool down before the process exits.
#[cfg(unix)]
fn install_signal_handler(exiftool: Arc<ExifTool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
    std::thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                debug!("Received signal {}, shutting down", signal);
                exiftool.end();
                std::process::exit(128 + signal);
            }
        })
        .context("Failed to start signal handler thread")?;
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handler(_exiftool: Arc<ExifTool>) -> Result<()> {
    Ok(())
}

fn execute(args: &Args, config: &ConfigFile, exiftool: &ExifTool) -> Result<()> {
    let jobs = match config.jobs(args.jobs) {
        0 => num_cpus::get(),
        n => n,
    };
    let batch_sizes = &config.batch_sizes;
    let command = args.command.name();
    debug!("Running {} with {} worker threads", command, jobs);

    match &args.command {
        Command::Info(info) => {
            print_info(exiftool, &info.input, config.recursive(info.recursive), args.json)
        }
        Command::Strip(strip) => {
            let operation = StripOperation::new(exiftool, batch_sizes.strip());
            run_operation(&operation, &strip.io, command, jobs, config, args.json)
        }
        Command::Resize(resize) => {
            let spec = ResizeSpec::new(
                resize.width,
                resize.height,
                resize.fit.into(),
                resize.no_enlarge,
            )?;
            let operation = ResizeOperation::new(spec, batch_sizes.resize());
            run_operation(&operation, &resize.io, command, jobs, config, args.json)
        }
        Command::Crop(crop) => {
            let spec = CropSpec::new(crop.width, crop.height, crop.left, crop.top)?;
            let operation = CropOperation::new(spec, batch_sizes.crop());
            run_operation(&operation, &crop.io, command, jobs, config, args.json)
        }
        Command::Convert(convert) => {
            let spec = ConvertSpec::new(convert.format.into(), convert.quality, convert.overwrite)?;
            let operation = ConvertOperation::new(spec, batch_sizes.convert());
            run_operation(&operation, &convert.io, command, jobs, config, args.json)
        }
        Command::Watermark(watermark) => {
            watermark.validate().map_err(anyhow::Error::msg)?;
            let options = config.merge_watermark(watermark.to_options());
            let spec = WatermarkSpec::from_options(options)?;
            let engine = WatermarkEngine::new(spec, batch_sizes.watermark())?;
            run_operation(&engine, &watermark.io, command, jobs, config, args.json)
        }
    }
}

fn run_operation(
    operation: &dyn FileOperation,
    io: &IoArgs,
    command: &str,
    jobs: usize,
    config: &ConfigFile,
    json: bool,
) -> Result<()> {
    let start_time = Instant::now();
    let orchestrator = BatchOrchestrator::new(jobs, config.recursive(io.recursive))?;
    let reporter = Reporter::new(json);

    let result = orchestrator
        .run_path(operation, &io.input, &io.output, |event| reporter.handle(event))
        .with_context(|| format!("{} failed for {}", command, io.input.display()))?;
    reporter.finish();

    print_summary(command, &result, start_time.elapsed(), json);
    Ok(())
}

/// Turns batch events into a progress bar, or JSON lines with `--json`.
struct Reporter {
    json: bool,
    progress_bar: OnceLock<ProgressBar>,
}

impl Reporter {
    fn new(json: bool) -> Self {
        Self {
            json,
            progress_bar: OnceLock::new(),
        }
    }

    fn handle(&self, event: BatchEvent) {
        match event {
            BatchEvent::Discovered { total } => {
                if self.json {
                    JsonMessage::progress(0, total, "discovered");
                } else {
                    let _ = self.progress_bar.set(create_progress_bar(total as u64));
                }
            }
            BatchEvent::BatchStarted { index, size } => {
                debug!("Starting batch {} ({} files)", index + 1, size);
            }
            BatchEvent::FileFinished {
                input,
                error,
                completed,
                total,
            } => {
                let name = input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if self.json {
                    if let Some(error) = error {
                        JsonMessage::file_failed(&input, error);
                    }
                    JsonMessage::progress(completed, total, name);
                } else if let Some(pb) = self.progress_bar.get() {
                    if let Some(error) = error {
                        pb.println(format!("{} {}", style("✗").red().bold(), error));
                    }
                    pb.set_message(name);
                    pb.inc(1);
                }
            }
            BatchEvent::BatchFinished {
                index,
                completed,
                total,
                eta,
            } => {
                debug!(
                    "Batch {} finished: {}/{} files, eta {}",
                    index + 1,
                    completed,
                    total,
                    eta.map(format_duration).unwrap_or_else(|| "-".to_string())
                );
            }
        }
    }

    fn finish(&self) {
        if let Some(pb) = self.progress_bar.get() {
            pb.finish_and_clear();
        }
    }
}

fn print_summary(command: &str, result: &ProcessingResult, elapsed: Duration, json: bool) {
    if json {
        JsonMessage::summary(command, result, elapsed.as_secs_f64());
        return;
    }

    if result.success {
        println!(
            "{} {}: processed {} file{} in {}",
            style("✓").green().bold(),
            command,
            result.processed,
            if result.processed == 1 { "" } else { "s" },
            format_duration(elapsed)
        );
    } else {
        println!(
            "{} {}: processed {} file{}, {} error{} in {}",
            style("!").yellow().bold(),
            command,
            result.processed,
            if result.processed == 1 { "" } else { "s" },
            result.errors,
            if result.errors == 1 { "" } else { "s" },
            format_duration(elapsed)
        );
        for message in &result.error_messages {
            println!("  {} {}", style("✗").red(), message);
        }
    }
}

fn print_info(exiftool: &ExifTool, input: &Path, recursive: bool, json: bool) -> Result<()> {
    let entries = read_metadata(exiftool, input, recursive)
        .with_context(|| format!("info failed for {}", input.display()))?;

    for entry in &entries {
        match (&entry.tags, json) {
            (Ok(tags), true) => JsonMessage::info(&entry.path, tags),
            (Ok(tags), false) => {
                println!("{}", style(entry.path.display()).bold().cyan());
                println!("{}", serde_json::to_string_pretty(tags)?);
            }
            (Err(e), true) => JsonMessage::file_failed(&entry.path, e.to_string()),
            (Err(e), false) => {
                warn_println(&format!("Could not read {}: {}", entry.path.display(), e))
            }
        }
    }
    Ok(())
}
