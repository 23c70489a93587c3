//! Bounded-concurrency fan-out of a [`FileOperation`] over a directory tree.
//!
//! Files are discovered up front, mirrored onto the output root, and cut into
//! fixed-size groups. Each group runs in parallel on the orchestrator's
//! worker pool and must fully settle before the next group starts, so peak
//! concurrency never exceeds the operation's batch size. A failing file is
//! recorded and never stops its siblings.

use log::{debug, info};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

use super::{FileOperation, ProcessingResult};
use crate::error::{ProcessingError, Result};
use crate::utils::has_valid_extension;

/// One unit of work: a discovered input and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTask {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Progress notifications emitted while a directory is processed.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Discovered {
        total: usize,
    },
    BatchStarted {
        index: usize,
        size: usize,
    },
    FileFinished {
        input: PathBuf,
        error: Option<String>,
        completed: usize,
        total: usize,
    },
    BatchFinished {
        index: usize,
        completed: usize,
        total: usize,
        eta: Option<Duration>,
    },
}

/// Batch processing statistics and progress tracking
///
/// Shared by every task of a run. Counters are atomics and the message list
/// sits behind a mutex that is only held for the push, never across I/O.
pub struct BatchProcessor {
    pub total_files: usize,
    processed_count: AtomicUsize,
    failed_count: AtomicUsize,
    error_messages: Mutex<Vec<String>>,
    start_time: Instant,
}

impl BatchProcessor {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            processed_count: AtomicUsize::new(0),
            failed_count: AtomicUsize::new(0),
            error_messages: Mutex::new(Vec::new()),
            start_time: Instant::now(),
        }
    }

    /// Record a success and return the number of settled files
    pub fn record_success(&self) -> usize {
        self.processed_count.fetch_add(1, Ordering::Relaxed) + 1 + self.failed()
    }

    /// Record a failure and return the number of settled files
    pub fn record_failure(&self, message: String) -> usize {
        self.error_messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message);
        self.failed_count.fetch_add(1, Ordering::Relaxed) + 1 + self.processed()
    }

    pub fn processed(&self) -> usize {
        self.processed_count.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed_count.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> usize {
        self.processed() + self.failed()
    }

    /// Get current progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_files == 0 {
            1.0
        } else {
            self.completed() as f64 / self.total_files as f64
        }
    }

    /// Get estimated time remaining
    pub fn eta(&self) -> Option<Duration> {
        let completed = self.completed();
        if completed == 0 {
            return None;
        }

        let remaining = self.total_files.saturating_sub(completed);
        if remaining == 0 {
            return Some(Duration::new(0, 0));
        }

        let time_per_item = self.start_time.elapsed() / completed as u32;
        Some(time_per_item * remaining as u32)
    }

    /// Get processing speed (items per second)
    pub fn items_per_second(&self) -> f64 {
        let completed = self.completed();
        let elapsed_secs = self.start_time.elapsed().as_secs_f64();
        if completed == 0 || elapsed_secs == 0.0 {
            return 0.0;
        }
        completed as f64 / elapsed_secs
    }

    pub fn into_result(self) -> ProcessingResult {
        let processed = self.processed();
        let messages = self
            .error_messages
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        ProcessingResult::from_outcome(processed, messages)
    }
}

/// Runs file operations over single files or whole directories.
pub struct BatchOrchestrator {
    pool: rayon::ThreadPool,
    recursive: bool,
}

impl BatchOrchestrator {
    /// `jobs` caps the worker pool (0 lets rayon pick one thread per core).
    pub fn new(jobs: usize, recursive: bool) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|i| format!("media-worker-{}", i))
            .build()?;
        Ok(Self { pool, recursive })
    }

    /// Dispatch on the input kind: a file runs the operation directly and
    /// propagates its error; a directory goes through [`Self::run`].
    pub fn run_path<O, F>(
        &self,
        operation: &O,
        input: &Path,
        output: &Path,
        on_event: F,
    ) -> Result<ProcessingResult>
    where
        O: FileOperation + ?Sized,
        F: Fn(BatchEvent) + Sync,
    {
        if !input.exists() {
            return Err(ProcessingError::InputNotFound(input.to_path_buf()));
        }

        if input.is_file() {
            if !has_valid_extension(input, operation.extensions()) {
                return Err(ProcessingError::UnsupportedFormat(format!(
                    "{} (supported: {})",
                    input.display(),
                    operation.extensions().join(", ")
                )));
            }
            let destination = operation.output_path(single_file_output(input, output));
            prepare_output_dir(&destination)?;
            operation.process_file(input, &destination)?;
            return Ok(ProcessingResult::single());
        }

        if input.is_dir() {
            return self.run(operation, input, output, on_event);
        }

        Err(ProcessingError::InvalidInputKind(input.to_path_buf()))
    }

    /// Process every matching file under `input_root`.
    ///
    /// An empty match set returns a clean zero-count result without creating
    /// `output_root`.
    pub fn run<O, F>(
        &self,
        operation: &O,
        input_root: &Path,
        output_root: &Path,
        on_event: F,
    ) -> Result<ProcessingResult>
    where
        O: FileOperation + ?Sized,
        F: Fn(BatchEvent) + Sync,
    {
        let files = discover_files(input_root, operation.extensions(), self.recursive)?;
        if files.is_empty() {
            info!("No matching files under {}", input_root.display());
            return Ok(ProcessingResult::empty());
        }

        let tasks = plan_tasks(operation, input_root, output_root, &files);
        fs::create_dir_all(output_root)?;

        let batch_size = operation.batch_size().max(1);
        let tracker = BatchProcessor::new(tasks.len());
        on_event(BatchEvent::Discovered { total: tasks.len() });
        info!(
            "Processing {} files from {} in batches of {}",
            tasks.len(),
            input_root.display(),
            batch_size
        );

        for (index, batch) in tasks.chunks(batch_size).enumerate() {
            on_event(BatchEvent::BatchStarted {
                index,
                size: batch.len(),
            });

            // install() returns only once every task of this group settled.
            self.pool.install(|| {
                batch.par_iter().for_each(|task| {
                    let outcome = prepare_output_dir(&task.output)
                        .and_then(|_| operation.process_file(&task.input, &task.output));

                    let (completed, error) = match outcome {
                        Ok(()) => {
                            debug!("{} -> {}", task.input.display(), task.output.display());
                            (tracker.record_success(), None)
                        }
                        Err(e) => {
                            let message = format!(
                                "Error {} {}: {}",
                                operation.verb(),
                                task.input.display(),
                                e
                            );
                            debug!("{}", message);
                            (tracker.record_failure(message.clone()), Some(message))
                        }
                    };

                    on_event(BatchEvent::FileFinished {
                        input: task.input.clone(),
                        error,
                        completed,
                        total: tracker.total_files,
                    });
                });
            });

            debug!(
                "Batch {} settled, {:.0}% done",
                index + 1,
                tracker.progress() * 100.0
            );
            on_event(BatchEvent::BatchFinished {
                index,
                completed: tracker.completed(),
                total: tracker.total_files,
                eta: tracker.eta(),
            });
        }

        info!(
            "Finished {} files at {:.1} files/s",
            tracker.completed(),
            tracker.items_per_second()
        );
        Ok(tracker.into_result())
    }
}

/// Enumerate files under `root` whose extension is in `extensions`,
/// sorted for a stable processing order.
pub fn discover_files(root: &Path, extensions: &[&str], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut walker = WalkDir::new(root).follow_links(false);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && has_valid_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    debug!("Found {} matching files under {}", files.len(), root.display());
    Ok(files)
}

/// Output root joined with the file's path relative to the input root.
pub fn mirror_path(input_root: &Path, output_root: &Path, file: &Path) -> PathBuf {
    match file.strip_prefix(input_root) {
        Ok(relative) => output_root.join(relative),
        Err(_) => output_root.join(file.file_name().unwrap_or(file.as_os_str())),
    }
}

pub fn plan_tasks<O: FileOperation + ?Sized>(
    operation: &O,
    input_root: &Path,
    output_root: &Path,
    files: &[PathBuf],
) -> Vec<BatchTask> {
    files
        .iter()
        .map(|file| BatchTask {
            input: file.clone(),
            output: operation.output_path(mirror_path(input_root, output_root, file)),
        })
        .collect()
}

/// A single-file destination: inside `output` when it is an existing
/// directory, otherwise `output` itself.
fn single_file_output(input: &Path, output: &Path) -> PathBuf {
    match input.file_name() {
        Some(name) if output.is_dir() => output.join(name),
        _ => output.to_path_buf(),
    }
}

/// Concurrent tasks may race to create the same directory; create_dir_all
/// tolerates that.
fn prepare_output_dir(output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
