//! Metadata access through a pool of persistent `exiftool` processes.
//!
//! Each process runs in `-stay_open` mode and reads argument files from
//! stdin, so the interpreter start-up cost is paid once per process rather
//! than once per file. Processes are spawned on first use and reaped by
//! [`ExifTool::end`], which also runs on drop.

use log::{debug, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::batch::discover_files;
use super::METADATA_EXTENSIONS;
use crate::error::{ProcessingError, Result};

pub const DEFAULT_PROGRAM: &str = "exiftool";

/// Tag name to value, as reported by `exiftool -json`.
pub type TagMap = BTreeMap<String, Value>;

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr: BufReader<ChildStderr>,
    sequence: u64,
}

/// Output of one `-execute` round trip.
#[derive(Debug, Default)]
struct Response {
    stdout: String,
    stderr: String,
}

impl Session {
    fn spawn(program: &Path) -> Result<Self> {
        let mut child = Command::new(program)
            .args(["-stay_open", "True", "-@", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ProcessingError::ExternalToolFailure(format!(
                    "failed to start {}: {}",
                    program.display(),
                    e
                ))
            })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProcessingError::ExternalToolFailure(
                "exiftool started without piped stdio".to_string(),
            ));
        };

        debug!("Started exiftool process {}", child.id());
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr: BufReader::new(stderr),
            sequence: 0,
        })
    }

    fn execute(&mut self, args: &[String]) -> Result<Response> {
        self.sequence += 1;
        let marker = format!("{{ready{}}}", self.sequence);

        let mut request = String::new();
        for arg in args {
            if arg.contains('\n') {
                return Err(ProcessingError::ExternalToolFailure(format!(
                    "argument contains a newline: {:?}",
                    arg
                )));
            }
            request.push_str(arg);
            request.push('\n');
        }
        request.push_str(&format!("-echo4\n{}\n-execute{}\n", marker, self.sequence));

        self.stdin
            .write_all(request.as_bytes())
            .and_then(|_| self.stdin.flush())
            .map_err(|e| ProcessingError::ExternalToolFailure(format!("write failed: {}", e)))?;

        let stdout = read_until_marker(&mut self.stdout, &marker)?;
        let stderr = read_until_marker(&mut self.stderr, &marker)?;
        Ok(Response { stdout, stderr })
    }

    fn close(mut self) {
        let pid = self.child.id();
        if let Err(e) = self
            .stdin
            .write_all(b"-stay_open\nFalse\n")
            .and_then(|_| self.stdin.flush())
        {
            warn!("Could not ask exiftool {} to exit: {}", pid, e);
            let _ = self.child.kill();
        }
        drop(self.stdin);
        match self.child.wait() {
            Ok(status) => debug!("exiftool process {} exited with {}", pid, status),
            Err(e) => warn!("Failed to reap exiftool process {}: {}", pid, e),
        }
    }
}

fn read_until_marker<R: BufRead>(reader: &mut R, marker: &str) -> Result<String> {
    let mut collected = String::new();
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| ProcessingError::ExternalToolFailure(format!("read failed: {}", e)))?;
        if read == 0 {
            return Err(ProcessingError::ExternalToolFailure(
                "exiftool exited unexpectedly".to_string(),
            ));
        }
        if line.trim_end() == marker {
            return Ok(collected);
        }
        collected.push_str(&line);
    }
}

/// A bounded pool of `exiftool -stay_open` processes.
///
/// Safe to share across worker threads; each call takes a free slot,
/// spawning its process on first use.
pub struct ExifTool {
    program: PathBuf,
    slots: Vec<Mutex<Option<Session>>>,
    next_slot: AtomicUsize,
    ended: AtomicBool,
}

impl ExifTool {
    /// Pool of up to `max_processes` processes (at least one).
    pub fn new(max_processes: usize) -> Self {
        Self::with_program(DEFAULT_PROGRAM, max_processes)
    }

    pub fn with_program(program: impl Into<PathBuf>, max_processes: usize) -> Self {
        Self {
            program: program.into(),
            slots: (0..max_processes.max(1)).map(|_| Mutex::new(None)).collect(),
            next_slot: AtomicUsize::new(0),
            ended: AtomicBool::new(false),
        }
    }

    /// Whether the exiftool binary can be run at all.
    pub fn is_available() -> bool {
        Command::new(DEFAULT_PROGRAM)
            .arg("-ver")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }

    fn acquire(&self) -> MutexGuard<'_, Option<Session>> {
        let start = self.next_slot.fetch_add(1, Ordering::Relaxed);
        let count = self.slots.len();
        for i in 0..count {
            if let Ok(guard) = self.slots[(start + i) % count].try_lock() {
                return guard;
            }
        }
        self.slots[start % count]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn execute(&self, args: Vec<String>) -> Result<Response> {
        if self.ended.load(Ordering::SeqCst) {
            return Err(ProcessingError::ExternalToolFailure(
                "exiftool has already been shut down".to_string(),
            ));
        }

        let mut slot = self.acquire();
        if slot.is_none() {
            *slot = Some(Session::spawn(&self.program)?);
        }
        let Some(session) = slot.as_mut() else {
            return Err(ProcessingError::ExternalToolFailure(
                "exiftool session unavailable".to_string(),
            ));
        };

        match session.execute(&args) {
            Ok(response) => Ok(response),
            Err(e) => {
                // Drop the broken process; the next call respawns it.
                if let Some(broken) = slot.take() {
                    broken.close();
                }
                Err(e)
            }
        }
    }

    /// Read every tag of `path`.
    pub fn read(&self, path: &Path) -> Result<TagMap> {
        let response = self.execute(vec!["-json".to_string(), path_arg(path)])?;
        if response.stdout.trim().is_empty() {
            return Err(tool_error(path, &response.stderr));
        }

        let parsed: Vec<TagMap> = serde_json::from_str(&response.stdout).map_err(|e| {
            ProcessingError::ExternalToolFailure(format!("unparseable exiftool output: {}", e))
        })?;
        parsed
            .into_iter()
            .next()
            .ok_or_else(|| tool_error(path, &response.stderr))
    }

    /// Write `tags` to `path`, followed by any `raw_args` verbatim.
    pub fn write(
        &self,
        path: &Path,
        tags: &BTreeMap<String, String>,
        raw_args: &[&str],
    ) -> Result<()> {
        let mut args: Vec<String> = tags
            .iter()
            .map(|(tag, value)| format!("-{}={}", tag, value))
            .collect();
        args.extend(raw_args.iter().map(|arg| arg.to_string()));
        args.push(path_arg(path));

        let response = self.execute(args)?;
        if response.stderr.lines().any(|line| line.starts_with("Error")) {
            return Err(tool_error(path, &response.stderr));
        }
        if !response.stderr.trim().is_empty() {
            debug!("exiftool on {}: {}", path.display(), response.stderr.trim());
        }
        Ok(())
    }

    /// Remove every writable tag from `path`, in place.
    pub fn strip_all(&self, path: &Path) -> Result<()> {
        self.write(path, &BTreeMap::new(), &["-all=", "-overwrite_original"])
    }

    /// Shut down every running process. Later calls are no-ops, and later
    /// reads or writes fail with [`ProcessingError::ExternalToolFailure`].
    pub fn end(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        for slot in &self.slots {
            let session = slot
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            if let Some(session) = session {
                session.close();
            }
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

impl Drop for ExifTool {
    fn drop(&mut self) {
        self.end();
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn tool_error(path: &Path, stderr: &str) -> ProcessingError {
    let detail = stderr.trim();
    ProcessingError::ExternalToolFailure(if detail.is_empty() {
        format!("no output for {}", path.display())
    } else {
        format!("{}: {}", path.display(), detail)
    })
}

/// Tags read for one file of an `info` run.
#[derive(Debug)]
pub struct MetadataEntry {
    pub path: PathBuf,
    pub tags: Result<TagMap>,
}

/// Tags for a single file, or for every metadata-capable file under a
/// directory (read one after another, in path order).
///
/// A single file's failure is returned as the error. Under a directory each
/// file carries its own outcome, so one unreadable file does not hide the
/// rest.
pub fn read_metadata(
    exiftool: &ExifTool,
    input: &Path,
    recursive: bool,
) -> Result<Vec<MetadataEntry>> {
    if !input.exists() {
        return Err(ProcessingError::InputNotFound(input.to_path_buf()));
    }
    if input.is_file() {
        let tags = exiftool.read(input)?;
        return Ok(vec![MetadataEntry {
            path: input.to_path_buf(),
            tags: Ok(tags),
        }]);
    }
    if !input.is_dir() {
        return Err(ProcessingError::InvalidInputKind(input.to_path_buf()));
    }

    Ok(discover_files(input, METADATA_EXTENSIONS, recursive)?
        .into_iter()
        .map(|path| {
            let tags = exiftool.read(&path);
            if let Err(e) = &tags {
                debug!("Could not read tags from {}: {}", path.display(), e);
            }
            MetadataEntry { path, tags }
        })
        .collect())
}
