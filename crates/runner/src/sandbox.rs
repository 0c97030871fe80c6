//! Worker-side task execution.
//!
//! [`execute_task`] is what a worker does with one [`TaskDescriptor`]:
//!
//! 1. create a private temporary working directory,
//! 2. write the virtual input files into it,
//! 3. link the requested library mounts,
//! 4. run the compiler with the task's argument list, capturing stdout and
//!    stderr line by line in arrival order,
//! 5. read back every expected output file that exists.
//!
//! The working directory is removed when the returned future completes or
//! is dropped.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use scadlive_core::{CompletionRecord, LogEntry, TaskDescriptor};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::error::SandboxError;
use crate::mounts::LibraryMounts;

/// Maximum number of log lines kept per run.
///
/// Lines past this limit are still drained from the pipes but not recorded,
/// so a runaway `echo` loop cannot exhaust memory.
const MAX_LOG_LINES: usize = 20_000;

/// Maximum size of a single captured output file (256 MiB).
const MAX_OUTPUT_FILE_BYTES: u64 = 256 * 1024 * 1024;

/// Environment variable naming the directory sandboxes are created in.
pub const SCRATCH_ROOT_VAR: &str = "SCADLIVE_SCRATCH_ROOT";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How the worker runs the compiler.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Compiler executable.
    pub compiler: PathBuf,
    /// Library directories tasks may request.
    pub mounts: LibraryMounts,
    /// Directory working directories are created in; the system temp
    /// directory when unset.
    pub scratch_root: Option<PathBuf>,
}

impl SandboxConfig {
    pub fn new(compiler: impl Into<PathBuf>) -> Self {
        Self {
            compiler: compiler.into(),
            mounts: LibraryMounts::new(),
            scratch_root: None,
        }
    }

    pub fn with_mounts(mut self, mounts: LibraryMounts) -> Self {
        self.mounts = mounts;
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Load from environment variables.
    ///
    /// | Variable                | Default         |
    /// |-------------------------|-----------------|
    /// | `SCADLIVE_COMPILER`     | `openscad`      |
    /// | `SCADLIVE_LIBRARIES`    | (none)          |
    /// | `SCADLIVE_SCRATCH_ROOT` | system temp dir |
    pub fn from_env() -> Result<Self, SandboxError> {
        let compiler = std::env::var("SCADLIVE_COMPILER").unwrap_or_else(|_| "openscad".into());
        let mounts = match std::env::var("SCADLIVE_LIBRARIES") {
            Ok(spec) => LibraryMounts::parse(&spec)?,
            Err(_) => LibraryMounts::new(),
        };
        let mut config = Self::new(compiler).with_mounts(mounts);
        if let Ok(root) = std::env::var(SCRATCH_ROOT_VAR) {
            if !root.trim().is_empty() {
                config = config.with_scratch_root(root.trim());
            }
        }
        Ok(config)
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::new("openscad")
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Run one task and describe the outcome.
///
/// Never fails: setup problems become an internal-error completion.
pub async fn execute_task(config: &SandboxConfig, task: &TaskDescriptor) -> CompletionRecord {
    match run_in_sandbox(config, task).await {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(error = %e, compiler = %config.compiler.display(), "Sandbox setup failed");
            CompletionRecord::internal_error(e.to_string())
        }
    }
}

async fn run_in_sandbox(
    config: &SandboxConfig,
    task: &TaskDescriptor,
) -> Result<CompletionRecord, SandboxError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("scadlive-");
    let workdir = match &config.scratch_root {
        Some(root) => builder.tempdir_in(root)?,
        None => builder.tempdir()?,
    };

    for (path, content) in task.inputs() {
        let dest = resolve_relative(workdir.path(), path)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&dest, content).await?;
    }

    config
        .mounts
        .link_into(workdir.path(), task.auxiliary_mounts())
        .await?;

    let mut cmd = Command::new(&config.compiler);
    cmd.args(task.args())
        .current_dir(workdir.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
        program: config.compiler.display().to_string(),
        source,
    })?;

    let merged_outputs = capture_lines(child.stdout.take(), child.stderr.take()).await;
    let status = child.wait().await?;
    let elapsed_millis = start.elapsed().as_millis() as u64;
    let exit_code = status.code().unwrap_or(-1);

    let mut outputs = Vec::new();
    for path in task.output_paths() {
        let source = resolve_relative(workdir.path(), path)?;
        if let Some(content) = read_output(&source).await? {
            outputs.push((path.clone(), content));
        }
    }

    tracing::debug!(
        exit_code,
        elapsed_ms = elapsed_millis,
        lines = merged_outputs.len(),
        outputs = outputs.len(),
        "Compiler finished"
    );

    Ok(CompletionRecord {
        outputs,
        merged_outputs,
        exit_code,
        error: None,
        elapsed_millis,
    })
}

/// Join `path` onto `root`, rejecting anything that could escape it.
fn resolve_relative(root: &Path, path: &str) -> Result<PathBuf, SandboxError> {
    let relative = Path::new(path);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if path.is_empty() || escapes {
        return Err(SandboxError::InvalidPath(path.to_string()));
    }
    Ok(root.join(relative))
}

/// Read an output file; a missing file is not an error.
async fn read_output(path: &Path) -> Result<Option<Vec<u8>>, SandboxError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if !metadata.is_file() {
        return Ok(None);
    }
    if metadata.len() > MAX_OUTPUT_FILE_BYTES {
        return Err(SandboxError::Io(std::io::Error::other(format!(
            "output {} exceeds {} bytes",
            path.display(),
            MAX_OUTPUT_FILE_BYTES
        ))));
    }
    Ok(Some(tokio::fs::read(path).await?))
}

/// Interleave stdout and stderr lines in the order they arrive.
///
/// Both pipes are drained to the end even when a line is not valid UTF-8,
/// so the compiler never sees a closed pipe.
async fn capture_lines(
    stdout: Option<tokio::process::ChildStdout>,
    stderr: Option<tokio::process::ChildStderr>,
) -> Vec<LogEntry> {
    let mut out_lines = stdout.map(LineReader::new);
    let mut err_lines = stderr.map(LineReader::new);
    let mut entries = Vec::new();
    let mut dropped = 0usize;

    let mut record = |entry: LogEntry| {
        if entries.len() < MAX_LOG_LINES {
            entries.push(entry);
        } else {
            dropped += 1;
        }
    };

    while out_lines.is_some() || err_lines.is_some() {
        tokio::select! {
            line = next_line(&mut out_lines), if out_lines.is_some() => match line {
                Some(line) => record(LogEntry::Stdout(line)),
                None => out_lines = None,
            },
            line = next_line(&mut err_lines), if err_lines.is_some() => match line {
                Some(line) => record(LogEntry::Stderr(line)),
                None => err_lines = None,
            },
        }
    }

    if dropped > 0 {
        tracing::warn!(dropped, "Compiler log truncated");
        entries.push(LogEntry::Error(format!("{dropped} log lines truncated")));
    }
    entries
}

/// Splits a pipe into lines, decoding each one lossily.
struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// Next line without its `\n` or `\r\n`; `None` at end of stream.
    async fn next(&mut self) -> std::io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        if self.buf.ends_with(b"\n") {
            self.buf.pop();
            if self.buf.ends_with(b"\r") {
                self.buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// Next line of an optional stream; a read error ends the stream.
async fn next_line<R>(lines: &mut Option<LineReader<R>>) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let lines = lines.as_mut()?;
    match lines.next().await {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!(error = %e, "Compiler pipe read failed");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
