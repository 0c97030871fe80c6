//! Process-backed execution channel.
//!
//! Each invocation spawns a fresh worker process (by default this binary's
//! `run-task` subcommand). The task is written to the worker's stdin as one
//! JSON document, stdin is closed, and the worker answers with one JSON
//! [`CompletionRecord`] on stdout. Killing the job kills the worker's whole
//! process group, so the compiler it started goes with it.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use scadlive_core::{CompletionRecord, TaskDescriptor};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

use crate::channel::{ContextTracker, ExecutionChannel, JobHandle};
use crate::error::ChannelError;
use crate::sandbox::SCRATCH_ROOT_VAR;

/// Maximum size of a worker reply (512 MiB, output files are base64).
const MAX_REPLY_BYTES: u64 = 512 * 1024 * 1024;

/// Runs every task in its own worker process.
#[derive(Debug, Clone)]
pub struct ProcessChannel {
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    tracker: ContextTracker,
}

impl ProcessChannel {
    /// A channel that starts `program args...` for every task.
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
            tracker: ContextTracker::new(),
        }
    }

    /// Set an environment variable on every worker this channel starts.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// A channel that re-runs the current executable as `run-task`.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, ["run-task"]))
    }

    /// Worker from `SCADLIVE_WORKER` (invoked with `run-task`), falling back
    /// to the current executable.
    pub fn from_env() -> std::io::Result<Self> {
        match std::env::var("SCADLIVE_WORKER") {
            Ok(worker) if !worker.trim().is_empty() => Ok(Self::new(worker.trim(), ["run-task"])),
            _ => Self::current_exe(),
        }
    }
}

impl ExecutionChannel for ProcessChannel {
    fn invoke(&self, task: TaskDescriptor) -> JobHandle {
        let program = self.program.clone();
        let args = self.args.clone();
        let envs = self.envs.clone();
        JobHandle::spawn(&self.tracker, async move {
            match exchange(&program, &args, &envs, &task).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(error = %e, worker = %program.display(), "Worker exchange failed");
                    CompletionRecord::internal_error(e.to_string())
                }
            }
        })
    }

    fn active_contexts(&self) -> usize {
        self.tracker.active()
    }
}

/// Send one task to a fresh worker and read its one reply.
///
/// The worker leads its own process group and runs inside a scratch
/// directory owned by this future. Dropping the future mid-run (a kill)
/// kills the whole group, compiler included, then removes the directory.
async fn exchange(
    program: &Path,
    args: &[String],
    envs: &[(String, String)],
    task: &TaskDescriptor,
) -> Result<CompletionRecord, ChannelError> {
    let payload = serde_json::to_vec(task).map_err(ChannelError::Encode)?;
    let scratch = tempfile::Builder::new()
        .prefix("scadlive-worker-")
        .tempdir()?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(envs.iter().map(|(k, v)| (k, v)))
        .env(SCRATCH_ROOT_VAR, scratch.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| ChannelError::Spawn {
        program: program.display().to_string(),
        source,
    })?;
    let mut group = ProcessGroupGuard::new(&child);

    if let Some(mut stdin) = child.stdin.take() {
        // A worker that exits before reading everything is reported by the
        // missing reply below, not by a broken pipe here.
        let _ = stdin.write_all(&payload).await;
        drop(stdin);
    }

    let mut reply = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        stdout
            .take(MAX_REPLY_BYTES)
            .read_to_end(&mut reply)
            .await?;
    }
    let status = child.wait().await?;
    group.disarm();

    if reply.iter().all(u8::is_ascii_whitespace) {
        return Err(ChannelError::NoReply {
            exit_code: status.code().unwrap_or(-1),
        });
    }
    serde_json::from_slice(&reply).map_err(ChannelError::MalformedReply)
}

/// Kills a worker's process group when dropped, unless disarmed after the
/// worker exited on its own.
struct ProcessGroupGuard {
    #[cfg(unix)]
    pgid: Option<libc::pid_t>,
}

impl ProcessGroupGuard {
    fn new(child: &Child) -> Self {
        #[cfg(not(unix))]
        let _ = child;
        Self {
            #[cfg(unix)]
            pgid: child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()),
        }
    }

    fn disarm(&mut self) {
        #[cfg(unix)]
        {
            self.pgid = None;
        }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.take() {
            // Safety: killpg takes no pointers; a stale group yields ESRCH.
            let ret = unsafe { libc::killpg(pgid, libc::SIGKILL) };
            if ret != 0 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::ESRCH) {
                    tracing::warn!(pgid, error = %err, "Failed to kill worker process group");
                }
            }
        }
    }
}
