//! `scadlive run-task`: the worker end of the process channel.
//!
//! Reads exactly one task message from stdin, runs it in a fresh sandbox,
//! and writes exactly one completion message to stdout. Logs go to stderr.

use anyhow::Context;
use scadlive_core::{CompletionRecord, TaskDescriptor};
use scadlive_runner::{execute_task, SandboxConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub async fn run() -> anyhow::Result<()> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read task from stdin")?;

    let record = match SandboxConfig::from_env() {
        Ok(config) => complete(&config, &input).await,
        Err(e) => CompletionRecord::internal_error(e.to_string()),
    };

    let reply = serde_json::to_vec(&record).context("Failed to encode completion")?;
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&reply).await?;
    stdout.flush().await?;
    Ok(())
}

/// Run the task encoded in `input`; a malformed task is an internal error.
async fn complete(config: &SandboxConfig, input: &str) -> CompletionRecord {
    match serde_json::from_str::<TaskDescriptor>(input) {
        Ok(task) => {
            tracing::debug!(args = ?task.args(), inputs = task.inputs().len(), "Running task");
            execute_task(config, &task).await
        }
        Err(e) => {
            tracing::error!(error = %e, "Malformed task message");
            CompletionRecord::internal_error(format!("Malformed task: {e}"))
        }
    }
}
