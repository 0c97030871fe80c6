//! `scadlive` -- live preview runner for OpenSCAD models.
//!
//! `scadlive watch <file>` keeps a debounced render and syntax check of a
//! model up to date while parameters and features are edited on stdin.
//! Each job runs in a fresh `scadlive run-task` worker process, which reads
//! one task from stdin and answers with one completion on stdout.
//!
//! # Environment variables
//!
//! | Variable                   | Required | Default    | Description                              |
//! |----------------------------|----------|------------|------------------------------------------|
//! | `SCADLIVE_COMPILER`        | no       | `openscad` | Compiler executable run by workers       |
//! | `SCADLIVE_LIBRARIES`       | no       | --         | Library mounts, `name=/dir,name=/dir`    |
//! | `SCADLIVE_WORKER`          | no       | self       | Worker executable (run with `run-task`)  |
//! | `SCADLIVE_RENDER_DELAY_MS` | no       | `1000`     | Debounce delay before a render           |
//! | `SCADLIVE_SYNTAX_DELAY_MS` | no       | `300`      | Debounce delay before a syntax check     |
//! | `SCADLIVE_OUTPUT_NAME`     | no       | `out.stl`  | Output file name requested from renders  |
//! | `SCADLIVE_SCRATCH_ROOT`    | no       | temp dir   | Where workers create sandboxes           |
//! | `RUST_LOG`                 | no       | `scadlive=info` | Log filter (logs go to stderr)      |

mod console;
mod run_task;
mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use scadlive_runner::{ExecutionChannel, LocalChannel, ProcessChannel, SandboxConfig};
use scadlive_scheduler::SchedulerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "scadlive", version, about = "Live preview runner for OpenSCAD models")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one task read from stdin and print its completion (worker mode).
    RunTask,

    /// Watch a model file and re-run jobs as it changes.
    Watch {
        /// Model source file.
        file: PathBuf,

        /// Write each successful render to this path.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Run jobs inside this process instead of spawning worker processes.
        #[arg(long)]
        in_process: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // stdout carries the worker reply, so logs always go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scadlive=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::RunTask => run_task::run().await,
        Command::Watch {
            file,
            output,
            in_process,
        } => {
            let sandbox = SandboxConfig::from_env()?;
            let mounts: Vec<String> = sandbox.mounts.names().map(str::to_string).collect();
            let config = SchedulerConfig::from_env()?;

            let channel: Arc<dyn ExecutionChannel> = if in_process {
                Arc::new(LocalChannel::new(sandbox))
            } else {
                Arc::new(ProcessChannel::from_env()?)
            };

            tracing::info!(
                render_delay_ms = config.render_delay.as_millis() as u64,
                syntax_delay_ms = config.syntax_delay.as_millis() as u64,
                mounts = ?mounts,
                in_process,
                "Starting scadlive",
            );

            watch::run(
                watch::WatchOptions {
                    file,
                    output,
                    config,
                    mounts,
                },
                channel,
            )
            .await
        }
    }
}
