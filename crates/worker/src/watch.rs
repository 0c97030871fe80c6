//! `scadlive watch`: a headless live session.
//!
//! Loads a model file, renders it, and then reacts to line commands on
//! stdin (see [`console`](crate::console)). Job events are printed to
//! stdout as they arrive; a successful render can be written to a file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use scadlive_core::diagnostics::Severity;
use scadlive_core::session::SessionState;
use scadlive_core::status::JobStatus;
use scadlive_core::JobKind;
use scadlive_events::{JobEvent, JobEventPayload};
use scadlive_runner::features::detect_features;
use scadlive_runner::ExecutionChannel;
use scadlive_scheduler::{SchedulerConfig, SchedulerContext, SessionController};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use crate::console::{parse_command, ConsoleCommand, HELP};

pub struct WatchOptions {
    pub file: PathBuf,
    /// Where to write the mesh of each successful render.
    pub output: Option<PathBuf>,
    pub config: SchedulerConfig,
    /// Library mounts requested by every job.
    pub mounts: Vec<String>,
}

pub async fn run(options: WatchOptions, channel: Arc<dyn ExecutionChannel>) -> anyhow::Result<()> {
    let mut initial = SessionState::default_with_source(read_source(&options.file).await?);
    if let Some(name) = options.file.file_name().and_then(|n| n.to_str()) {
        initial.source.name = name.to_string();
    }

    let ctx = SchedulerContext::new(Arc::clone(&channel));
    let events = ctx.events.subscribe();
    let printer = tokio::spawn(print_events(events, options.output.clone()));

    let mut controller = SessionController::spawn(initial, &options.config, options.mounts, ctx);
    controller.state_changed(true);

    tracing::info!(file = %options.file.display(), "Watching");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("error: {e}");
                continue;
            }
        };

        match command {
            ConsoleCommand::Set { name, value } => {
                controller.update(
                    |s| {
                        s.parameters.insert(name, value);
                    },
                    true,
                );
            }
            ConsoleCommand::Unset(name) => {
                controller.update(
                    |s| {
                        s.parameters.remove(&name);
                    },
                    true,
                );
            }
            ConsoleCommand::Enable(feature) => {
                controller.update(|s| s.set_feature(&feature, true), true);
            }
            ConsoleCommand::Disable(feature) => {
                controller.update(|s| s.set_feature(&feature, false), true);
            }
            ConsoleCommand::Reload => match read_source(&options.file).await {
                Ok(content) => {
                    if !controller.update(|s| s.source.content = content, true) {
                        println!("no changes");
                    }
                }
                Err(e) => println!("error: {e:#}"),
            },
            ConsoleCommand::Run => controller.render_now(),
            ConsoleCommand::Kill => controller.kill(),
            ConsoleCommand::Share => match controller.share_token() {
                Ok(token) => println!("#{token}"),
                Err(e) => println!("error: {e}"),
            },
            ConsoleCommand::Load(token) => {
                if !controller.restore(&token) {
                    println!("error: malformed token, restored the initial state");
                }
            }
            ConsoleCommand::Features => {
                let features = detect_features(channel.as_ref()).await;
                if features.is_empty() {
                    println!("no experimental features reported");
                } else {
                    println!("{}", features.join(" "));
                }
            }
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => break,
        }
    }

    controller.shutdown().await;
    drop(controller);
    // The bus closes once the schedulers are gone, which ends the printer.
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Event printer failed");
    }
    Ok(())
}

async fn read_source(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn print_events(
    mut events: tokio::sync::broadcast::Receiver<JobEvent>,
    output: Option<PathBuf>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                for line in describe(&event) {
                    println!("{line}");
                }
                if let (Some(path), JobEventPayload::Completed(report)) = (&output, &event.payload) {
                    if event.kind == JobKind::Render
                        && matches!(report.status, JobStatus::Succeeded { .. })
                    {
                        if let Some((_, content)) = report.primary_output() {
                            match tokio::fs::write(path, content).await {
                                Ok(()) => println!("[render] wrote {}", path.display()),
                                Err(e) => {
                                    tracing::error!(path = %path.display(), error = %e, "Failed to write output")
                                }
                            }
                        }
                    }
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event printer lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Console lines for one event.
pub fn describe(event: &JobEvent) -> Vec<String> {
    let tag = match event.kind {
        JobKind::Render => "render",
        JobKind::SyntaxCheck => "syntax",
    };

    match &event.payload {
        JobEventPayload::Started => vec![format!("[{tag}] {}", status_label(event))],
        JobEventPayload::Discarded => vec![format!("[{tag}] stale result discarded")],
        JobEventPayload::BuildFailed { message } => vec![format!("[{tag}] <failed> {message}")],
        JobEventPayload::Completed(report) => {
            let mut lines = vec![format!("[{tag}] {}", report.status.label())];
            if let Some(detail) = report.status.detail() {
                lines.extend(detail.lines().map(|l| format!("[{tag}]   {l}")));
                return lines;
            }
            if report.log.error_count > 0 || report.log.warning_count > 0 {
                lines.push(format!(
                    "[{tag}] {} errors, {} warnings",
                    report.log.error_count, report.log.warning_count
                ));
            }
            for diagnostic in &report.log.diagnostics {
                let severity = match diagnostic.severity {
                    Severity::Error => "error",
                    Severity::Warning => "warning",
                };
                let location = match (&diagnostic.file, diagnostic.line) {
                    (Some(file), Some(line)) => format!("{file}:{line}: "),
                    _ => String::new(),
                };
                lines.push(format!("[{tag}]   {location}{severity}: {}", diagnostic.message));
            }
            lines
        }
    }
}

fn status_label(event: &JobEvent) -> String {
    event
        .status()
        .map(|status| status.label())
        .unwrap_or_default()
}
