//! Process channel tests, with `sh -c` scripts standing in for the worker.

#![cfg(unix)]

use std::time::Duration;

use assert_matches::assert_matches;
use scadlive_core::{LogEntry, TaskDescriptor};
use scadlive_runner::{ExecutionChannel, JobCompletion, ProcessChannel};

fn worker(script: &str) -> ProcessChannel {
    ProcessChannel::new("sh", ["-c", script])
}

fn task() -> TaskDescriptor {
    TaskDescriptor::new(["input.scad", "-o", "out.stl"])
        .with_input("input.scad", "cube(1);")
        .with_output_path("out.stl")
}

async fn finished(channel: &ProcessChannel) -> scadlive_core::CompletionRecord {
    match channel.invoke(task()).wait().await {
        JobCompletion::Finished(record) => record,
        JobCompletion::Terminated => panic!("job terminated unexpectedly"),
    }
}

#[tokio::test]
async fn reply_is_parsed_into_completion() {
    let channel = worker(
        r#"cat > /dev/null; echo '{"outputs":[["out.stl","c29saWQ="]],"mergedOutputs":[{"stdout":"hi"}],"exitCode":0,"elapsedMillis":7}'"#,
    );

    let record = finished(&channel).await;

    assert_eq!(record.outputs, vec![("out.stl".to_string(), b"solid".to_vec())]);
    assert_eq!(record.merged_outputs, vec![LogEntry::Stdout("hi".into())]);
    assert_eq!(record.elapsed_millis, 7);
    assert_eq!(channel.active_contexts(), 0);
}

#[tokio::test]
async fn worker_receives_task_on_stdin() {
    // Echo the task's first argument back inside a well-formed reply.
    let channel = worker(
        r#"arg=$(cat | sed -n 's/.*"args":\["\([^"]*\)".*/\1/p'); printf '{"mergedOutputs":[{"stdout":"%s"}],"exitCode":0}' "$arg""#,
    );

    let record = finished(&channel).await;
    assert_eq!(record.merged_outputs, vec![LogEntry::Stdout("input.scad".into())]);
}

#[tokio::test]
async fn malformed_reply_becomes_internal_error() {
    let channel = worker("cat");
    let record = finished(&channel).await;
    assert_eq!(record.exit_code, -1);
    assert_matches!(record.error, Some(msg) if msg.starts_with("Malformed worker reply"));
}

#[tokio::test]
async fn missing_reply_becomes_internal_error() {
    let channel = worker("cat > /dev/null; exit 4");
    let record = finished(&channel).await;
    assert_eq!(
        record.error.as_deref(),
        Some("Worker exited with code 4 without a reply")
    );
}

#[tokio::test]
async fn spawn_failure_becomes_internal_error() {
    let channel = ProcessChannel::new("/nonexistent/scadlive-worker", ["run-task"]);
    let record = finished(&channel).await;
    assert_matches!(record.error, Some(msg) if msg.starts_with("Failed to start worker"));
    assert_eq!(channel.active_contexts(), 0);
}

#[tokio::test]
async fn kill_terminates_worker_and_releases_context() {
    let channel = worker("sleep 30");
    let handle = channel.invoke(task());
    let switch = handle.kill_switch();
    assert_eq!(channel.active_contexts(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    switch.kill();
    switch.kill();

    let completion = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("kill should resolve promptly");
    assert_eq!(completion, JobCompletion::Terminated);
    assert_eq!(channel.active_contexts(), 0);
}

#[tokio::test]
async fn each_invocation_gets_a_fresh_worker() {
    // The pid printed by each worker must differ.
    let channel = worker(r#"cat > /dev/null; printf '{"mergedOutputs":[{"stdout":"%s"}],"exitCode":0}' "$$""#);
    let first = finished(&channel).await;
    let second = finished(&channel).await;
    assert_ne!(first.merged_outputs, second.merged_outputs);
}

#[tokio::test]
async fn worker_sees_configured_env_and_private_scratch_root() {
    let channel = worker(
        r#"cat > /dev/null; [ -d "$SCADLIVE_SCRATCH_ROOT" ] || exit 9; printf '{"mergedOutputs":[{"stdout":"%s"},{"stdout":"%s"}],"exitCode":0}' "$SCADLIVE_COMPILER" "$SCADLIVE_SCRATCH_ROOT""#,
    )
    .with_env("SCADLIVE_COMPILER", "/opt/openscad");

    let record = finished(&channel).await;

    let lines: Vec<_> = record
        .merged_outputs
        .iter()
        .map(LogEntry::display_text)
        .collect();
    assert_eq!(lines[0], "/opt/openscad");
    assert!(
        !std::path::Path::new(&lines[1]).exists(),
        "scratch root {} should be removed",
        lines[1]
    );
}

/// Whether `pid` names a live (non-zombie) process.
fn process_alive(pid: u32) -> bool {
    let proc_stat = format!("/proc/{pid}/stat");
    if std::path::Path::new("/proc/self/stat").exists() {
        return match std::fs::read_to_string(proc_stat) {
            // The state field follows the parenthesized command name.
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| !rest.trim_start().starts_with('Z')),
            Err(_) => false,
        };
    }
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .is_ok_and(|s| s.success())
}

async fn read_pid(path: &std::path::Path) -> u32 {
    for _ in 0..100 {
        if let Some(pid) = std::fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
        {
            return pid;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{} was never written", path.display());
}

#[tokio::test]
async fn kill_reaches_processes_started_by_the_worker() {
    let dir = tempfile::tempdir().expect("pid dir");
    let pid_file = dir.path().join("grandchild.pid");
    let channel = worker(&format!(
        "cat > /dev/null; sleep 30 & echo $! > '{}'; wait",
        pid_file.display()
    ));

    let handle = channel.invoke(task());
    let grandchild = read_pid(&pid_file).await;
    assert!(process_alive(grandchild));

    handle.kill();
    assert_eq!(handle.wait().await, JobCompletion::Terminated);

    for _ in 0..100 {
        if !process_alive(grandchild) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("process {grandchild} survived the kill");
}
