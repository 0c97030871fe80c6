#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scadlive_core::{CompletionRecord, JobError, JobKind, TaskDescriptor};
use scadlive_events::{JobEvent, JobEventPayload};
use scadlive_runner::{ContextTracker, ExecutionChannel, JobHandle};
use scadlive_scheduler::JobSpec;
use tokio::sync::{broadcast, watch};

/// Run time of a fake job whose first argument has no `<millis>:` prefix.
pub const DEFAULT_RUN_MILLIS: u64 = 10;

/// Execution channel that "runs" a task by sleeping.
///
/// A task whose first argument is `"<millis>:<label>"` sleeps that long and
/// returns `label` as the content of `out.stl`.
#[derive(Default)]
pub struct FakeChannel {
    tracker: ContextTracker,
    invoked: Mutex<Vec<TaskDescriptor>>,
    peak: Arc<AtomicUsize>,
}

impl FakeChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn invocations(&self) -> Vec<TaskDescriptor> {
        self.invoked.lock().expect("lock").clone()
    }

    /// Highest number of simultaneously live contexts seen.
    pub fn peak_contexts(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl ExecutionChannel for FakeChannel {
    fn invoke(&self, task: TaskDescriptor) -> JobHandle {
        self.invoked.lock().expect("lock").push(task.clone());

        let (millis, label) = task
            .args()
            .first()
            .and_then(|arg| arg.split_once(':'))
            .and_then(|(ms, label)| Some((ms.parse().ok()?, label.to_string())))
            .unwrap_or((DEFAULT_RUN_MILLIS, String::new()));

        let handle = JobHandle::spawn(&self.tracker, async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            CompletionRecord {
                outputs: vec![("out.stl".to_string(), label.into_bytes())],
                merged_outputs: Vec::new(),
                exit_code: 0,
                error: None,
                elapsed_millis: millis,
            }
        });
        self.peak.fetch_max(self.tracker.active(), Ordering::SeqCst);
        handle
    }

    fn active_contexts(&self) -> usize {
        self.tracker.active()
    }
}

/// Job spec whose whole task is the current `"<millis>:<label>"` string.
///
/// The string `"invalid"` fails to build.
pub struct FakeSpec {
    kind: JobKind,
    state: watch::Receiver<String>,
}

impl FakeSpec {
    pub fn new(kind: JobKind, initial: &str) -> (Self, watch::Sender<String>) {
        let (tx, rx) = watch::channel(initial.to_string());
        (Self { kind, state: rx }, tx)
    }
}

impl JobSpec for FakeSpec {
    fn kind(&self) -> JobKind {
        self.kind
    }

    fn build(&self) -> Result<TaskDescriptor, JobError> {
        let value = self.state.borrow().clone();
        if value == "invalid" {
            return Err(JobError::Build("invalid state".into()));
        }
        Ok(TaskDescriptor::new([value]).with_output_path("out.stl"))
    }

    fn requires_output(&self) -> bool {
        true
    }
}

pub async fn next_event(rx: &mut broadcast::Receiver<JobEvent>) -> JobEvent {
    rx.recv().await.expect("event bus closed")
}

/// Every event currently buffered.
pub fn drain(rx: &mut broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Label of a completed job's output.
pub fn output_label(event: &JobEvent) -> Option<String> {
    match &event.payload {
        JobEventPayload::Completed(report) => report
            .primary_output()
            .map(|(_, content)| String::from_utf8_lossy(content).into_owned()),
        _ => None,
    }
}
