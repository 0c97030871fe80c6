//! Per-class job scheduler.
//!
//! A [`JobScheduler`] is a cheap handle to an actor task that owns all
//! scheduling state for one job class:
//!
//! ```text
//! Idle --schedule(false)--> Pending --delay elapsed--> Running --completion--> Idle
//!   \------------------schedule(true)------------------^
//! Running --fire--> (kill, await completion) --> Running (new job)
//! ```
//!
//! Every `schedule` call cancels a pending firing. When a firing starts
//! while a job is running, that job is killed and its completion awaited
//! before the next descriptor is built, so at most one job per scheduler is
//! ever in flight. Completions go through the shared
//! [`StaleResultGuard`] before being published as [`JobEvent`]s.

use std::sync::Arc;
use std::time::Duration;

use scadlive_core::JobKind;
use scadlive_events::{EventBus, JobEvent, JobReport};
use scadlive_runner::{ExecutionChannel, JobCompletion, JobHandle, KillSwitch};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::clock::LogicalClock;
use crate::guard::StaleResultGuard;
use crate::job::JobSpec;

/// Collaborators shared by the schedulers of one session.
#[derive(Clone)]
pub struct SchedulerContext {
    pub channel: Arc<dyn ExecutionChannel>,
    pub clock: Arc<LogicalClock>,
    pub guard: Arc<StaleResultGuard>,
    pub events: Arc<EventBus>,
}

impl SchedulerContext {
    /// A context with a fresh clock, guard, and event bus around `channel`.
    pub fn new(channel: Arc<dyn ExecutionChannel>) -> Self {
        Self {
            channel,
            clock: Arc::new(LogicalClock::new()),
            guard: Arc::new(StaleResultGuard::new()),
            events: Arc::new(EventBus::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

enum Command {
    Schedule { immediate: bool },
    Kill,
    Shutdown { done: oneshot::Sender<()> },
}

/// Handle to a running scheduler actor.
#[derive(Debug, Clone)]
pub struct JobScheduler {
    kind: JobKind,
    commands: mpsc::UnboundedSender<Command>,
}

impl JobScheduler {
    /// Spawn the actor for `spec` with the given debounce delay.
    ///
    /// Must be called from within a tokio runtime. The actor stops when
    /// [`shutdown`](Self::shutdown) is called or every handle is dropped.
    pub fn spawn<S: JobSpec>(spec: S, delay: Duration, ctx: SchedulerContext) -> Self {
        let kind = spec.kind();
        let (commands, rx) = mpsc::unbounded_channel();
        let actor = SchedulerActor {
            spec,
            kind,
            delay,
            ctx,
            commands: rx,
            pending: None,
            running: None,
        };
        tokio::spawn(actor.run());
        Self { kind, commands }
    }

    /// Request a run. `immediate` skips the debounce delay.
    pub fn schedule(&self, immediate: bool) {
        self.send(Command::Schedule { immediate });
    }

    /// Kill the running job, if any. A pending firing is left alone.
    pub fn kill(&self) {
        self.send(Command::Kill);
    }

    /// Kill the running job, wait for it, and stop the actor.
    pub async fn shutdown(&self) {
        let (done, wait) = oneshot::channel();
        self.send(Command::Shutdown { done });
        // An error means the actor is already gone.
        let _ = wait.await;
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!(kind = %self.kind, "Scheduler already stopped");
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct RunningJob {
    job_id: Uuid,
    submitted_at: u64,
    kill_switch: KillSwitch,
    /// Resolves once the completion has gone through the guard.
    settled: JoinHandle<()>,
}

enum Event {
    Command(Option<Command>),
    DelayElapsed,
    Settled,
}

struct SchedulerActor<S> {
    spec: S,
    kind: JobKind,
    delay: Duration,
    ctx: SchedulerContext,
    commands: mpsc::UnboundedReceiver<Command>,
    pending: Option<Instant>,
    running: Option<RunningJob>,
}

impl<S: JobSpec> SchedulerActor<S> {
    async fn run(mut self) {
        tracing::debug!(kind = %self.kind, delay_ms = self.delay.as_millis() as u64, "Scheduler started");

        loop {
            let event = tokio::select! {
                command = self.commands.recv() => Event::Command(command),
                _ = wait_deadline(self.pending) => Event::DelayElapsed,
                _ = wait_settled(&mut self.running) => Event::Settled,
            };

            match event {
                Event::Command(Some(Command::Schedule { immediate: true })) => {
                    self.pending = None;
                    self.fire().await;
                }
                Event::Command(Some(Command::Schedule { immediate: false })) => {
                    tracing::debug!(kind = %self.kind, "Debouncing job");
                    self.pending = Some(Instant::now() + self.delay);
                }
                Event::Command(Some(Command::Kill)) => {
                    if let Some(running) = &self.running {
                        tracing::info!(kind = %self.kind, job_id = %running.job_id, "Killing job on request");
                        running.kill_switch.kill();
                    }
                }
                Event::Command(Some(Command::Shutdown { done })) => {
                    self.stop().await;
                    let _ = done.send(());
                    break;
                }
                Event::Command(None) => {
                    self.stop().await;
                    break;
                }
                Event::DelayElapsed => {
                    self.pending = None;
                    self.fire().await;
                }
                Event::Settled => {
                    self.running = None;
                }
            }
        }

        tracing::info!(kind = %self.kind, "Scheduler stopped");
    }

    /// Start a new job, killing and awaiting the running one first.
    async fn fire(&mut self) {
        self.kill_and_wait().await;

        let submitted_at = self.ctx.clock.tick();
        let job_id = Uuid::new_v4();

        let task = match self.spec.build() {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(kind = %self.kind, %job_id, error = %e, "Failed to build job");
                self.ctx
                    .events
                    .publish(JobEvent::build_failed(self.kind, job_id, submitted_at, e.to_string()));
                return;
            }
        };

        tracing::info!(kind = %self.kind, %job_id, submitted_at, "Job started");
        self.ctx
            .events
            .publish(JobEvent::started(self.kind, job_id, submitted_at));

        let handle = self.ctx.channel.invoke(task);
        let kill_switch = handle.kill_switch();
        let settled = tokio::spawn(settle(
            handle,
            self.kind,
            job_id,
            submitted_at,
            self.spec.requires_output(),
            Arc::clone(&self.ctx.guard),
            Arc::clone(&self.ctx.events),
        ));

        self.running = Some(RunningJob {
            job_id,
            submitted_at,
            kill_switch,
            settled,
        });
    }

    async fn kill_and_wait(&mut self) {
        if let Some(running) = self.running.take() {
            tracing::debug!(
                kind = %self.kind,
                job_id = %running.job_id,
                submitted_at = running.submitted_at,
                "Cancelling running job"
            );
            running.kill_switch.kill();
            if let Err(e) = running.settled.await {
                tracing::error!(kind = %self.kind, error = %e, "Completion task failed");
            }
        }
    }

    async fn stop(&mut self) {
        self.pending = None;
        self.kill_and_wait().await;
    }
}

/// Wait for a job to end and publish its outcome through the guard.
async fn settle(
    handle: JobHandle,
    kind: JobKind,
    job_id: Uuid,
    submitted_at: u64,
    requires_output: bool,
    guard: Arc<StaleResultGuard>,
    events: Arc<EventBus>,
) {
    let report = match handle.wait().await {
        JobCompletion::Finished(record) => JobReport::from_completion(record, requires_output),
        JobCompletion::Terminated => JobReport::terminated(),
    };
    let label = report.status.label();

    let applied = guard.try_apply(submitted_at, || {
        events.publish(JobEvent::completed(kind, job_id, submitted_at, report));
    });

    if applied {
        tracing::info!(%kind, %job_id, submitted_at, status = %label, "Job finished");
    } else {
        tracing::debug!(%kind, %job_id, submitted_at, status = %label, "Discarded stale completion");
        events.publish(JobEvent::discarded(kind, job_id, submitted_at));
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn wait_settled(running: &mut Option<RunningJob>) {
    match running {
        Some(job) => {
            let _ = (&mut job.settled).await;
        }
        None => std::future::pending().await,
    }
}
