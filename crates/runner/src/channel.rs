//! Execution channel contract and job handles.
//!
//! Every [`ExecutionChannel::invoke`] creates one fresh execution context
//! and returns a [`JobHandle`] for it. The handle resolves exactly once,
//! either with the context's [`CompletionRecord`] or with
//! [`JobCompletion::Terminated`] after a kill. In both cases the context is
//! torn down before the completion becomes observable.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use scadlive_core::{CompletionRecord, TaskDescriptor};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Something that can run a task in an isolated, killable context.
///
/// `invoke` must be called from within a tokio runtime.
pub trait ExecutionChannel: Send + Sync {
    /// Start one task in a fresh context.
    fn invoke(&self, task: TaskDescriptor) -> JobHandle;

    /// Number of contexts currently alive.
    fn active_contexts(&self) -> usize;
}

// ---------------------------------------------------------------------------
// Context tracking
// ---------------------------------------------------------------------------

/// Counts live execution contexts.
#[derive(Debug, Clone, Default)]
pub struct ContextTracker {
    live: Arc<AtomicUsize>,
}

impl ContextTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new live context; it stays counted until the guard drops.
    pub fn enter(&self) -> ContextGuard {
        self.live.fetch_add(1, Ordering::SeqCst);
        ContextGuard {
            live: Arc::clone(&self.live),
        }
    }

    pub fn active(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// RAII registration of one live context.
#[derive(Debug)]
pub struct ContextGuard {
    live: Arc<AtomicUsize>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// JobHandle
// ---------------------------------------------------------------------------

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobCompletion {
    Finished(CompletionRecord),
    Terminated,
}

/// Cloneable, idempotent trigger for killing one job.
#[derive(Debug, Clone)]
pub struct KillSwitch {
    token: CancellationToken,
}

impl KillSwitch {
    /// Kill the job. No-op if it already completed or was already killed.
    pub fn kill(&self) {
        self.token.cancel();
    }
}

/// One in-flight invocation.
#[derive(Debug)]
pub struct JobHandle {
    kill_switch: KillSwitch,
    completion: oneshot::Receiver<JobCompletion>,
}

impl JobHandle {
    /// Drive `work` to completion in its own task, registered with `tracker`.
    ///
    /// Killing the handle drops `work` mid-flight, so whatever the future
    /// owns (child processes spawned with `kill_on_drop`, temp directories)
    /// is released before [`wait`](Self::wait) resolves.
    pub fn spawn<F>(tracker: &ContextTracker, work: F) -> Self
    where
        F: Future<Output = CompletionRecord> + Send + 'static,
    {
        let guard = tracker.enter();
        let token = CancellationToken::new();
        let cancel = token.clone();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let completion = tokio::select! {
                biased;
                _ = cancel.cancelled() => JobCompletion::Terminated,
                record = work => JobCompletion::Finished(record),
            };
            drop(guard);
            // The receiver is gone only if nobody cares about the result.
            let _ = tx.send(completion);
        });

        Self {
            kill_switch: KillSwitch { token },
            completion: rx,
        }
    }

    pub fn kill_switch(&self) -> KillSwitch {
        self.kill_switch.clone()
    }

    pub fn kill(&self) {
        self.kill_switch.kill();
    }

    /// Wait for the job to end.
    ///
    /// A job whose task died without reporting is treated as terminated.
    pub async fn wait(self) -> JobCompletion {
        self.completion.await.unwrap_or(JobCompletion::Terminated)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
