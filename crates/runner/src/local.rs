//! In-process execution channel.
//!
//! Runs [`execute_task`] on a tokio task of the current process. The
//! compiler is still its own child process, so killing a job drops the
//! sandbox future, which kills the compiler and removes the working
//! directory.

use std::sync::Arc;

use scadlive_core::TaskDescriptor;

use crate::channel::{ContextTracker, ExecutionChannel, JobHandle};
use crate::sandbox::{execute_task, SandboxConfig};

#[derive(Debug, Clone)]
pub struct LocalChannel {
    config: Arc<SandboxConfig>,
    tracker: ContextTracker,
}

impl LocalChannel {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config: Arc::new(config),
            tracker: ContextTracker::new(),
        }
    }
}

impl ExecutionChannel for LocalChannel {
    fn invoke(&self, task: TaskDescriptor) -> JobHandle {
        let config = Arc::clone(&self.config);
        JobHandle::spawn(&self.tracker, async move { execute_task(&config, &task).await })
    }

    fn active_contexts(&self) -> usize {
        self.tracker.active()
    }
}
