//! What a scheduler runs when it fires.
//!
//! A [`JobSpec`] turns the session state current at firing time into a
//! [`TaskDescriptor`]. Specs read the state through a `watch::Receiver`, so
//! a burst of edits followed by one firing always uses the latest edit.

use scadlive_core::args::{render_args, syntax_check_args, SYNTAX_CHECK_OUTPUT_PATH};
use scadlive_core::session::SessionState;
use scadlive_core::{JobError, JobKind, TaskDescriptor};
use tokio::sync::watch;

pub trait JobSpec: Send + Sync + 'static {
    fn kind(&self) -> JobKind;

    /// Build the task for the current state. Called once per firing.
    fn build(&self) -> Result<TaskDescriptor, JobError>;

    /// Whether a run that produced no output file counts as a failure.
    fn requires_output(&self) -> bool;
}

// ---------------------------------------------------------------------------
// RenderJob
// ---------------------------------------------------------------------------

/// Full render exporting a mesh.
#[derive(Debug, Clone)]
pub struct RenderJob {
    state: watch::Receiver<SessionState>,
    output: String,
    mounts: Vec<String>,
}

impl RenderJob {
    pub fn new(state: watch::Receiver<SessionState>, output: impl Into<String>) -> Self {
        Self {
            state,
            output: output.into(),
            mounts: Vec::new(),
        }
    }

    /// Library mounts requested for every render.
    pub fn with_mounts(mut self, mounts: Vec<String>) -> Self {
        self.mounts = mounts;
        self
    }
}

impl JobSpec for RenderJob {
    fn kind(&self) -> JobKind {
        JobKind::Render
    }

    fn build(&self) -> Result<TaskDescriptor, JobError> {
        let state = self.state.borrow().clone();
        let input = state.source_name();
        let args = render_args(input, &self.output, &state)?;
        Ok(TaskDescriptor::new(args)
            .with_input(input, state.source.content.as_str())
            .with_output_path(self.output.as_str())
            .with_mounts(self.mounts.iter().cloned()))
    }

    fn requires_output(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// SyntaxCheckJob
// ---------------------------------------------------------------------------

/// Parse-only run; its value is the compiler log, the AST is optional.
#[derive(Debug, Clone)]
pub struct SyntaxCheckJob {
    state: watch::Receiver<SessionState>,
    mounts: Vec<String>,
}

impl SyntaxCheckJob {
    pub fn new(state: watch::Receiver<SessionState>) -> Self {
        Self {
            state,
            mounts: Vec::new(),
        }
    }

    pub fn with_mounts(mut self, mounts: Vec<String>) -> Self {
        self.mounts = mounts;
        self
    }
}

impl JobSpec for SyntaxCheckJob {
    fn kind(&self) -> JobKind {
        JobKind::SyntaxCheck
    }

    fn build(&self) -> Result<TaskDescriptor, JobError> {
        let state = self.state.borrow().clone();
        let input = state.source_name();
        let args = syntax_check_args(input, &state)?;
        Ok(TaskDescriptor::new(args)
            .with_input(input, state.source.content.as_str())
            .with_output_path(SYNTAX_CHECK_OUTPUT_PATH)
            .with_mounts(self.mounts.iter().cloned()))
    }

    fn requires_output(&self) -> bool {
        false
    }
}
