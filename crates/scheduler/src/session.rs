//! Session controller: change detection on top of two schedulers.
//!
//! The controller owns the current [`SessionState`] (published through a
//! `watch` channel the job specs read from) and the last normalized state.
//! A change schedules both job classes only when the normalized state
//! actually differs, so reformatting or editing a comment never triggers a
//! compiler run.

use scadlive_core::session::{self, normalize, NormalizedState, SessionState};
use scadlive_core::CoreError;
use tokio::sync::watch;

use crate::config::SchedulerConfig;
use crate::job::{RenderJob, SyntaxCheckJob};
use crate::scheduler::{JobScheduler, SchedulerContext};

pub struct SessionController {
    state: watch::Sender<SessionState>,
    defaults: SessionState,
    last_normalized: Option<NormalizedState>,
    render: JobScheduler,
    syntax: JobScheduler,
}

impl SessionController {
    /// Start a render and a syntax-check scheduler over `initial`.
    ///
    /// `initial` is also what [`restore`](Self::restore) falls back to.
    /// `mounts` are requested by every job.
    pub fn spawn(
        initial: SessionState,
        config: &SchedulerConfig,
        mounts: Vec<String>,
        ctx: SchedulerContext,
    ) -> Self {
        let (state, rx) = watch::channel(initial.clone());

        let render = JobScheduler::spawn(
            RenderJob::new(rx.clone(), config.output_name.clone()).with_mounts(mounts.clone()),
            config.render_delay,
            ctx.clone(),
        );
        let syntax = JobScheduler::spawn(
            SyntaxCheckJob::new(rx).with_mounts(mounts),
            config.syntax_delay,
            ctx,
        );

        Self {
            state,
            defaults: initial,
            last_normalized: None,
            render,
            syntax,
        }
    }

    /// A copy of the current state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Modify the state, then run change detection.
    pub fn update<F>(&mut self, modify: F, allow_run: bool) -> bool
    where
        F: FnOnce(&mut SessionState),
    {
        self.state.send_modify(modify);
        self.state_changed(allow_run)
    }

    /// Compare the normalized state with the last one seen.
    ///
    /// Returns whether it changed. Both jobs are scheduled (debounced) only
    /// on a change with `allow_run` set.
    pub fn state_changed(&mut self, allow_run: bool) -> bool {
        let normalized = normalize(&self.state.borrow());
        if self.last_normalized.as_ref() == Some(&normalized) {
            tracing::debug!("State unchanged after normalization");
            return false;
        }
        self.last_normalized = Some(normalized);

        if allow_run {
            self.render.schedule(false);
            self.syntax.schedule(false);
        }
        true
    }

    /// Render right away, killing any running render.
    pub fn render_now(&self) {
        self.render.schedule(true);
    }

    /// Kill the running render (the "kill" button).
    pub fn kill(&self) {
        self.render.kill();
    }

    /// Token reproducing the current state.
    pub fn share_token(&self) -> Result<String, CoreError> {
        session::encode(&self.state.borrow())
    }

    /// Replace the state with the one carried by `token`.
    ///
    /// A malformed token is logged and the initial state is used instead.
    /// Returns whether the token decoded.
    pub fn restore(&mut self, token: &str) -> bool {
        let (restored, ok) = match session::read_fragment(token) {
            Some(state) => (state, true),
            None => (self.defaults.clone(), false),
        };
        self.state.send_replace(restored);
        self.state_changed(true);
        ok
    }

    /// Stop both schedulers, killing any running job.
    pub async fn shutdown(&self) {
        tokio::join!(self.render.shutdown(), self.syntax.shutdown());
    }
}
