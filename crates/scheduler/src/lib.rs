//! Debounced, single-flight job scheduling for scadlive.
//!
//! - [`clock`] -- logical submission timestamps.
//! - [`guard`] -- the stale-result guard shared by all schedulers.
//! - [`job`] -- [`JobSpec`] and the render / syntax-check specs.
//! - [`scheduler`] -- the per-class scheduler actor and its handle.
//! - [`session`] -- change detection and share tokens on top of two schedulers.
//! - [`config`] -- delays and output names from the environment.

pub mod clock;
pub mod config;
pub mod guard;
pub mod job;
pub mod scheduler;
pub mod session;

pub use clock::LogicalClock;
pub use config::{ConfigError, SchedulerConfig};
pub use guard::StaleResultGuard;
pub use job::{JobSpec, RenderJob, SyntaxCheckJob};
pub use scheduler::{JobScheduler, SchedulerContext};
pub use session::SessionController;
