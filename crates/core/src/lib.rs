//! Pure domain logic for the scadlive job engine.
//!
//! Everything in this crate is synchronous and free of runtime state so it
//! can be shared by the worker process, the scheduler, and tests:
//!
//! - [`types`] -- task descriptors and completion records (also the wire format).
//! - [`error`] -- [`CoreError`] and the job-level [`JobError`].
//! - [`diagnostics`] -- compiler log classification and summaries.
//! - [`session`] -- shareable session state, tokens, and normalization.
//! - [`args`] -- compiler argument lists for render and syntax-check jobs.
//! - [`features`] -- parsing of the compiler's experimental feature list.
//! - [`status`] -- user-visible job status text.

pub mod args;
pub mod diagnostics;
pub mod error;
pub mod features;
pub mod session;
pub mod status;
pub mod types;

pub use error::{CoreError, JobError};
pub use types::{CompletionRecord, JobKind, LogEntry, TaskDescriptor};
