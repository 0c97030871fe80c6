//! Sandboxed execution of compiler tasks.
//!
//! The controlling side only ever sees an [`ExecutionChannel`]: hand it a
//! [`TaskDescriptor`](scadlive_core::TaskDescriptor), get a [`JobHandle`]
//! back, then either wait for the completion or kill it.
//!
//! - [`channel`] -- the channel trait, job handles, kill switches, and live
//!   context tracking.
//! - [`process`] -- one worker process per invocation, JSON over stdio.
//! - [`local`] -- runs the sandbox in a tokio task of the current process.
//! - [`sandbox`] -- the worker side: temp dir, inputs, compiler run, outputs.
//! - [`mounts`] -- named library directories linked into the sandbox.
//! - [`features`] -- experimental feature detection via `--help`.

pub mod channel;
pub mod error;
pub mod features;
pub mod local;
pub mod mounts;
pub mod process;
pub mod sandbox;

pub use channel::{ContextTracker, ExecutionChannel, JobCompletion, JobHandle, KillSwitch};
pub use error::{ChannelError, SandboxError};
pub use local::LocalChannel;
pub use mounts::LibraryMounts;
pub use process::ProcessChannel;
pub use sandbox::{execute_task, SandboxConfig};
