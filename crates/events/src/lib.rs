//! Job lifecycle events for scadlive.
//!
//! - [`EventBus`] -- in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`; schedulers publish into it, front ends
//!   subscribe.
//! - [`JobEvent`] -- the event envelope (job id, kind, submission timestamp,
//!   wall-clock time) around a [`JobEventPayload`].
//! - [`JobReport`] -- what a completed job produced.

pub mod bus;

pub use bus::{EventBus, JobEvent, JobEventPayload, JobReport};
