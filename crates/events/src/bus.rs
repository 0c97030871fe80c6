//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the output sink injected into every scheduler. It is
//! designed to be shared via `Arc<EventBus>`.

use chrono::{DateTime, Utc};
use scadlive_core::diagnostics::LogSummary;
use scadlive_core::error::JobError;
use scadlive_core::status::JobStatus;
use scadlive_core::types::{self, CompletionRecord, JobKind};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// JobReport
// ---------------------------------------------------------------------------

/// Result of a job whose completion was applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub status: JobStatus,
    pub log: LogSummary,
    /// Output files as `(path, bytes)`; binary content is not serialized.
    #[serde(skip)]
    pub outputs: Vec<(String, Vec<u8>)>,
}

impl JobReport {
    /// Build a report from a worker completion.
    pub fn from_completion(record: CompletionRecord, require_output: bool) -> Self {
        Self {
            status: JobStatus::from_completion(&record, require_output),
            log: LogSummary::from_entries(&record.merged_outputs),
            outputs: record.outputs,
        }
    }

    /// Report for a job that was killed before it completed.
    pub fn terminated() -> Self {
        Self {
            status: JobStatus::from_error(&JobError::Terminated),
            log: LogSummary::default(),
            outputs: Vec::new(),
        }
    }

    /// File name and content of the first output, if any.
    pub fn primary_output(&self) -> Option<(&str, &[u8])> {
        types::primary_output(&self.outputs)
    }
}

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// What happened to a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEventPayload {
    /// The job was handed to an execution channel.
    Started,
    /// The job's completion passed the stale-result guard.
    Completed(JobReport),
    /// The job's completion was older than one already applied and was dropped.
    Discarded,
    /// The task descriptor could not be built; nothing was executed.
    BuildFailed { message: String },
}

/// A job lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEvent {
    pub job_id: Uuid,
    pub kind: JobKind,
    /// Logical submission timestamp issued when the job fired.
    pub submitted_at: u64,
    #[serde(flatten)]
    pub payload: JobEventPayload,
    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(kind: JobKind, job_id: Uuid, submitted_at: u64, payload: JobEventPayload) -> Self {
        Self {
            job_id,
            kind,
            submitted_at,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn started(kind: JobKind, job_id: Uuid, submitted_at: u64) -> Self {
        Self::new(kind, job_id, submitted_at, JobEventPayload::Started)
    }

    pub fn completed(kind: JobKind, job_id: Uuid, submitted_at: u64, report: JobReport) -> Self {
        Self::new(kind, job_id, submitted_at, JobEventPayload::Completed(report))
    }

    pub fn discarded(kind: JobKind, job_id: Uuid, submitted_at: u64) -> Self {
        Self::new(kind, job_id, submitted_at, JobEventPayload::Discarded)
    }

    pub fn build_failed(
        kind: JobKind,
        job_id: Uuid,
        submitted_at: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            kind,
            job_id,
            submitted_at,
            JobEventPayload::BuildFailed {
                message: message.into(),
            },
        )
    }

    /// The status this event implies for its job class.
    ///
    /// `None` for discarded completions: the job is no longer running but
    /// its result must not replace what is displayed.
    pub fn status(&self) -> Option<JobStatus> {
        match &self.payload {
            JobEventPayload::Started => Some(JobStatus::Running { kind: self.kind }),
            JobEventPayload::Completed(report) => Some(report.status.clone()),
            JobEventPayload::Discarded => None,
            JobEventPayload::BuildFailed { message } => Some(JobStatus::Failed {
                message: message.clone(),
                detail: message.clone(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`JobEvent`].
///
/// # Usage
///
/// ```rust
/// use scadlive_core::JobKind;
/// use scadlive_events::bus::{EventBus, JobEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(JobEvent::started(JobKind::Render, uuid::Uuid::new_v4(), 1));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: JobEvent) {
        tracing::trace!(
            job_id = %event.job_id,
            kind = %event.kind,
            submitted_at = event.submitted_at,
            "Publishing job event"
        );
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
