use std::io;

/// Failures while preparing or running a task inside the sandbox.
///
/// None of these escape a channel: they are folded into an internal-error
/// [`CompletionRecord`](scadlive_core::CompletionRecord).
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid input path: {0}")]
    InvalidPath(String),

    #[error("Unknown library mount: {0}")]
    UnknownMount(String),

    #[error("Invalid library mount specification: {0}")]
    InvalidMountSpec(String),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Failures talking to a worker process.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to start worker {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Worker I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to encode task: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Worker exited with code {exit_code} without a reply")]
    NoReply { exit_code: i32 },

    #[error("Malformed worker reply: {0}")]
    MalformedReply(#[source] serde_json::Error),
}
