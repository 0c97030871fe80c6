#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Malformed session token: {0}")]
    MalformedToken(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a job did not produce a usable result.
///
/// Every variant ends up as user-visible status text; none of them is
/// allowed to escape a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// The job was killed before it completed.
    #[error("Terminated")]
    Terminated,

    /// The task descriptor could not be built from the current state.
    #[error("Failed to prepare job: {0}")]
    Build(String),

    /// The compiler ran but exited with a non-zero code.
    #[error("Compiler exited with code {exit_code}")]
    ExitCode { exit_code: i32 },

    /// The compiler exited cleanly but logged `ERROR:` lines.
    #[error("Compiler reported {count} error(s)")]
    LoggedErrors { count: usize },

    /// None of the expected output files were produced.
    #[error("No output from runner!")]
    NoOutput,

    /// The execution context failed to start or to communicate.
    #[error("{0}")]
    Internal(String),
}

impl From<CoreError> for JobError {
    fn from(err: CoreError) -> Self {
        Self::Build(err.to_string())
    }
}
