//! Task and completion types exchanged with a sandboxed worker.
//!
//! These structs are also the wire format: a [`TaskDescriptor`] is the single
//! message sent to a worker and a [`CompletionRecord`] is the single reply.
//! Field names serialize in camelCase (`outputPaths`, `mergedOutputs`, ...).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::JobError;

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// The class of a job. Each class has its own scheduler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Full render producing a mesh export.
    Render,
    /// Fast parse-only run whose value is the compiler log.
    SyntaxCheck,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Render => "render",
            Self::SyntaxCheck => "syntax-check",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TaskDescriptor
// ---------------------------------------------------------------------------

/// Everything a worker needs to run one compiler invocation.
///
/// Built fresh for every invocation with the `with_*` methods and never
/// mutated afterwards; fields are only readable through accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    #[serde(default)]
    inputs: Vec<(String, String)>,
    args: Vec<String>,
    #[serde(default)]
    output_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auxiliary_mounts: Option<Vec<String>>,
}

impl TaskDescriptor {
    /// Start a descriptor with the compiler argument list.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Add a virtual input file.
    pub fn with_input(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.inputs.push((path.into(), content.into()));
        self
    }

    /// Add a path the worker should read back after the compiler exits.
    pub fn with_output_path(mut self, path: impl Into<String>) -> Self {
        self.output_paths.push(path.into());
        self
    }

    /// Request library mounts by name.
    pub fn with_mounts<I, S>(mut self, mounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mounts: Vec<String> = mounts.into_iter().map(Into::into).collect();
        self.auxiliary_mounts = (!mounts.is_empty()).then_some(mounts);
        self
    }

    pub fn inputs(&self) -> &[(String, String)] {
        &self.inputs
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn output_paths(&self) -> &[String] {
        &self.output_paths
    }

    pub fn auxiliary_mounts(&self) -> &[String] {
        self.auxiliary_mounts.as_deref().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// CompletionRecord
// ---------------------------------------------------------------------------

/// One line of compiler output, tagged by the stream it came from.
///
/// Serializes as `{"stderr": "..."}`, `{"stdout": "..."}` or `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEntry {
    Stderr(String),
    Stdout(String),
    /// An error raised by the execution context itself, not by the compiler.
    Error(String),
}

impl LogEntry {
    /// The line as it should be shown in a log view.
    pub fn display_text(&self) -> String {
        match self {
            Self::Stderr(line) | Self::Stdout(line) => line.clone(),
            Self::Error(error) => format!("EXCEPTION: {error}"),
        }
    }
}

/// The single reply produced for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    /// Output files that existed after the run, as `(path, bytes)`.
    #[serde(default, with = "output_files")]
    pub outputs: Vec<(String, Vec<u8>)>,
    /// Interleaved stdout/stderr lines in arrival order.
    #[serde(default)]
    pub merged_outputs: Vec<LogEntry>,
    pub exit_code: i32,
    /// Set when the execution context itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub elapsed_millis: u64,
}

impl CompletionRecord {
    /// A completion describing a failure of the execution context.
    pub fn internal_error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            outputs: Vec::new(),
            merged_outputs: vec![LogEntry::Error(message.clone())],
            exit_code: -1,
            error: Some(message),
            elapsed_millis: 0,
        }
    }

    /// Number of stderr lines starting with `ERROR:`.
    pub fn logged_error_count(&self) -> usize {
        self.merged_outputs
            .iter()
            .filter(|entry| matches!(entry, LogEntry::Stderr(line) if line.starts_with("ERROR:")))
            .count()
    }

    /// Decide whether the run succeeded.
    ///
    /// Checked in order: context error, non-zero exit, logged errors, and
    /// (when `require_output` is set) at least one output file.
    pub fn check(&self, require_output: bool) -> Result<(), JobError> {
        if let Some(error) = &self.error {
            return Err(JobError::Internal(error.clone()));
        }
        if self.exit_code != 0 {
            return Err(JobError::ExitCode {
                exit_code: self.exit_code,
            });
        }
        let count = self.logged_error_count();
        if count > 0 {
            return Err(JobError::LoggedErrors { count });
        }
        if require_output && self.outputs.is_empty() {
            return Err(JobError::NoOutput);
        }
        Ok(())
    }

    /// File name (last path segment) and content of the first output.
    pub fn primary_output(&self) -> Option<(&str, &[u8])> {
        primary_output(&self.outputs)
    }
}

/// File name (last path segment) and content of the first of `outputs`.
pub fn primary_output(outputs: &[(String, Vec<u8>)]) -> Option<(&str, &[u8])> {
    outputs.first().map(|(path, content)| {
        let name = path.rsplit('/').next().unwrap_or(path);
        (name, content.as_slice())
    })
}

/// Output contents travel as base64 because mesh exports may be binary.
mod output_files {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        files: &[(String, Vec<u8>)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded: Vec<(&str, String)> = files
            .iter()
            .map(|(path, content)| (path.as_str(), STANDARD.encode(content)))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, Vec<u8>)>, D::Error> {
        Vec::<(String, String)>::deserialize(deserializer)?
            .into_iter()
            .map(|(path, content)| {
                STANDARD
                    .decode(content.as_bytes())
                    .map(|bytes| (path, bytes))
                    .map_err(D::Error::custom)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
