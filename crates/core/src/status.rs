//! User-visible job status.

use serde::Serialize;

use crate::error::JobError;
use crate::types::{CompletionRecord, JobKind};

/// Status of the most recent job of one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobStatus {
    Running { kind: JobKind },
    Succeeded { elapsed_millis: u64 },
    Failed { message: String, detail: String },
    Terminated,
}

impl JobStatus {
    /// Status for a completion that made it past the stale-result guard.
    pub fn from_completion(record: &CompletionRecord, require_output: bool) -> Self {
        match record.check(require_output) {
            Ok(()) => Self::Succeeded {
                elapsed_millis: record.elapsed_millis,
            },
            Err(err) => {
                let message = err.to_string();
                let log: Vec<String> = record
                    .merged_outputs
                    .iter()
                    .map(|entry| entry.display_text())
                    .collect();
                let detail = if log.is_empty() {
                    message.clone()
                } else {
                    format!("{message}\n\n{}", log.join("\n"))
                };
                Self::Failed { message, detail }
            }
        }
    }

    /// Status for a job that never produced a completion record.
    pub fn from_error(err: &JobError) -> Self {
        match err {
            JobError::Terminated => Self::Terminated,
            other => Self::Failed {
                message: other.to_string(),
                detail: other.to_string(),
            },
        }
    }

    /// Short text for a status bar.
    pub fn label(&self) -> String {
        match self {
            Self::Running {
                kind: JobKind::Render,
            } => "rendering...".to_string(),
            Self::Running {
                kind: JobKind::SyntaxCheck,
            } => "checking syntax...".to_string(),
            Self::Succeeded { elapsed_millis } => format_millis(*elapsed_millis),
            Self::Failed { .. } => "<failed>".to_string(),
            Self::Terminated => "<terminated>".to_string(),
        }
    }

    /// Longer text for a tooltip, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Failed { detail, .. } => Some(detail),
            _ => None,
        }
    }
}

/// Human-readable duration: `"850 ms"` below a second, otherwise tenths of
/// a second rounded down (`"1.2 sec"`).
pub fn format_millis(millis: u64) -> String {
    if millis < 1000 {
        format!("{millis} ms")
    } else {
        format!("{}.{} sec", millis / 1000, (millis % 1000) / 100)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::types::LogEntry;

    #[test]
    fn format_millis_switches_units_at_one_second() {
        assert_eq!(format_millis(0), "0 ms");
        assert_eq!(format_millis(999), "999 ms");
        assert_eq!(format_millis(1000), "1.0 sec");
        assert_eq!(format_millis(1299), "1.2 sec");
        assert_eq!(format_millis(61_950), "61.9 sec");
    }

    #[test]
    fn running_labels_depend_on_kind() {
        assert_eq!(
            JobStatus::Running {
                kind: JobKind::Render
            }
            .label(),
            "rendering..."
        );
        assert_eq!(
            JobStatus::Running {
                kind: JobKind::SyntaxCheck
            }
            .label(),
            "checking syntax..."
        );
    }

    #[test]
    fn successful_completion_reports_elapsed_time() {
        let record = CompletionRecord {
            outputs: vec![("out.stl".into(), b"solid".to_vec())],
            elapsed_millis: 2345,
            ..CompletionRecord::default()
        };
        let status = JobStatus::from_completion(&record, true);
        assert_eq!(status.label(), "2.3 sec");
        assert_eq!(status.detail(), None);
    }

    #[test]
    fn failed_completion_carries_log_in_detail() {
        let record = CompletionRecord {
            merged_outputs: vec![LogEntry::Stderr("ERROR: Recursion detected".into())],
            ..CompletionRecord::default()
        };
        let status = JobStatus::from_completion(&record, true);
        assert_eq!(status.label(), "<failed>");
        assert_matches!(
            status.detail(),
            Some(detail) if detail.ends_with("ERROR: Recursion detected")
        );
    }

    #[test]
    fn terminated_error_is_not_a_failure() {
        assert_eq!(JobStatus::from_error(&JobError::Terminated), JobStatus::Terminated);
        assert_matches!(
            JobStatus::from_error(&JobError::Build("bad".into())),
            JobStatus::Failed { message, .. } if message == "Failed to prepare job: bad"
        );
    }
}
