//! Compiler feature detection.

use scadlive_core::features::parse_experimental_features;
use scadlive_core::TaskDescriptor;

use crate::channel::{ExecutionChannel, JobCompletion};

/// Ask the compiler behind `channel` which experimental features it has.
///
/// Runs `--help` through the channel like any other task. A failed or
/// killed run yields an empty list.
pub async fn detect_features(channel: &dyn ExecutionChannel) -> Vec<String> {
    let handle = channel.invoke(TaskDescriptor::new(["--help"]));
    match handle.wait().await {
        JobCompletion::Finished(record) => {
            if let Some(error) = &record.error {
                tracing::warn!(error = %error, "Feature detection failed");
                return Vec::new();
            }
            let help: Vec<String> = record
                .merged_outputs
                .iter()
                .map(|entry| entry.display_text())
                .collect();
            let features = parse_experimental_features(&help.join("\n"));
            tracing::info!(count = features.len(), "Detected experimental features");
            features
        }
        JobCompletion::Terminated => Vec::new(),
    }
}
