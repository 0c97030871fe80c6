//! Compiler log classification.
//!
//! The compiler reports problems as free-form stderr lines. Lines starting
//! with `ERROR:` or `WARNING:` are counted, and a small ordered list of
//! [`Rule`]s turns the parser error/warning formats that embed a file and
//! line number into typed [`Diagnostic`]s. Anything unrecognized passes
//! through unchanged.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::types::LogEntry;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A structured problem extracted from one log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: String,
}

/// One classification rule: the first matching rule wins.
struct Rule {
    pattern: Regex,
    extract: fn(&Captures<'_>) -> Diagnostic,
}

fn capture(caps: &Captures<'_>, index: usize) -> Option<String> {
    caps.get(index).map(|m| m.as_str().to_string())
}

fn capture_line(caps: &Captures<'_>, index: usize) -> Option<u32> {
    caps.get(index).and_then(|m| m.as_str().parse().ok())
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        // ERROR: Parser error in file "foo.scad", line 12: syntax error
        Rule {
            pattern: Regex::new(r#"^ERROR: Parser error in file "([^"]+)", line (\d+): (.*)$"#)
                .expect("valid regex"),
            extract: |caps| Diagnostic {
                severity: Severity::Error,
                file: capture(caps, 1),
                line: capture_line(caps, 2),
                message: capture(caps, 3).unwrap_or_default(),
            },
        },
        // ERROR: Parser error: syntax error in file foo.scad, line 12
        Rule {
            pattern: Regex::new(r#"^ERROR: Parser error: (.*?) in file ([^",]+), line (\d+)$"#)
                .expect("valid regex"),
            extract: |caps| Diagnostic {
                severity: Severity::Error,
                file: capture(caps, 2),
                line: capture_line(caps, 3),
                message: capture(caps, 1).unwrap_or_default(),
            },
        },
        // WARNING: Ignoring unknown variable 'x', in file foo.scad, line 3.
        Rule {
            pattern: Regex::new(r"^WARNING: (.*?),? in file ([^,]+), line (\d+)\.?")
                .expect("valid regex"),
            extract: |caps| Diagnostic {
                severity: Severity::Warning,
                file: capture(caps, 2),
                line: capture_line(caps, 3),
                message: capture(caps, 1).unwrap_or_default(),
            },
        },
    ]
});

/// Match a stderr line against the rule list.
pub fn classify_line(line: &str) -> Option<Diagnostic> {
    RULES.iter().find_map(|rule| {
        rule.pattern
            .captures(line)
            .map(|caps| (rule.extract)(&caps))
    })
}

/// Summary of one completion's log, ready for a log view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogSummary {
    /// Every line, verbatim, in arrival order.
    pub lines: Vec<String>,
    /// Lines not recognized as diagnostics, prefixed with a count header
    /// when any errors or warnings were seen.
    pub unmatched: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub error_count: usize,
    pub warning_count: usize,
}

impl LogSummary {
    /// Classify every entry of a completion log.
    pub fn from_entries(entries: &[LogEntry]) -> Self {
        let mut summary = Self::default();

        for entry in entries {
            let text = entry.display_text();
            summary.lines.push(text.clone());

            if let LogEntry::Stderr(line) = entry {
                if line.starts_with("ERROR:") {
                    summary.error_count += 1;
                }
                if line.starts_with("WARNING:") {
                    summary.warning_count += 1;
                }
                if let Some(diagnostic) = classify_line(line) {
                    summary.diagnostics.push(diagnostic);
                    continue;
                }
            }
            summary.unmatched.push(text);
        }

        if summary.error_count > 0 || summary.warning_count > 0 {
            let header = format!(
                "{} errors, {} warnings!",
                summary.error_count, summary.warning_count
            );
            let mut with_header = vec![header, String::new()];
            with_header.append(&mut summary.unmatched);
            summary.unmatched = with_header;
        }

        summary
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_parser_error_is_classified() {
        let d = classify_line(r#"ERROR: Parser error in file "/tmp/input.scad", line 7: syntax error"#)
            .expect("should match");
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.file.as_deref(), Some("/tmp/input.scad"));
        assert_eq!(d.line, Some(7));
        assert_eq!(d.message, "syntax error");
    }

    #[test]
    fn trailing_location_parser_error_is_classified() {
        let d = classify_line("ERROR: Parser error: syntax error in file input.scad, line 12")
            .expect("should match");
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.file.as_deref(), Some("input.scad"));
        assert_eq!(d.line, Some(12));
        assert_eq!(d.message, "syntax error");
    }

    #[test]
    fn warning_with_location_is_classified() {
        let d = classify_line("WARNING: Ignoring unknown variable 'w', in file input.scad, line 3.")
            .expect("should match");
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.file.as_deref(), Some("input.scad"));
        assert_eq!(d.line, Some(3));
        assert_eq!(d.message, "Ignoring unknown variable 'w'");
    }

    #[test]
    fn plain_lines_are_not_classified() {
        assert!(classify_line("Rendering Polygon Mesh using CGAL...").is_none());
        assert!(classify_line("ERROR: Recursion detected").is_none());
    }

    #[test]
    fn summary_counts_and_separates_lines() {
        let entries = vec![
            LogEntry::Stdout("Parsing design".into()),
            LogEntry::Stderr("WARNING: Ignoring unknown variable 'w', in file input.scad, line 3.".into()),
            LogEntry::Stderr("ERROR: Recursion detected".into()),
            LogEntry::Error("worker crashed".into()),
        ];

        let summary = LogSummary::from_entries(&entries);

        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.warning_count, 1);
        assert_eq!(summary.diagnostics.len(), 1);
        assert_eq!(summary.lines.len(), 4);
        assert_eq!(summary.lines[3], "EXCEPTION: worker crashed");
        assert_eq!(
            summary.unmatched,
            vec![
                "1 errors, 1 warnings!".to_string(),
                String::new(),
                "Parsing design".to_string(),
                "ERROR: Recursion detected".to_string(),
                "EXCEPTION: worker crashed".to_string(),
            ]
        );
    }

    #[test]
    fn clean_log_has_no_header() {
        let summary = LogSummary::from_entries(&[LogEntry::Stdout("done".into())]);
        assert_eq!(summary.unmatched, vec!["done".to_string()]);
        assert_eq!(summary.lines, vec!["done".to_string()]);
    }

    #[test]
    fn stdout_lines_are_never_counted() {
        let summary = LogSummary::from_entries(&[LogEntry::Stdout("ERROR: not from stderr".into())]);
        assert_eq!(summary.error_count, 0);
        assert!(summary.diagnostics.is_empty());
    }
}
