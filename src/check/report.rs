//! The check report handed to the resource layer.

use std::fmt;

use serde::Serialize;

use crate::check::model::{TaskKind, WorkflowStatus};
use crate::diagnostic::Diagnostic;

/// Severity of a report line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// The line fails the check.
    Error,
    /// Informational only.
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("ERROR"),
            Self::Info => f.write_str("INFO"),
        }
    }
}

/// One message of a task report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportLine {
    /// Message shown to the user.
    pub message: String,
    /// Line severity.
    pub severity: Severity,
}

impl ReportLine {
    /// An error line.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
        }
    }

    /// An informational line.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Info,
        }
    }

    /// Whether this line fails the check.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Lines produced by one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskReport {
    /// Task kind.
    #[serde(serialize_with = "serialize_kind")]
    pub kind: TaskKind,
    /// Lines, in the order the task reported them.
    pub lines: Vec<ReportLine>,
}

fn serialize_kind<S: serde::Serializer>(kind: &TaskKind, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(kind.typename())
}

impl TaskReport {
    /// Create an empty report for a task.
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            lines: Vec::new(),
        }
    }
}

/// Report of a completed check workflow.
///
/// A report only exists for a workflow that reached a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    /// Terminal workflow status.
    pub status: WorkflowStatus,
    /// Per-task reports, in workflow order.
    pub tasks: Vec<TaskReport>,
}

impl CheckReport {
    /// Whether any line is an error.
    pub fn has_errors(&self) -> bool {
        self.lines().any(|(_, line)| line.is_error())
    }

    /// Every line with the kind of the task that produced it, in order.
    pub fn lines(&self) -> impl Iterator<Item = (TaskKind, &ReportLine)> {
        self.tasks
            .iter()
            .flat_map(|task| task.lines.iter().map(move |line| (task.kind, line)))
    }

    /// Every error line, in order.
    pub fn errors(&self) -> impl Iterator<Item = (TaskKind, &ReportLine)> {
        self.lines().filter(|(_, line)| line.is_error())
    }

    /// Whether the workflow ended in failure (`FAILED` or `BLOCKED`).
    pub fn workflow_failed(&self) -> bool {
        self.status.is_failure()
    }

    /// One diagnostic per line: errors as error diagnostics, informational
    /// lines as warnings.
    pub fn to_diagnostics(&self, summary: &str) -> Vec<Diagnostic> {
        self.lines()
            .map(|(kind, line)| {
                let diagnostic = match line.severity {
                    Severity::Error => Diagnostic::error(summary),
                    Severity::Info => Diagnostic::warning(summary),
                };
                diagnostic.with_detail(format!("[{}] {}", kind, line.message))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticSeverity;

    fn sample_report() -> CheckReport {
        CheckReport {
            status: WorkflowStatus::Failed,
            tasks: vec![
                TaskReport {
                    kind: TaskKind::CompositionCheck,
                    lines: vec![ReportLine::error("field X already exists")],
                },
                TaskReport::new(TaskKind::LintCheck),
                TaskReport {
                    kind: TaskKind::OperationsCheck,
                    lines: vec![
                        ReportLine::info("field added"),
                        ReportLine::error("field removed"),
                    ],
                },
            ],
        }
    }

    #[test]
    fn test_lines_keep_order() {
        let report = sample_report();
        let messages: Vec<_> = report.lines().map(|(_, line)| line.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["field X already exists", "field added", "field removed"]
        );

        let errors: Vec<_> = report.errors().map(|(kind, _)| kind).collect();
        assert_eq!(
            errors,
            vec![TaskKind::CompositionCheck, TaskKind::OperationsCheck]
        );
        assert!(report.has_errors());
        assert!(report.workflow_failed());
    }

    #[test]
    fn test_no_errors() {
        let report = CheckReport {
            status: WorkflowStatus::Passed,
            tasks: vec![TaskReport {
                kind: TaskKind::OperationsCheck,
                lines: vec![ReportLine::info("field added")],
            }],
        };
        assert!(!report.has_errors());
        assert!(!report.workflow_failed());
    }

    #[test]
    fn test_to_diagnostics_one_per_line() {
        let diagnostics = sample_report().to_diagnostics("Failed to validate subgraph schema");
        assert_eq!(diagnostics.len(), 3);
        assert_eq!(diagnostics[0].severity, DiagnosticSeverity::Error);
        assert_eq!(
            diagnostics[0].detail.as_deref(),
            Some("[CompositionCheckTask] field X already exists")
        );
        assert_eq!(diagnostics[1].severity, DiagnosticSeverity::Warning);
    }

    #[test]
    fn test_report_serializes_typenames() {
        let value = serde_json::to_value(sample_report()).unwrap();
        assert_eq!(value["status"], "FAILED");
        assert_eq!(value["tasks"][0]["kind"], "CompositionCheckTask");
        assert_eq!(value["tasks"][0]["lines"][0]["severity"], "ERROR");
    }
}
