//! Turns a terminal workflow snapshot into a [`CheckReport`].
//!
//! Classification is pure: the same snapshot always yields the same report.
//! Values the client does not understand (change severities, lint levels,
//! task types) are skipped and logged at warn level.

use tracing::{debug, warn};

use crate::check::model::{
    Change, ChangeSeverity, DownstreamCheckTask, LintDiagnostic, LintLevel, SourceLocation,
    TaskKind, TaskResult, TaskStatus, WorkflowSnapshot,
};
use crate::check::report::{CheckReport, ReportLine, TaskReport};

/// Message for failed tasks that carry no detail of their own.
pub const DASHBOARD_HINT: &str =
    "Task failed for unknown reason, please check the Apollo Studio dashboard for more details";

/// Classify every task of a snapshot.
pub fn extract(snapshot: &WorkflowSnapshot) -> CheckReport {
    let tasks = snapshot
        .tasks
        .iter()
        .filter_map(|task| match task.kind() {
            Some(kind) => Some(classify_task(kind, task)),
            None => {
                debug!(task = ?task, "Skipping unsupported check task");
                None
            }
        })
        .collect();

    CheckReport {
        status: snapshot.status,
        tasks,
    }
}

fn classify_task(kind: TaskKind, task: &TaskResult) -> TaskReport {
    let mut report = TaskReport::new(kind);
    match task {
        TaskResult::CompositionCheck(task) => {
            if let Some(result) = &task.result {
                report.lines.extend(
                    result
                        .errors
                        .iter()
                        .map(|error| ReportLine::error(error.message.clone())),
                );
            }
        }
        TaskResult::OperationsCheck(task) => {
            if let Some(result) = &task.result {
                report
                    .lines
                    .extend(result.changes.iter().filter_map(change_line));
            }
        }
        TaskResult::LintCheck(task) => {
            if let Some(result) = &task.result {
                report
                    .lines
                    .extend(result.diagnostics.iter().filter_map(lint_line));
            }
        }
        TaskResult::DownstreamCheck(task) => {
            if task.status == TaskStatus::Failed {
                report.lines.push(downstream_line(task));
            }
        }
        TaskResult::ProposalsCheck(task) | TaskResult::FilterCheck(task) => {
            if task.status == TaskStatus::Failed {
                report.lines.push(ReportLine::error(DASHBOARD_HINT));
            }
        }
        TaskResult::Unknown { .. } => {}
    }
    report
}

fn change_line(change: &Change) -> Option<ReportLine> {
    let message = format!(
        "{} (severity: {}, code: {}, category: {})",
        change.description, change.severity, change.code, change.category
    );
    match &change.severity {
        ChangeSeverity::Failure => Some(ReportLine::error(message)),
        ChangeSeverity::Notice => Some(ReportLine::info(message)),
        ChangeSeverity::Unrecognized(severity) => {
            warn!(severity = %severity, code = %change.code, "Change severity is not yet supported");
            None
        }
    }
}

fn lint_line(diagnostic: &LintDiagnostic) -> Option<ReportLine> {
    match &diagnostic.level {
        LintLevel::Error => Some(ReportLine::error(lint_message(diagnostic))),
        LintLevel::Warning => Some(ReportLine::info(lint_message(diagnostic))),
        LintLevel::Ignored => None,
        LintLevel::Unrecognized(level) => {
            warn!(level = %level, rule = %diagnostic.rule, "Lint diagnostic level is not yet supported");
            None
        }
    }
}

fn lint_message(diagnostic: &LintDiagnostic) -> String {
    let mut message = format!(
        "{} - {} (level: {}, rule: {})",
        diagnostic.coordinate, diagnostic.message, diagnostic.level, diagnostic.rule
    );
    if !diagnostic.source_locations.is_empty() {
        let locations: Vec<_> = diagnostic
            .source_locations
            .iter()
            .map(format_location)
            .collect();
        message.push(' ');
        message.push_str(&locations.join(", "));
    }
    message
}

fn format_location(location: &SourceLocation) -> String {
    format!(
        "line {}-{} col {}-{}",
        location.start.line, location.end.line, location.start.column, location.end.column
    )
}

fn downstream_line(task: &DownstreamCheckTask) -> ReportLine {
    let failing: Vec<_> = task
        .results
        .iter()
        .filter(|result| result.fails_upstream_workflow.unwrap_or(result.blocking))
        .map(|result| result.downstream_variant_name.as_str())
        .collect();
    if failing.is_empty() {
        ReportLine::error(DASHBOARD_HINT)
    } else {
        ReportLine::error(format!(
            "Downstream check failed for variant(s) {}, please check the Apollo Studio dashboard for more details",
            failing.join(", ")
        ))
    }
}
