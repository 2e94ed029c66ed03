//! Check workflow model: the submitted request, the workflow handle and the
//! snapshots returned while polling.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Rejection, RegistryError};
use crate::types::GraphRef;

/// Git metadata attached to a check, shown on the registry dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitContext {
    /// Branch name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Commit SHA.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Commit author.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committer: Option<String>,
    /// Commit message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Remote repository URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

/// Which historical traffic the operations check compares against.
///
/// An empty value lets the registry apply the variant's configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricParameters {
    /// Start of the window, as seconds relative to now (e.g. `-86400`) or an
    /// RFC 3339 timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// End of the window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Minimum request count for an operation to be considered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_count_threshold: Option<u32>,
    /// Minimum share of total traffic, in percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_count_threshold_percentage: Option<f64>,
    /// Variants whose traffic is included.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub included_variants: Option<Vec<String>>,
}

/// A subgraph schema check to submit. Serializes to the registry's
/// `SubgraphCheckAsyncInput`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    #[serde(serialize_with = "serialize_graph_ref")]
    graph_ref: GraphRef,
    subgraph_name: String,
    proposed_schema: String,
    is_sandbox: bool,
    git_context: GitContext,
    #[serde(rename = "config")]
    historic_parameters: HistoricParameters,
}

fn serialize_graph_ref<S: serde::Serializer>(
    graph_ref: &GraphRef,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(graph_ref)
}

impl CheckRequest {
    /// Create a non-sandbox check with no git context and default traffic
    /// parameters.
    pub fn new(
        graph_ref: GraphRef,
        subgraph_name: impl Into<String>,
        proposed_schema: impl Into<String>,
    ) -> Self {
        Self {
            graph_ref,
            subgraph_name: subgraph_name.into(),
            proposed_schema: proposed_schema.into(),
            is_sandbox: false,
            git_context: GitContext::default(),
            historic_parameters: HistoricParameters::default(),
        }
    }

    /// Mark the check as a sandbox check.
    pub fn sandbox(mut self, is_sandbox: bool) -> Self {
        self.is_sandbox = is_sandbox;
        self
    }

    /// Attach git metadata.
    pub fn with_git_context(mut self, git_context: GitContext) -> Self {
        self.git_context = git_context;
        self
    }

    /// Set the historic traffic parameters.
    pub fn with_historic_parameters(mut self, parameters: HistoricParameters) -> Self {
        self.historic_parameters = parameters;
        self
    }

    /// The variant being checked.
    pub fn graph_ref(&self) -> &GraphRef {
        &self.graph_ref
    }

    /// The subgraph being checked.
    pub fn subgraph_name(&self) -> &str {
        &self.subgraph_name
    }

    /// The proposed SDL.
    pub fn proposed_schema(&self) -> &str {
        &self.proposed_schema
    }

    /// Whether this is a sandbox check.
    pub fn is_sandbox(&self) -> bool {
        self.is_sandbox
    }

    /// Git metadata.
    pub fn git_context(&self) -> &GitContext {
        &self.git_context
    }

    /// Historic traffic parameters.
    pub fn historic_parameters(&self) -> &HistoricParameters {
        &self.historic_parameters
    }
}

/// Handle on a submitted check workflow, used as the polling key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowHandle {
    graph_id: String,
    workflow_id: String,
    target_url: Option<String>,
}

impl WorkflowHandle {
    /// Create a handle for a workflow of the given graph.
    pub fn new(graph_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            graph_id: graph_id.into(),
            workflow_id: workflow_id.into(),
            target_url: None,
        }
    }

    /// Attach the dashboard URL of the check.
    pub fn with_target_url(mut self, target_url: impl Into<String>) -> Self {
        self.target_url = Some(target_url.into());
        self
    }

    /// The graph owning the workflow.
    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    /// The workflow id.
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// The dashboard URL, if the registry returned one.
    pub fn target_url(&self) -> Option<&str> {
        self.target_url.as_deref()
    }
}

impl fmt::Display for WorkflowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.workflow_id)
    }
}

/// Result of a check submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The check was accepted and is running.
    Accepted(WorkflowHandle),
    /// The check was refused.
    Rejected(Rejection),
}

impl SubmitOutcome {
    /// Turn a rejection into a [`RegistryError::Rejected`].
    pub fn into_handle(self) -> Result<WorkflowHandle, RegistryError> {
        match self {
            Self::Accepted(handle) => Ok(handle),
            Self::Rejected(rejection) => Err(RegistryError::Rejected(rejection)),
        }
    }
}

/// Status of a check workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    /// Tasks are still running.
    Pending,
    /// Every task passed.
    Passed,
    /// At least one task failed.
    Failed,
    /// The workflow is held by an upstream gate.
    Blocked,
    /// A status this client does not know.
    #[serde(other)]
    Unrecognized,
}

impl WorkflowStatus {
    /// Whether the poll loop should stop on this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Blocked)
    }

    /// Whether the status is reported upstream as a failure. `Blocked`
    /// counts as a failure.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Blocked)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Blocked => "BLOCKED",
            Self::Unrecognized => "UNRECOGNIZED",
        })
    }
}

/// Status of a single task in a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Still running.
    Pending,
    /// Passed.
    Passed,
    /// Failed.
    Failed,
    /// Held by an upstream gate.
    Blocked,
    /// A status this client does not know.
    #[serde(other)]
    Unrecognized,
}

/// Severity of a schema change found by the operations check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChangeSeverity {
    /// The change breaks operations seen in traffic.
    Failure,
    /// The change is safe.
    Notice,
    /// Any other value sent by the registry.
    Unrecognized(String),
}

impl From<String> for ChangeSeverity {
    fn from(value: String) -> Self {
        match value.as_str() {
            "FAILURE" => Self::Failure,
            "NOTICE" => Self::Notice,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<ChangeSeverity> for String {
    fn from(value: ChangeSeverity) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ChangeSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failure => f.write_str("FAILURE"),
            Self::Notice => f.write_str("NOTICE"),
            Self::Unrecognized(other) => f.write_str(other),
        }
    }
}

/// Level of a lint diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LintLevel {
    /// Violations that fail the check.
    Error,
    /// Violations reported without failing the check.
    Warning,
    /// Violations of rules turned off for the graph.
    Ignored,
    /// Any other value sent by the registry.
    Unrecognized(String),
}

impl From<String> for LintLevel {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ERROR" => Self::Error,
            "WARNING" => Self::Warning,
            "IGNORED" => Self::Ignored,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<LintLevel> for String {
    fn from(value: LintLevel) -> Self {
        value.to_string()
    }
}

impl fmt::Display for LintLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("ERROR"),
            Self::Warning => f.write_str("WARNING"),
            Self::Ignored => f.write_str("IGNORED"),
            Self::Unrecognized(other) => f.write_str(other),
        }
    }
}

/// A schema change found by the operations check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Machine-readable change code, e.g. `FIELD_REMOVED`.
    pub code: String,
    /// Human-readable description.
    pub description: String,
    /// How bad the change is.
    pub severity: ChangeSeverity,
    /// `ADDITION`, `REMOVAL`, `EDIT` or `DEPRECATION`.
    pub category: String,
}

/// Payload of an operations check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationsCheckResult {
    /// Changes between the proposed and the published schema.
    #[serde(default)]
    pub changes: Vec<Change>,
    /// Operations broken by the changes.
    #[serde(default)]
    pub number_of_affected_operations: u32,
    /// Operations checked against.
    #[serde(default)]
    pub number_of_checked_operations: u32,
}

/// A line/column position in an SDL document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
    /// Byte offset, when the registry sends one.
    #[serde(default)]
    pub byte_offset: Option<u32>,
}

/// A composition error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionError {
    /// Error code, when the composer sends one.
    #[serde(default)]
    pub code: Option<String>,
    /// Error message.
    pub message: String,
    /// Where the error occurred.
    #[serde(default)]
    pub locations: Vec<Position>,
}

/// Payload of a composition check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionResult {
    /// Errors raised while composing the supergraph.
    #[serde(default)]
    pub errors: Vec<CompositionError>,
}

/// A span in a subgraph SDL document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    /// Subgraph the span belongs to.
    #[serde(default)]
    pub subgraph_name: Option<String>,
    /// Start of the span.
    pub start: Position,
    /// End of the span.
    pub end: Position,
}

/// A lint rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintDiagnostic {
    /// Schema coordinate, e.g. `Query.products`.
    pub coordinate: String,
    /// Human-readable message.
    pub message: String,
    /// Level of the violation.
    pub level: LintLevel,
    /// Rule name.
    pub rule: String,
    /// Spans of the violation.
    #[serde(default)]
    pub source_locations: Vec<SourceLocation>,
}

/// Counts of lint violations by level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintStats {
    /// Violations at `ERROR`.
    #[serde(default)]
    pub errors_count: u32,
    /// Violations at `WARNING`.
    #[serde(default)]
    pub warnings_count: u32,
    /// Violations at `IGNORED`.
    #[serde(default)]
    pub ignored_count: u32,
    /// All violations.
    #[serde(default)]
    pub total_count: u32,
}

/// Payload of a lint check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintResult {
    /// Rule violations.
    #[serde(default)]
    pub diagnostics: Vec<LintDiagnostic>,
    /// Violation counts.
    #[serde(default)]
    pub stats: LintStats,
}

/// Outcome of a downstream (contract) variant check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownstreamCheckResult {
    /// Downstream variant name.
    pub downstream_variant_name: String,
    /// Whether the downstream check blocks the upstream workflow.
    #[serde(default)]
    pub blocking: bool,
    /// Whether this result fails the upstream workflow.
    #[serde(default)]
    pub fails_upstream_workflow: Option<bool>,
}

/// Operations check task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationsCheckTask {
    /// Task status.
    pub status: TaskStatus,
    /// Result, absent while the task runs.
    #[serde(default)]
    pub result: Option<OperationsCheckResult>,
}

/// Composition check task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionCheckTask {
    /// Task status.
    pub status: TaskStatus,
    /// Result, absent while the task runs.
    #[serde(default)]
    pub result: Option<CompositionResult>,
}

/// Lint check task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintCheckTask {
    /// Task status.
    pub status: TaskStatus,
    /// Result, absent while the task runs.
    #[serde(default)]
    pub result: Option<LintResult>,
}

/// Downstream variants check task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownstreamCheckTask {
    /// Task status.
    pub status: TaskStatus,
    /// Per-variant results.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub results: Vec<DownstreamCheckResult>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A task that only reports a status (proposals, filter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusOnlyTask {
    /// Task status.
    pub status: TaskStatus,
}

/// Kind of a check task, keyed by its GraphQL type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// `OperationsCheckTask`.
    OperationsCheck,
    /// `CompositionCheckTask`.
    CompositionCheck,
    /// `LintCheckTask`.
    LintCheck,
    /// `DownstreamCheckTask`.
    DownstreamCheck,
    /// `ProposalsCheckTask`.
    ProposalsCheck,
    /// `FilterCheckTask`.
    FilterCheck,
}

impl TaskKind {
    /// Every kind this client decodes.
    pub const ALL: [TaskKind; 6] = [
        TaskKind::OperationsCheck,
        TaskKind::CompositionCheck,
        TaskKind::LintCheck,
        TaskKind::DownstreamCheck,
        TaskKind::ProposalsCheck,
        TaskKind::FilterCheck,
    ];

    /// GraphQL type name of the task.
    pub fn typename(self) -> &'static str {
        match self {
            Self::OperationsCheck => "OperationsCheckTask",
            Self::CompositionCheck => "CompositionCheckTask",
            Self::LintCheck => "LintCheckTask",
            Self::DownstreamCheck => "DownstreamCheckTask",
            Self::ProposalsCheck => "ProposalsCheckTask",
            Self::FilterCheck => "FilterCheckTask",
        }
    }

    /// Look up a kind by GraphQL type name.
    pub fn from_typename(typename: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.typename() == typename)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.typename())
    }
}

/// One task of a check workflow, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    /// Operations (traffic) check.
    OperationsCheck(OperationsCheckTask),
    /// Supergraph composition check.
    CompositionCheck(CompositionCheckTask),
    /// Schema lint check.
    LintCheck(LintCheckTask),
    /// Downstream (contract) variants check.
    DownstreamCheck(DownstreamCheckTask),
    /// Schema proposals check.
    ProposalsCheck(StatusOnlyTask),
    /// Contract filter check.
    FilterCheck(StatusOnlyTask),
    /// A task type added by the registry after this client was written.
    Unknown {
        /// GraphQL type name.
        typename: String,
        /// Task status.
        status: TaskStatus,
    },
}

impl TaskResult {
    /// Decode a task from its GraphQL representation, discriminated by the
    /// `__typename` field.
    pub fn from_value(value: Value) -> Result<Self, RegistryError> {
        let typename = value
            .get("__typename")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RegistryError::UnexpectedResponse("check task without __typename".to_string())
            })?
            .to_string();

        let task = match TaskKind::from_typename(&typename) {
            Some(TaskKind::OperationsCheck) => {
                Self::OperationsCheck(serde_json::from_value(value)?)
            }
            Some(TaskKind::CompositionCheck) => {
                Self::CompositionCheck(serde_json::from_value(value)?)
            }
            Some(TaskKind::LintCheck) => Self::LintCheck(serde_json::from_value(value)?),
            Some(TaskKind::DownstreamCheck) => {
                Self::DownstreamCheck(serde_json::from_value(value)?)
            }
            Some(TaskKind::ProposalsCheck) => Self::ProposalsCheck(serde_json::from_value(value)?),
            Some(TaskKind::FilterCheck) => Self::FilterCheck(serde_json::from_value(value)?),
            None => {
                let status = match value.get("status").filter(|status| !status.is_null()) {
                    Some(status) => serde_json::from_value(status.clone())?,
                    None => TaskStatus::Unrecognized,
                };
                Self::Unknown { typename, status }
            }
        };
        Ok(task)
    }

    /// The task kind, or `None` for unknown task types.
    pub fn kind(&self) -> Option<TaskKind> {
        match self {
            Self::OperationsCheck(_) => Some(TaskKind::OperationsCheck),
            Self::CompositionCheck(_) => Some(TaskKind::CompositionCheck),
            Self::LintCheck(_) => Some(TaskKind::LintCheck),
            Self::DownstreamCheck(_) => Some(TaskKind::DownstreamCheck),
            Self::ProposalsCheck(_) => Some(TaskKind::ProposalsCheck),
            Self::FilterCheck(_) => Some(TaskKind::FilterCheck),
            Self::Unknown { .. } => None,
        }
    }

    /// The task's own status.
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::OperationsCheck(task) => task.status,
            Self::CompositionCheck(task) => task.status,
            Self::LintCheck(task) => task.status,
            Self::DownstreamCheck(task) => task.status,
            Self::ProposalsCheck(task) | Self::FilterCheck(task) => task.status,
            Self::Unknown { status, .. } => *status,
        }
    }
}

/// The state of a check workflow at one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSnapshot {
    /// Workflow status.
    pub status: WorkflowStatus,
    /// Tasks, in the order the registry returned them.
    pub tasks: Vec<TaskResult>,
}

impl WorkflowSnapshot {
    /// Create a snapshot.
    pub fn new(status: WorkflowStatus, tasks: Vec<TaskResult>) -> Self {
        Self { status, tasks }
    }

    /// A pending snapshot with no tasks.
    pub fn pending() -> Self {
        Self::new(WorkflowStatus::Pending, Vec::new())
    }
}
