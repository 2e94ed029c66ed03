//! Subgraph update: check the proposed schema, then publish it.
//!
//! This is the one resource operation that runs a schema check. A check
//! that reports any error aborts the update before anything is published,
//! and each error becomes its own [`Diagnostic`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::check::model::CheckRequest;
use crate::check::poller::CheckPoller;
use crate::check::report::CheckReport;
use crate::client::{CheckApi, StudioClient};
use crate::diagnostic::Diagnostic;
use crate::error::{RegistryError, Result};
use crate::types::{GraphRef, PublishOutcome, Subgraph, SubgraphPublish, SubgraphRef};

/// Summary of every diagnostic raised by a failed schema check.
pub const SCHEMA_CHECK_FAILED: &str = "Failed to validate subgraph schema";

const SCHEMA_CHECK_NOTICE: &str = "Subgraph schema check notice";
const PUBLISH_FAILED: &str = "Failed to update subgraph schema";
const READ_FAILED: &str = "Failed to get subgraph";

/// Stored state of a subgraph resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgraphState {
    /// Graph id.
    pub graph_id: String,
    /// Variant name.
    pub variant_name: String,
    /// Subgraph name.
    pub name: String,
    /// SDL document.
    pub schema: String,
    /// Routing URL.
    pub url: String,
    /// Revision reported by the registry after the last publish.
    #[serde(default)]
    pub revision: Option<String>,
}

impl SubgraphState {
    /// The variant the subgraph belongs to.
    pub fn graph_ref(&self) -> GraphRef {
        GraphRef::new(&self.graph_id, &self.variant_name)
    }

    /// Import id, `<graphId>@<variantName>:<subgraphName>`.
    pub fn import_id(&self) -> String {
        SubgraphRef {
            graph_ref: self.graph_ref(),
            name: self.name.clone(),
        }
        .to_string()
    }

    /// Build the state of an imported subgraph from its registry record.
    pub fn from_registry(subgraph_ref: &SubgraphRef, subgraph: Subgraph) -> Self {
        Self {
            graph_id: subgraph_ref.graph_ref.graph_id().to_string(),
            variant_name: subgraph_ref.graph_ref.variant().to_string(),
            name: subgraph.name,
            schema: subgraph.active_partial_schema.sdl,
            url: subgraph.url.unwrap_or_default(),
            revision: Some(subgraph.revision),
        }
    }
}

/// Subgraph reads and writes the updater needs.
#[async_trait]
pub trait SubgraphRegistry: Send + Sync {
    /// Publish a schema.
    async fn publish_subgraph(&self, publish: &SubgraphPublish) -> Result<PublishOutcome>;

    /// Read a subgraph.
    async fn get_subgraph(&self, graph_ref: &GraphRef, name: &str) -> Result<Subgraph>;
}

#[async_trait]
impl SubgraphRegistry for StudioClient {
    async fn publish_subgraph(&self, publish: &SubgraphPublish) -> Result<PublishOutcome> {
        StudioClient::publish_subgraph(self, publish).await
    }

    async fn get_subgraph(&self, graph_ref: &GraphRef, name: &str) -> Result<Subgraph> {
        self.subgraph(graph_ref, name).await
    }
}

/// Result of a successful update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// The planned state with the registry's revision.
    pub state: SubgraphState,
    /// Non-blocking check findings, as warnings.
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs the check-then-publish update of a subgraph.
#[derive(Debug, Clone)]
pub struct SubgraphUpdater<C, R> {
    poller: CheckPoller<C>,
    registry: R,
}

impl SubgraphUpdater<StudioClient, StudioClient> {
    /// An updater that checks and publishes through the same client.
    pub fn from_client(client: StudioClient) -> Self {
        Self::new(CheckPoller::new(client.clone()), client)
    }
}

impl<C: CheckApi, R: SubgraphRegistry> SubgraphUpdater<C, R> {
    /// Create an updater.
    pub fn new(poller: CheckPoller<C>, registry: R) -> Self {
        Self { poller, registry }
    }

    /// The registry.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// The check poller.
    pub fn poller(&self) -> &CheckPoller<C> {
        &self.poller
    }

    /// Update a subgraph from `prior` to `planned`.
    ///
    /// The planned schema is checked against the prior variant and subgraph
    /// name first. Publishing only happens when the schema changed; the URL
    /// and revision label come from `prior`. The returned state carries the
    /// revision read back from the registry.
    #[instrument(skip_all, fields(subgraph = %prior.import_id()))]
    pub async fn update(
        &self,
        prior: &SubgraphState,
        planned: &SubgraphState,
        cancel: &CancellationToken,
    ) -> std::result::Result<UpdateOutcome, Vec<Diagnostic>> {
        let graph_ref = prior.graph_ref();
        let request = CheckRequest::new(graph_ref.clone(), &prior.name, &planned.schema);

        let report = self
            .poller
            .run_check(&request, cancel)
            .await
            .map_err(|err| vec![failure(SCHEMA_CHECK_FAILED, &err)])?;
        let diagnostics = check_diagnostics(&report)?;

        if planned.schema != prior.schema {
            let publish = SubgraphPublish {
                graph_ref: graph_ref.clone(),
                name: prior.name.clone(),
                schema: planned.schema.clone(),
                url: prior.url.clone(),
                revision: prior.revision.clone().unwrap_or_default(),
            };
            self.registry
                .publish_subgraph(&publish)
                .await
                .map_err(|err| vec![failure(PUBLISH_FAILED, &err)])?;
        } else {
            info!("Schema unchanged, skipping publish");
        }

        let subgraph = self
            .registry
            .get_subgraph(&graph_ref, &prior.name)
            .await
            .map_err(|err| vec![failure(READ_FAILED, &err)])?;

        let mut state = planned.clone();
        state.revision = Some(subgraph.revision);
        Ok(UpdateOutcome { state, diagnostics })
    }
}

/// Turn a check report into warnings, or into the errors that abort the
/// update.
fn check_diagnostics(report: &CheckReport) -> std::result::Result<Vec<Diagnostic>, Vec<Diagnostic>> {
    if report.has_errors() {
        let errors: Vec<_> = report
            .to_diagnostics(SCHEMA_CHECK_FAILED)
            .into_iter()
            .filter(Diagnostic::is_error)
            .map(|diagnostic| diagnostic.with_attribute("schema"))
            .collect();
        warn!(errors = errors.len(), "Schema check reported errors");
        return Err(errors);
    }
    if report.workflow_failed() {
        warn!(status = %report.status, "Schema check failed without reporting an error");
        return Err(vec![Diagnostic::error(SCHEMA_CHECK_FAILED)
            .with_detail(format!(
                "Check workflow finished with status {}, please check the Apollo Studio dashboard for more details",
                report.status
            ))
            .with_attribute("schema")]);
    }
    Ok(report.to_diagnostics(SCHEMA_CHECK_NOTICE))
}

fn failure(summary: &str, err: &RegistryError) -> Diagnostic {
    Diagnostic::error(summary).with_detail(format!("{}: {}", summary, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::model::{
        Change, ChangeSeverity, CompositionCheckTask, CompositionError, CompositionResult,
        OperationsCheckResult, OperationsCheckTask, TaskResult, TaskStatus, WorkflowSnapshot,
        WorkflowStatus,
    };
    use crate::diagnostic::DiagnosticSeverity;
    use crate::error::{Rejection, RejectionKind};
    use crate::testing::{
        assert_error_contains, assert_has_errors, assert_no_errors, MemoryRegistry,
        ScriptedCheckApi,
    };

    fn prior() -> SubgraphState {
        SubgraphState {
            graph_id: "my-graph".to_string(),
            variant_name: "current".to_string(),
            name: "products".to_string(),
            schema: "type Query { products: [String] }".to_string(),
            url: "https://products.example.com/graphql".to_string(),
            revision: Some("4".to_string()),
        }
    }

    fn planned() -> SubgraphState {
        SubgraphState {
            schema: "type Query { products: [String] reviews: [String] }".to_string(),
            ..prior()
        }
    }

    fn registry() -> MemoryRegistry {
        MemoryRegistry::new().with_subgraph(
            &GraphRef::new("my-graph", "current"),
            "products",
            "type Query { products: [String] }",
            "https://products.example.com/graphql",
        )
    }

    fn composition_failure(messages: &[&str]) -> TaskResult {
        TaskResult::CompositionCheck(CompositionCheckTask {
            status: TaskStatus::Failed,
            result: Some(CompositionResult {
                errors: messages
                    .iter()
                    .map(|message| CompositionError {
                        code: None,
                        message: message.to_string(),
                        locations: vec![],
                    })
                    .collect(),
            }),
        })
    }

    #[test]
    fn test_state_import_id_round_trip() {
        let state = prior();
        assert_eq!(state.import_id(), "my-graph@current:products");

        let subgraph_ref = SubgraphRef::parse(&state.import_id()).unwrap();
        let subgraph = Subgraph {
            name: "products".to_string(),
            revision: "4".to_string(),
            url: Some(state.url.clone()),
            active_partial_schema: crate::types::PartialSchema {
                sdl: state.schema.clone(),
                created_at: None,
                is_live: true,
            },
        };
        assert_eq!(SubgraphState::from_registry(&subgraph_ref, subgraph), state);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_publishes_after_passing_check() {
        let api = ScriptedCheckApi::accepting("wf-1").with_snapshots(vec![
            WorkflowSnapshot::pending(),
            WorkflowSnapshot::new(WorkflowStatus::Passed, vec![]),
        ]);
        let updater = SubgraphUpdater::new(CheckPoller::new(api), registry());

        let outcome = updater
            .update(&prior(), &planned(), &CancellationToken::new())
            .await
            .unwrap();

        assert_no_errors(&outcome.diagnostics);
        assert_eq!(outcome.state.schema, planned().schema);
        assert_eq!(outcome.state.revision.as_deref(), Some("2"));

        let publishes = updater.registry().publishes();
        assert_eq!(publishes.len(), 1);
        assert_eq!(publishes[0].url, "https://products.example.com/graphql");
        assert_eq!(publishes[0].revision, "4");
        assert_eq!(publishes[0].schema, planned().schema);
        assert_eq!(updater.poller().api().submitted()[0].proposed_schema(), planned().schema);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_aborts_with_one_diagnostic_per_error() {
        let api = ScriptedCheckApi::accepting("wf-1").with_snapshots(vec![WorkflowSnapshot::new(
            WorkflowStatus::Failed,
            vec![composition_failure(&[
                "field X already exists",
                "type Y is missing",
            ])],
        )]);
        let updater = SubgraphUpdater::new(CheckPoller::new(api), registry());

        let diagnostics = updater
            .update(&prior(), &planned(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(diagnostics.len(), 2);
        assert_has_errors(&diagnostics);
        assert_error_contains(&diagnostics, "field X already exists");
        assert_error_contains(&diagnostics, "type Y is missing");
        assert!(diagnostics
            .iter()
            .all(|d| d.summary == SCHEMA_CHECK_FAILED && d.attribute.as_deref() == Some("schema")));
        assert!(updater.registry().publishes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_notice_change_does_not_abort() {
        let api = ScriptedCheckApi::accepting("wf-1").with_snapshots(vec![WorkflowSnapshot::new(
            WorkflowStatus::Passed,
            vec![TaskResult::OperationsCheck(OperationsCheckTask {
                status: TaskStatus::Passed,
                result: Some(OperationsCheckResult {
                    changes: vec![Change {
                        code: "FIELD_ADDED".to_string(),
                        description: "Field `Query.reviews` added".to_string(),
                        severity: ChangeSeverity::Notice,
                        category: "ADDITION".to_string(),
                    }],
                    ..Default::default()
                }),
            })],
        )]);
        let updater = SubgraphUpdater::new(CheckPoller::new(api), registry());

        let outcome = updater
            .update(&prior(), &planned(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].severity, DiagnosticSeverity::Warning);
        assert_eq!(updater.registry().publishes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_workflow_without_errors_aborts() {
        let api = ScriptedCheckApi::accepting("wf-1").with_snapshots(vec![WorkflowSnapshot::new(
            WorkflowStatus::Blocked,
            vec![],
        )]);
        let updater = SubgraphUpdater::new(CheckPoller::new(api), registry());

        let diagnostics = updater
            .update(&prior(), &planned(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(diagnostics.len(), 1);
        assert_error_contains(&diagnostics, "BLOCKED");
        assert!(updater.registry().publishes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_check_aborts() {
        let api = ScriptedCheckApi::rejecting(Rejection::new(
            RejectionKind::PermissionDenied,
            "key cannot run checks",
        ));
        let updater = SubgraphUpdater::new(CheckPoller::new(api), registry());

        let diagnostics = updater
            .update(&prior(), &planned(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(diagnostics.len(), 1);
        assert_error_contains(&diagnostics, "key cannot run checks");
        assert_eq!(updater.poller().api().fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_schema_skips_publish() {
        let api = ScriptedCheckApi::accepting("wf-1").with_snapshots(vec![WorkflowSnapshot::new(
            WorkflowStatus::Passed,
            vec![],
        )]);
        let updater = SubgraphUpdater::new(CheckPoller::new(api), registry());
        let planned = SubgraphState {
            url: "https://products-v2.example.com/graphql".to_string(),
            ..prior()
        };

        let outcome = updater
            .update(&prior(), &planned, &CancellationToken::new())
            .await
            .unwrap();

        assert!(updater.registry().publishes().is_empty());
        assert_eq!(outcome.state.revision.as_deref(), Some("1"));
        assert_eq!(outcome.state.url, planned.url);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_back_after_create_and_missing_subgraph() {
        let api = ScriptedCheckApi::accepting("wf-1").with_snapshots(vec![WorkflowSnapshot::new(
            WorkflowStatus::Passed,
            vec![],
        )]);
        let updater = SubgraphUpdater::new(CheckPoller::new(api), MemoryRegistry::new());
        let prior = SubgraphState {
            name: "inventory".to_string(),
            ..prior()
        };
        let planned = SubgraphState {
            name: "inventory".to_string(),
            ..planned()
        };

        // Publishing creates the subgraph, so the read-back succeeds.
        let outcome = updater
            .update(&prior, &planned, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.state.revision.as_deref(), Some("1"));

        let unchanged = updater
            .update(
                &SubgraphState {
                    name: "missing".to_string(),
                    ..prior.clone()
                },
                &SubgraphState {
                    name: "missing".to_string(),
                    ..prior.clone()
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_error_contains(&unchanged, "not found");
    }
}
