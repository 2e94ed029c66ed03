use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::graphql::GraphRoot;
use super::{CheckApi, StudioClient};
use crate::check::model::{
    CheckRequest, SubmitOutcome, TaskResult, WorkflowHandle, WorkflowSnapshot, WorkflowStatus,
};
use crate::error::{Rejection, RejectionKind, RegistryError, Result};

const SUBMIT_SUBGRAPH_CHECK: &str = r#"
mutation SubmitSubgraphCheck($graphId: ID!, $variantName: String!, $input: SubgraphCheckAsyncInput!) {
  graph(id: $graphId) {
    variant(name: $variantName) {
      submitSubgraphCheckAsync(input: $input) {
        __typename
        ... on CheckRequestSuccess { targetURL workflowID }
        ... on InvalidInputError { message }
        ... on PermissionError { message }
        ... on PlanError { message }
      }
    }
  }
}
"#;

const CHECK_WORKFLOW: &str = r#"
query CheckWorkflow($graphId: ID!, $workflowId: ID!) {
  graph(id: $graphId) {
    checkWorkflow(id: $workflowId) {
      status
      tasks {
        __typename
        status
        ... on OperationsCheckTask {
          result {
            changes { code description severity category }
            numberOfAffectedOperations
            numberOfCheckedOperations
          }
        }
        ... on CompositionCheckTask {
          result { errors { code message locations { line column } } }
        }
        ... on LintCheckTask {
          result {
            diagnostics {
              coordinate
              message
              level
              rule
              sourceLocations {
                subgraphName
                start { line column byteOffset }
                end { line column byteOffset }
              }
            }
            stats { errorsCount warningsCount ignoredCount totalCount }
          }
        }
        ... on DownstreamCheckTask {
          results { downstreamVariantName blocking failsUpstreamWorkflow }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct SubmitGraph {
    variant: Option<SubmitVariant>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitVariant {
    submit_subgraph_check_async: SubmitResult,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum SubmitResult {
    CheckRequestSuccess {
        #[serde(rename = "targetURL", default)]
        target_url: Option<String>,
        #[serde(rename = "workflowID", default)]
        workflow_id: Option<String>,
    },
    InvalidInputError {
        message: String,
    },
    PermissionError {
        message: String,
    },
    PlanError {
        message: String,
    },
}

impl SubmitResult {
    fn into_outcome(self, graph_id: &str) -> Result<SubmitOutcome> {
        let rejection = match self {
            Self::CheckRequestSuccess {
                target_url,
                workflow_id,
            } => {
                let workflow_id = workflow_id.ok_or_else(|| {
                    RegistryError::UnexpectedResponse(
                        "check request accepted without a workflow id".to_string(),
                    )
                })?;
                let mut handle = WorkflowHandle::new(graph_id, workflow_id);
                if let Some(target_url) = target_url {
                    handle = handle.with_target_url(target_url);
                }
                return Ok(SubmitOutcome::Accepted(handle));
            }
            Self::InvalidInputError { message } => {
                Rejection::new(RejectionKind::InvalidInput, message)
            }
            Self::PermissionError { message } => {
                Rejection::new(RejectionKind::PermissionDenied, message)
            }
            Self::PlanError { message } => Rejection::new(RejectionKind::Plan, message),
        };
        Ok(SubmitOutcome::Rejected(rejection))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowGraph {
    check_workflow: Option<WireWorkflow>,
}

#[derive(Debug, Deserialize)]
struct WireWorkflow {
    status: WorkflowStatus,
    #[serde(default)]
    tasks: Option<Vec<Value>>,
}

impl WireWorkflow {
    fn into_snapshot(self) -> Result<WorkflowSnapshot> {
        let tasks = self
            .tasks
            .unwrap_or_default()
            .into_iter()
            .map(TaskResult::from_value)
            .collect::<Result<Vec<_>>>()?;
        Ok(WorkflowSnapshot::new(self.status, tasks))
    }
}

#[async_trait]
impl CheckApi for StudioClient {
    #[instrument(skip_all, name = "studio.submit_subgraph_check", fields(graph_ref = %request.graph_ref()))]
    async fn submit(&self, request: &CheckRequest) -> Result<SubmitOutcome> {
        let graph_ref = request.graph_ref();
        let variables = json!({
            "graphId": graph_ref.graph_id(),
            "variantName": graph_ref.variant(),
            "input": serde_json::to_value(request)?,
        });
        let root: GraphRoot<SubmitGraph> = self
            .execute("SubmitSubgraphCheck", SUBMIT_SUBGRAPH_CHECK, variables)
            .await?;
        let variant = root.into_graph(graph_ref.graph_id())?.variant.ok_or_else(|| {
            RegistryError::NotFound(format!("variant '{}'", graph_ref))
        })?;
        variant
            .submit_subgraph_check_async
            .into_outcome(graph_ref.graph_id())
    }

    #[instrument(skip_all, name = "studio.check_workflow", fields(workflow_id = %handle))]
    async fn fetch(&self, handle: &WorkflowHandle) -> Result<WorkflowSnapshot> {
        let variables = json!({
            "graphId": handle.graph_id(),
            "workflowId": handle.workflow_id(),
        });
        let root: GraphRoot<WorkflowGraph> = self
            .execute("CheckWorkflow", CHECK_WORKFLOW, variables)
            .await?;
        let workflow = root.into_graph(handle.graph_id())?.check_workflow.ok_or_else(|| {
            RegistryError::NotFound(format!("check workflow '{}'", handle))
        })?;
        let snapshot = workflow.into_snapshot()?;
        debug!(tasks = snapshot.tasks.len(), "Decoded check workflow");
        Ok(snapshot)
    }
}
