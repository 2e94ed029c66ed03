use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use super::graphql::GraphRoot;
use super::StudioClient;
use crate::error::{RegistryError, Result};
use crate::types::{GraphRef, PublishOutcome, Subgraph, SubgraphPublish};

const SUBGRAPH_FIELDS: &str = "name revision url activePartialSchema { sdl createdAt isLive }";

const PUBLISH_SUBGRAPH: &str = r#"
mutation PublishSubgraph($graphId: ID!, $variantName: String!, $name: String!, $schema: String!, $url: String, $revision: String!) {
  graph(id: $graphId) {
    publishSubgraph(graphVariant: $variantName, name: $name, activePartialSchema: { sdl: $schema }, url: $url, revision: $revision) {
      wasCreated
      wasUpdated
      updatedGateway
    }
  }
}
"#;

const REMOVE_SUBGRAPH: &str = r#"
mutation RemoveSubgraph($graphId: ID!, $variantName: String!, $name: String!) {
  graph(id: $graphId) {
    removeImplementingServiceAndTriggerComposition(graphVariant: $variantName, name: $name) {
      didExist
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct VariantRoot<T> {
    variant: Option<T>,
}

impl<T> VariantRoot<T> {
    fn into_variant(self, graph_ref: &GraphRef) -> Result<T> {
        self.variant
            .ok_or_else(|| RegistryError::NotFound(format!("variant '{}'", graph_ref)))
    }
}

#[derive(Debug, Deserialize)]
struct SubgraphList {
    #[serde(default)]
    subgraphs: Option<Vec<Subgraph>>,
}

#[derive(Debug, Deserialize)]
struct SubgraphLookup {
    subgraph: Option<Subgraph>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishData {
    publish_subgraph: Option<PublishOutcome>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveData {
    remove_implementing_service_and_trigger_composition: Option<RemoveOutcome>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveOutcome {
    #[serde(default)]
    did_exist: bool,
}

impl StudioClient {
    /// Every subgraph of a variant.
    #[instrument(skip(self), name = "studio.subgraphs", fields(graph_ref = %graph_ref))]
    pub async fn subgraphs(&self, graph_ref: &GraphRef) -> Result<Vec<Subgraph>> {
        let query = format!(
            "query Subgraphs($graphId: ID!, $variantName: String!) \
             {{ graph(id: $graphId) {{ variant(name: $variantName) {{ subgraphs {{ {} }} }} }} }}",
            SUBGRAPH_FIELDS
        );
        let root: GraphRoot<VariantRoot<SubgraphList>> = self
            .execute(
                "Subgraphs",
                &query,
                json!({ "graphId": graph_ref.graph_id(), "variantName": graph_ref.variant() }),
            )
            .await?;
        let list = root.into_graph(graph_ref.graph_id())?.into_variant(graph_ref)?;
        Ok(list.subgraphs.unwrap_or_default())
    }

    /// One subgraph of a variant.
    #[instrument(skip(self), name = "studio.subgraph", fields(graph_ref = %graph_ref))]
    pub async fn subgraph(&self, graph_ref: &GraphRef, name: &str) -> Result<Subgraph> {
        let query = format!(
            "query Subgraph($graphId: ID!, $variantName: String!, $subgraphName: ID!) \
             {{ graph(id: $graphId) {{ variant(name: $variantName) {{ subgraph(name: $subgraphName) {{ {} }} }} }} }}",
            SUBGRAPH_FIELDS
        );
        let root: GraphRoot<VariantRoot<SubgraphLookup>> = self
            .execute(
                "Subgraph",
                &query,
                json!({
                    "graphId": graph_ref.graph_id(),
                    "variantName": graph_ref.variant(),
                    "subgraphName": name,
                }),
            )
            .await?;
        root.into_graph(graph_ref.graph_id())?
            .into_variant(graph_ref)?
            .subgraph
            .ok_or_else(|| RegistryError::NotFound(format!("subgraph '{}:{}'", graph_ref, name)))
    }

    /// Publish a subgraph schema, creating the subgraph if needed. The
    /// registry recomposes the supergraph as a side effect.
    #[instrument(
        skip(self, publish),
        name = "studio.publish_subgraph",
        fields(graph_ref = %publish.graph_ref, subgraph = %publish.name)
    )]
    pub async fn publish_subgraph(&self, publish: &SubgraphPublish) -> Result<PublishOutcome> {
        let variables = json!({
            "graphId": publish.graph_ref.graph_id(),
            "variantName": publish.graph_ref.variant(),
            "name": publish.name,
            "schema": publish.schema,
            "url": publish.url,
            "revision": publish.revision,
        });
        let root: GraphRoot<PublishData> = self
            .execute("PublishSubgraph", PUBLISH_SUBGRAPH, variables)
            .await?;
        let outcome = root
            .into_graph(publish.graph_ref.graph_id())?
            .publish_subgraph
            .unwrap_or_default();
        info!(
            was_created = outcome.was_created,
            was_updated = outcome.was_updated,
            updated_gateway = outcome.updated_gateway,
            "Published subgraph"
        );
        Ok(outcome)
    }

    /// Remove a subgraph and recompose. Returns whether it existed.
    #[instrument(skip(self), name = "studio.remove_subgraph", fields(graph_ref = %graph_ref))]
    pub async fn remove_subgraph(&self, graph_ref: &GraphRef, name: &str) -> Result<bool> {
        let root: GraphRoot<RemoveData> = self
            .execute(
                "RemoveSubgraph",
                REMOVE_SUBGRAPH,
                json!({
                    "graphId": graph_ref.graph_id(),
                    "variantName": graph_ref.variant(),
                    "name": name,
                }),
            )
            .await?;
        let did_exist = root
            .into_graph(graph_ref.graph_id())?
            .remove_implementing_service_and_trigger_composition
            .is_some_and(|outcome| outcome.did_exist);
        info!(did_exist, "Removed subgraph");
        Ok(did_exist)
    }
}
