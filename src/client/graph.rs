use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use super::graphql::GraphRoot;
use super::StudioClient;
use crate::error::{RegistryError, Result};
use crate::types::Graph;

const GRAPH_FIELDS: &str = "id name description graphType reportingEnabled accountId";

#[derive(Debug, Deserialize)]
struct OrganizationGraphs {
    organization: Option<GraphList>,
}

#[derive(Debug, Deserialize)]
struct GraphList {
    #[serde(default)]
    graphs: Vec<Graph>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewService {
    new_service: Option<Graph>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMutation {
    #[serde(default)]
    update_title: Option<serde_json::Value>,
    #[serde(default)]
    update_description: Option<serde_json::Value>,
}

impl StudioClient {
    /// Every graph of the configured organization.
    #[instrument(skip(self), name = "studio.graphs", fields(org_id = %self.org_id()))]
    pub async fn graphs(&self) -> Result<Vec<Graph>> {
        let query = format!(
            "query Graphs($orgId: ID!) {{ organization(id: $orgId) {{ graphs {{ {} }} }} }}",
            GRAPH_FIELDS
        );
        let data: OrganizationGraphs = self
            .execute("Graphs", &query, json!({ "orgId": self.org_id() }))
            .await?;
        data.organization
            .map(|org| org.graphs)
            .ok_or_else(|| RegistryError::NotFound(format!("organization '{}'", self.org_id())))
    }

    /// One graph.
    #[instrument(skip(self), name = "studio.graph")]
    pub async fn graph(&self, graph_id: &str) -> Result<Graph> {
        let query = format!(
            "query Graph($graphId: ID!) {{ graph(id: $graphId) {{ {} }} }}",
            GRAPH_FIELDS
        );
        let root: GraphRoot<Graph> = self
            .execute("Graph", &query, json!({ "graphId": graph_id }))
            .await?;
        root.into_graph(graph_id)
    }

    /// Create a graph in the configured organization.
    #[instrument(skip(self, description), name = "studio.create_graph")]
    pub async fn create_graph(&self, graph_id: &str, name: &str, description: &str) -> Result<Graph> {
        let query = format!(
            "mutation CreateGraph($accountId: ID!, $id: ID!, $name: String!, $description: String) \
             {{ newService(accountId: $accountId, id: $id, name: $name, description: $description) {{ {} }} }}",
            GRAPH_FIELDS
        );
        let variables = json!({
            "accountId": self.org_id(),
            "id": graph_id,
            "name": name,
            "description": description,
        });
        let data: NewService = self.execute("CreateGraph", &query, variables).await?;
        let graph = data.new_service.ok_or_else(|| {
            RegistryError::UnexpectedResponse(format!("graph '{}' was not created", graph_id))
        })?;
        info!(graph_id = %graph.id, "Created graph");
        Ok(graph)
    }

    /// Delete a graph.
    #[instrument(skip(self), name = "studio.remove_graph")]
    pub async fn remove_graph(&self, graph_id: &str) -> Result<()> {
        let root: GraphRoot<serde_json::Value> = self
            .execute(
                "RemoveGraph",
                "mutation RemoveGraph($graphId: ID!) { graph(id: $graphId) { delete } }",
                json!({ "graphId": graph_id }),
            )
            .await?;
        root.into_graph(graph_id)?;
        info!(graph_id, "Removed graph");
        Ok(())
    }

    /// Rename a graph. The API calls the name its title.
    #[instrument(skip(self), name = "studio.update_graph_title")]
    pub async fn update_graph_title(&self, graph_id: &str, title: &str) -> Result<()> {
        let root: GraphRoot<GraphMutation> = self
            .execute(
                "UpdateGraphTitle",
                "mutation UpdateGraphTitle($graphId: ID!, $title: String!) \
                 { graph(id: $graphId) { updateTitle(title: $title) { id } } }",
                json!({ "graphId": graph_id, "title": title }),
            )
            .await?;
        root.into_graph(graph_id)?
            .update_title
            .map(|_| ())
            .ok_or_else(|| {
                RegistryError::UnexpectedResponse(format!("title of graph '{}' was not updated", graph_id))
            })
    }

    /// Replace a graph's description.
    #[instrument(skip(self, description), name = "studio.update_graph_description")]
    pub async fn update_graph_description(&self, graph_id: &str, description: &str) -> Result<()> {
        let root: GraphRoot<GraphMutation> = self
            .execute(
                "UpdateGraphDescription",
                "mutation UpdateGraphDescription($graphId: ID!, $description: String!) \
                 { graph(id: $graphId) { updateDescription(description: $description) { id } } }",
                json!({ "graphId": graph_id, "description": description }),
            )
            .await?;
        root.into_graph(graph_id)?
            .update_description
            .map(|_| ())
            .ok_or_else(|| {
                RegistryError::UnexpectedResponse(format!(
                    "description of graph '{}' was not updated",
                    graph_id
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_organization_graphs_decode() {
        let data: OrganizationGraphs = serde_json::from_value(json!({
            "organization": {"graphs": [
                {
                    "id": "my-graph",
                    "name": "My Graph",
                    "description": null,
                    "graphType": "SELF_HOSTED_SUPERGRAPH",
                    "reportingEnabled": true,
                    "accountId": "my-org"
                },
                {"id": "legacy", "name": "Legacy"}
            ]}
        }))
        .unwrap();

        let graphs = data.organization.unwrap().graphs;
        assert_eq!(graphs.len(), 2);
        assert_eq!(graphs[0].graph_type.as_deref(), Some("SELF_HOSTED_SUPERGRAPH"));
        assert!(graphs[0].reporting_enabled);
        assert!(graphs[0].description.is_none());
        assert!(!graphs[1].reporting_enabled);
    }

    #[test]
    fn test_new_service_decode() {
        let data: NewService = serde_json::from_value(json!({
            "newService": {"id": "new-graph", "name": "New", "description": "test", "accountId": "my-org"}
        }))
        .unwrap();
        let graph = data.new_service.unwrap();
        assert_eq!(graph.id, "new-graph");
        assert_eq!(graph.description.as_deref(), Some("test"));
    }

    #[test]
    fn test_graph_mutation_decode() {
        let root: GraphRoot<GraphMutation> =
            serde_json::from_value(json!({"graph": {"updateTitle": {"id": "my-graph"}}})).unwrap();
        let mutation = root.into_graph("my-graph").unwrap();
        assert!(mutation.update_title.is_some());
        assert!(mutation.update_description.is_none());
    }
}
