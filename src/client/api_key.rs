use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use super::graphql::GraphRoot;
use super::StudioClient;
use crate::error::{RegistryError, Result};
use crate::types::GraphApiKey;

const GRAPH_API_KEYS: &str = r#"
query GraphApiKeys($graphId: ID!) {
  graph(id: $graphId) {
    apiKeys { id keyName role token createdAt createdBy { id name } }
  }
}
"#;

const CREATE_GRAPH_API_KEY: &str = r#"
mutation CreateGraphApiKey($graphId: ID!, $keyName: String!) {
  graph(id: $graphId) {
    newKey(keyName: $keyName) { id keyName role token createdAt createdBy { id name } }
  }
}
"#;

const RENAME_GRAPH_API_KEY: &str = r#"
mutation RenameGraphApiKey($graphId: ID!, $keyId: ID!, $keyName: String!) {
  graph(id: $graphId) {
    renameKey(id: $keyId, newKeyName: $keyName) { id keyName }
  }
}
"#;

const REMOVE_GRAPH_API_KEY: &str = r#"
mutation RemoveGraphApiKey($graphId: ID!, $keyId: ID!) {
  graph(id: $graphId) { removeKey(id: $keyId) }
}
"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiKeyList {
    #[serde(default)]
    api_keys: Option<Vec<GraphApiKey>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewKey {
    new_key: Option<GraphApiKey>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameKey {
    rename_key: Option<GraphApiKey>,
}

fn find_key(keys: Vec<GraphApiKey>, graph_id: &str, key_id: &str) -> Result<GraphApiKey> {
    keys.into_iter()
        .find(|key| key.id == key_id)
        .ok_or_else(|| {
            RegistryError::NotFound(format!("API key '{}' of graph '{}'", key_id, graph_id))
        })
}

impl StudioClient {
    /// Every API key of a graph. Tokens come back redacted.
    #[instrument(skip(self), name = "studio.graph_api_keys")]
    pub async fn graph_api_keys(&self, graph_id: &str) -> Result<Vec<GraphApiKey>> {
        let root: GraphRoot<ApiKeyList> = self
            .execute("GraphApiKeys", GRAPH_API_KEYS, json!({ "graphId": graph_id }))
            .await?;
        Ok(root.into_graph(graph_id)?.api_keys.unwrap_or_default())
    }

    /// One API key of a graph.
    #[instrument(skip(self), name = "studio.graph_api_key")]
    pub async fn graph_api_key(&self, graph_id: &str, key_id: &str) -> Result<GraphApiKey> {
        let keys = self.graph_api_keys(graph_id).await?;
        find_key(keys, graph_id, key_id)
    }

    /// Create an API key. The returned key carries the full token, which the
    /// registry never returns again.
    #[instrument(skip(self), name = "studio.create_graph_api_key")]
    pub async fn create_graph_api_key(&self, graph_id: &str, key_name: &str) -> Result<GraphApiKey> {
        let root: GraphRoot<NewKey> = self
            .execute(
                "CreateGraphApiKey",
                CREATE_GRAPH_API_KEY,
                json!({ "graphId": graph_id, "keyName": key_name }),
            )
            .await?;
        let key = root.into_graph(graph_id)?.new_key.ok_or_else(|| {
            RegistryError::UnexpectedResponse(format!("API key '{}' was not created", key_name))
        })?;
        info!(graph_id, key_id = %key.id, "Created graph API key");
        Ok(key)
    }

    /// Rename an API key.
    #[instrument(skip(self), name = "studio.rename_graph_api_key")]
    pub async fn rename_graph_api_key(&self, graph_id: &str, key_id: &str, key_name: &str) -> Result<()> {
        let root: GraphRoot<RenameKey> = self
            .execute(
                "RenameGraphApiKey",
                RENAME_GRAPH_API_KEY,
                json!({ "graphId": graph_id, "keyId": key_id, "keyName": key_name }),
            )
            .await?;
        root.into_graph(graph_id)?.rename_key.ok_or_else(|| {
            RegistryError::NotFound(format!("API key '{}' of graph '{}'", key_id, graph_id))
        })?;
        Ok(())
    }

    /// Revoke an API key.
    #[instrument(skip(self), name = "studio.remove_graph_api_key")]
    pub async fn remove_graph_api_key(&self, graph_id: &str, key_id: &str) -> Result<()> {
        let root: GraphRoot<serde_json::Value> = self
            .execute(
                "RemoveGraphApiKey",
                REMOVE_GRAPH_API_KEY,
                json!({ "graphId": graph_id, "keyId": key_id }),
            )
            .await?;
        root.into_graph(graph_id)?;
        info!(graph_id, key_id, "Removed graph API key");
        Ok(())
    }
}
