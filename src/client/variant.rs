use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use super::graphql::GraphRoot;
use super::StudioClient;
use crate::error::{RegistryError, Result};
use crate::types::{GraphRef, GraphVariant};

const GRAPH_VARIANTS: &str = r#"
query GraphVariants($graphId: ID!) {
  graph(id: $graphId) { variants { id name hasSupergraphSchema } }
}
"#;

const GRAPH_VARIANT: &str = r#"
query GraphVariant($ref: ID!) {
  variant(ref: $ref) {
    __typename
    ... on GraphVariant { id name hasSupergraphSchema }
    ... on InvalidRefFormat { message }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct VariantList {
    #[serde(default)]
    variants: Vec<GraphVariant>,
}

#[derive(Debug, Deserialize)]
struct VariantData {
    variant: Option<VariantLookup>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum VariantLookup {
    GraphVariant(GraphVariant),
    InvalidRefFormat { message: String },
}

impl VariantData {
    fn into_variant(self, graph_ref: &GraphRef) -> Result<GraphVariant> {
        match self.variant {
            Some(VariantLookup::GraphVariant(variant)) => Ok(variant),
            Some(VariantLookup::InvalidRefFormat { message }) => {
                Err(RegistryError::InvalidReference(message))
            }
            None => Err(RegistryError::NotFound(format!("variant '{}'", graph_ref))),
        }
    }
}

impl StudioClient {
    /// Every variant of a graph.
    #[instrument(skip(self), name = "studio.graph_variants")]
    pub async fn graph_variants(&self, graph_id: &str) -> Result<Vec<GraphVariant>> {
        let root: GraphRoot<VariantList> = self
            .execute("GraphVariants", GRAPH_VARIANTS, json!({ "graphId": graph_id }))
            .await?;
        Ok(root.into_graph(graph_id)?.variants)
    }

    /// One variant, looked up by reference.
    #[instrument(skip(self), name = "studio.graph_variant", fields(graph_ref = %graph_ref))]
    pub async fn graph_variant(&self, graph_ref: &GraphRef) -> Result<GraphVariant> {
        let data: VariantData = self
            .execute(
                "GraphVariant",
                GRAPH_VARIANT,
                json!({ "ref": graph_ref.to_string() }),
            )
            .await?;
        data.into_variant(graph_ref)
    }
}
