//! Registry object types.
//!
//! These mirror the objects of the Platform API that the provider reads and
//! writes. Field names follow the API's camelCase on the wire.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// A reference to a graph variant, written `<graphId>@<variantName>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphRef {
    graph_id: String,
    variant: String,
}

impl GraphRef {
    /// Create a reference from its parts.
    pub fn new(graph_id: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            graph_id: graph_id.into(),
            variant: variant.into(),
        }
    }

    /// Parse a `<graphId>@<variantName>` string.
    pub fn parse(s: &str) -> Result<Self, RegistryError> {
        let (graph_id, variant) = s.split_once('@').ok_or_else(|| {
            RegistryError::InvalidReference(format!(
                "graph ref '{}' must look like <graphId>@<variantName>",
                s
            ))
        })?;
        if graph_id.is_empty() || variant.is_empty() || variant.contains('@') {
            return Err(RegistryError::InvalidReference(format!(
                "graph ref '{}' must look like <graphId>@<variantName>",
                s
            )));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(RegistryError::InvalidReference(format!(
                "graph ref '{}' must not contain whitespace",
                s
            )));
        }
        Ok(Self::new(graph_id, variant))
    }

    /// The graph id.
    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    /// The variant name.
    pub fn variant(&self) -> &str {
        &self.variant
    }
}

impl fmt::Display for GraphRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.graph_id, self.variant)
    }
}

impl FromStr for GraphRef {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A reference to a subgraph of a variant, written
/// `<graphId>@<variantName>:<subgraphName>`. This is the import id of a
/// subgraph resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubgraphRef {
    /// The variant the subgraph belongs to.
    pub graph_ref: GraphRef,
    /// The subgraph name.
    pub name: String,
}

impl SubgraphRef {
    /// Parse an import id.
    ///
    /// Every part is restricted to ASCII letters, digits, `_` and `-`.
    pub fn parse(s: &str) -> Result<Self, RegistryError> {
        let invalid = || {
            RegistryError::InvalidReference(format!(
                "subgraph id '{}' must look like <graphId>@<variantName>:<subgraphName>",
                s
            ))
        };
        let (graph_id, rest) = s.split_once('@').ok_or_else(invalid)?;
        let (variant, name) = rest.split_once(':').ok_or_else(invalid)?;
        if ![graph_id, variant, name].iter().all(|part| is_id_part(part)) {
            return Err(invalid());
        }
        Ok(Self {
            graph_ref: GraphRef::new(graph_id, variant),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for SubgraphRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.graph_ref, self.name)
    }
}

fn is_id_part(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// An authenticated user or service identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Identity id.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// An organization (account) on the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Organization id.
    pub id: String,
    /// Organization name.
    pub name: String,
}

/// A graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    /// Graph id.
    pub id: String,
    /// Graph name (the API also calls it the title).
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Graph type, e.g. `CLASSIC` or `SELF_HOSTED_SUPERGRAPH`.
    #[serde(default)]
    pub graph_type: Option<String>,
    /// Whether usage reporting is enabled.
    #[serde(default)]
    pub reporting_enabled: bool,
    /// Owning organization id.
    #[serde(default)]
    pub account_id: Option<String>,
}

/// A variant of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphVariant {
    /// Variant id, `<graphId>@<variantName>`.
    pub id: String,
    /// Variant name.
    pub name: String,
    /// Whether a supergraph schema has been composed for the variant.
    #[serde(default)]
    pub has_supergraph_schema: bool,
}

/// A graph API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphApiKey {
    /// Key id.
    pub id: String,
    /// Key name.
    #[serde(default)]
    pub key_name: Option<String>,
    /// Role, one of `GRAPH_ADMIN`, `CONTRIBUTOR`, `DOCUMENTER`, `OBSERVER`,
    /// `CONSUMER`.
    #[serde(default)]
    pub role: Option<String>,
    /// Secret token. Only returned in full when the key is created.
    #[serde(default)]
    pub token: Option<String>,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Who created the key.
    #[serde(default)]
    pub created_by: Option<Identity>,
}

/// The active schema of a subgraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialSchema {
    /// SDL document.
    pub sdl: String,
    /// When the schema was published.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Whether this schema is the one currently served.
    #[serde(default)]
    pub is_live: bool,
}

/// A subgraph of a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subgraph {
    /// Subgraph name.
    pub name: String,
    /// Revision label of the last publish.
    #[serde(default)]
    pub revision: String,
    /// Routing URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Currently active schema.
    pub active_partial_schema: PartialSchema,
}

/// Arguments of a subgraph publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubgraphPublish {
    /// Target variant.
    pub graph_ref: GraphRef,
    /// Subgraph name.
    pub name: String,
    /// SDL to publish.
    pub schema: String,
    /// Routing URL.
    pub url: String,
    /// Revision label.
    pub revision: String,
}

/// What the registry did with a publish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    /// A new subgraph was created.
    #[serde(default)]
    pub was_created: bool,
    /// An existing subgraph was updated.
    #[serde(default)]
    pub was_updated: bool,
    /// The supergraph served by the gateway changed.
    #[serde(default)]
    pub updated_gateway: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_ref_parse() {
        let graph_ref = GraphRef::parse("my-graph@current").unwrap();
        assert_eq!(graph_ref.graph_id(), "my-graph");
        assert_eq!(graph_ref.variant(), "current");
        assert_eq!(graph_ref.to_string(), "my-graph@current");

        let parsed: GraphRef = "other@staging".parse().unwrap();
        assert_eq!(parsed, GraphRef::new("other", "staging"));
    }

    #[test]
    fn test_graph_ref_parse_invalid() {
        for input in ["my-graph", "@current", "my-graph@", "a@b@c", "my graph@current"] {
            let err = GraphRef::parse(input).unwrap_err();
            assert!(
                matches!(err, RegistryError::InvalidReference(_)),
                "expected invalid reference for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_subgraph_ref_parse() {
        let subgraph_ref = SubgraphRef::parse("my-graph@current:products").unwrap();
        assert_eq!(subgraph_ref.graph_ref.graph_id(), "my-graph");
        assert_eq!(subgraph_ref.graph_ref.variant(), "current");
        assert_eq!(subgraph_ref.name, "products");
        assert_eq!(subgraph_ref.to_string(), "my-graph@current:products");
    }

    #[test]
    fn test_subgraph_ref_parse_invalid() {
        for input in [
            "my-graph@current",
            "my-graph:products",
            "my-graph@current:",
            "my.graph@current:products",
            "my-graph@current:prod:ucts",
        ] {
            assert!(SubgraphRef::parse(input).is_err(), "{:?} should fail", input);
        }
    }

    #[test]
    fn test_subgraph_deserialize() {
        let subgraph: Subgraph = serde_json::from_value(serde_json::json!({
            "name": "products",
            "revision": "3",
            "url": "https://products.example.com/graphql",
            "activePartialSchema": {
                "sdl": "type Query { a: Int }",
                "createdAt": "2024-01-01T00:00:00Z",
                "isLive": true
            }
        }))
        .unwrap();

        assert_eq!(subgraph.revision, "3");
        assert!(subgraph.active_partial_schema.is_live);
        assert_eq!(subgraph.active_partial_schema.sdl, "type Query { a: Int }");
    }

    #[test]
    fn test_api_key_tolerates_missing_fields() {
        let key: GraphApiKey =
            serde_json::from_value(serde_json::json!({"id": "key-1", "keyName": "ci"})).unwrap();
        assert_eq!(key.key_name.as_deref(), Some("ci"));
        assert!(key.token.is_none());
        assert!(key.created_by.is_none());
    }
}
