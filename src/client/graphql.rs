//! GraphQL request/response envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RegistryError, Result};

/// Body of a GraphQL POST.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphQlRequest<'a> {
    pub query: &'a str,
    pub operation_name: &'a str,
    pub variables: Value,
}

/// One entry of the `errors` array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct GraphQlError {
    pub message: String,
}

/// Response envelope. `data` is only decoded once `errors` is known to be
/// empty.
#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

impl GraphQlResponse {
    /// Decode `data` into `T`, failing on any GraphQL error.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T> {
        if !self.errors.is_empty() {
            return Err(RegistryError::GraphQl(
                self.errors.into_iter().map(|err| err.message).collect(),
            ));
        }
        match self.data {
            Some(Value::Null) | None => Err(RegistryError::UnexpectedResponse(
                "response has neither data nor errors".to_string(),
            )),
            Some(data) => Ok(serde_json::from_value(data)?),
        }
    }
}

/// `data` of every operation rooted at `graph(id:)`.
#[derive(Debug, Deserialize)]
pub(crate) struct GraphRoot<T> {
    graph: Option<T>,
}

impl<T> GraphRoot<T> {
    /// The `graph` field, or `NotFound` when the registry returned null.
    pub fn into_graph(self, graph_id: &str) -> Result<T> {
        self.graph
            .ok_or_else(|| RegistryError::NotFound(format!("graph '{}'", graph_id)))
    }
}
