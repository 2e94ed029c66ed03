//! Platform API client.
//!
//! [`StudioClient`] speaks GraphQL over HTTPS, authenticating every request
//! with the `x-api-key` header. The check workflow operations are exposed
//! through the [`CheckApi`] trait so the poller can run against a scripted
//! implementation in tests; the registry operations are inherent methods,
//! grouped by object in the submodules.

mod api_key;
mod check;
mod graph;
pub(crate) mod graphql;
mod identity;
mod subgraph;
mod variant;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::check::model::{CheckRequest, SubmitOutcome, WorkflowHandle, WorkflowSnapshot};
use crate::config::ClientConfig;
use crate::error::{RegistryError, Result};
use graphql::{GraphQlRequest, GraphQlResponse};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Client name reported to the registry.
const CLIENT_NAME_HEADER: &str = "apollographql-client-name";

/// The check workflow operations of the registry.
#[async_trait]
pub trait CheckApi: Send + Sync {
    /// Submit a subgraph schema check.
    ///
    /// A refusal by the registry is an `Ok(SubmitOutcome::Rejected)`; errors
    /// are reserved for transport failures.
    async fn submit(&self, request: &CheckRequest) -> Result<SubmitOutcome>;

    /// Fetch the current state of a submitted workflow.
    async fn fetch(&self, handle: &WorkflowHandle) -> Result<WorkflowSnapshot>;
}

#[async_trait]
impl<T: CheckApi + ?Sized> CheckApi for std::sync::Arc<T> {
    async fn submit(&self, request: &CheckRequest) -> Result<SubmitOutcome> {
        (**self).submit(request).await
    }

    async fn fetch(&self, handle: &WorkflowHandle) -> Result<WorkflowSnapshot> {
        (**self).fetch(handle).await
    }
}

/// GraphQL client for the Platform API.
///
/// Cloning is cheap and shares the connection pool.
#[derive(Debug, Clone)]
pub struct StudioClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl StudioClient {
    /// Create a client. The config is validated first.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let config = config.validated()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self { http, config })
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The organization every organization-scoped operation targets.
    pub fn org_id(&self) -> &str {
        &self.config.org_id
    }

    /// Run one GraphQL operation and decode its `data`.
    pub(crate) async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: Value,
    ) -> Result<T> {
        debug!(operation, endpoint = %self.config.endpoint, "Sending GraphQL request");

        let response = self
            .http
            .post(&self.config.endpoint)
            .header(API_KEY_HEADER, &self.config.api_key)
            .header(CLIENT_NAME_HEADER, env!("CARGO_PKG_NAME"))
            .json(&GraphQlRequest {
                query,
                operation_name: operation,
                variables,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|err| {
                debug!(operation, error = %err, "Failed to read error response body");
                String::new()
            });
            warn!(operation, status = status.as_u16(), "GraphQL request failed");
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let envelope: GraphQlResponse = serde_json::from_slice(&body)?;
        envelope.into_data().inspect_err(|err| {
            warn!(operation, error = %err, "GraphQL operation returned errors");
        })
    }
}
