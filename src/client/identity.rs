use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use super::StudioClient;
use crate::error::{RegistryError, Result};
use crate::types::{Identity, Organization};

const ME: &str = "query Me { me { id name } }";

const ORGANIZATION: &str = r#"
query Organization($orgId: ID!) {
  organization(id: $orgId) { id name }
}
"#;

#[derive(Debug, Deserialize)]
struct MeData {
    me: Option<Identity>,
}

#[derive(Debug, Deserialize)]
struct OrganizationData {
    organization: Option<Organization>,
}

impl StudioClient {
    /// The identity the API key authenticates as.
    #[instrument(skip(self), name = "studio.me")]
    pub async fn me(&self) -> Result<Identity> {
        let data: MeData = self.execute("Me", ME, json!({})).await?;
        data.me
            .ok_or_else(|| RegistryError::NotFound("authenticated identity".to_string()))
    }

    /// The configured organization.
    #[instrument(skip(self), name = "studio.organization", fields(org_id = %self.org_id()))]
    pub async fn organization(&self) -> Result<Organization> {
        let data: OrganizationData = self
            .execute("Organization", ORGANIZATION, json!({ "orgId": self.org_id() }))
            .await?;
        data.organization
            .ok_or_else(|| RegistryError::NotFound(format!("organization '{}'", self.org_id())))
    }
}
