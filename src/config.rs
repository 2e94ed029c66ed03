//! Client and polling configuration.
//!
//! [`ClientConfig`] deserializes from the same JSON payload the host tool
//! hands to a provider's `configure` call. Credentials missing from the
//! payload fall back to the `APOLLO_KEY` and `APOLLO_ORG_ID` environment
//! variables.
//!
//! ```
//! use apollo_studio_provider::config::ClientConfig;
//!
//! let config = ClientConfig::new("service:my-graph:abc123", "my-org");
//! assert!(config.validate().is_empty());
//! assert_eq!(config.endpoint, apollo_studio_provider::config::DEFAULT_ENDPOINT);
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostic::{has_errors, Diagnostic};
use crate::error::{RegistryError, Result};

/// Default Platform API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://graphql.api.apollographql.com/api/graphql";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "APOLLO_KEY";

/// Environment variable holding the organization id.
pub const ORG_ID_ENV: &str = "APOLLO_ORG_ID";

/// Fixed delay between two check workflow polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connection settings for [`StudioClient`](crate::client::StudioClient).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// GraphQL endpoint of the registry.
    #[serde(default = "default_endpoint", alias = "host")]
    pub endpoint: String,
    /// API key sent in the `x-api-key` header.
    #[serde(default)]
    pub api_key: String,
    /// Organization the provider operates on.
    #[serde(default)]
    pub org_id: String,
    /// Per-request timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Value of the `User-Agent` header.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
}

impl ClientConfig {
    /// Create a config for the default endpoint.
    pub fn new(api_key: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: api_key.into(),
            org_id: org_id.into(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            user_agent: default_user_agent(),
        }
    }

    /// Build a config from a provider configuration payload.
    ///
    /// Null or missing credentials are read from [`API_KEY_ENV`] and
    /// [`ORG_ID_ENV`]. The result is not validated; call [`validate`] or
    /// [`ClientConfig::validated`].
    ///
    /// [`validate`]: ClientConfig::validate
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let value = match value {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other,
        };
        let mut config: ClientConfig = serde_json::from_value(strip_nulls(value))?;
        if config.api_key.is_empty() {
            config.api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        }
        if config.org_id.is_empty() {
            config.org_id = std::env::var(ORG_ID_ENV).unwrap_or_default();
        }
        Ok(config)
    }

    /// Override the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// The per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check that every required setting is present.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if self.endpoint.trim().is_empty() {
            diagnostics.push(
                Diagnostic::error("Missing Apollo host")
                    .with_detail("Please set the host to the Apollo GraphQL API endpoint")
                    .with_attribute("host"),
            );
        }
        if self.api_key.trim().is_empty() {
            diagnostics.push(
                Diagnostic::error("Missing Apollo API key")
                    .with_detail(format!(
                        "Please set the api_key or the {} environment variable so the client can authenticate",
                        API_KEY_ENV
                    ))
                    .with_attribute("api_key"),
            );
        }
        if self.org_id.trim().is_empty() {
            diagnostics.push(
                Diagnostic::error("Missing Apollo org ID")
                    .with_detail(format!(
                        "Please set the org_id or the {} environment variable",
                        ORG_ID_ENV
                    ))
                    .with_attribute("org_id"),
            );
        }
        if self.request_timeout_secs == 0 {
            diagnostics.push(
                Diagnostic::error("Invalid request timeout")
                    .with_detail("request_timeout_secs must be at least 1")
                    .with_attribute("request_timeout_secs"),
            );
        }
        diagnostics
    }

    /// Validate and return the config, or a configuration error listing
    /// every problem.
    pub fn validated(self) -> Result<Self> {
        let diagnostics = self.validate();
        if has_errors(&diagnostics) {
            let summaries: Vec<_> = diagnostics.into_iter().map(|d| d.summary).collect();
            return Err(RegistryError::Configuration(summaries.join(", ")));
        }
        Ok(self)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"***")
            .field("org_id", &self.org_id)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Drop top-level null entries so serde defaults apply to them.
fn strip_nulls(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        ),
        other => other,
    }
}

/// Timing of the check workflow poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Delay between two fetches of a pending workflow.
    pub interval: Duration,
    /// Overall limit on the poll loop. `None` waits until the workflow
    /// completes or the caller cancels.
    pub timeout: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

impl PollOptions {
    /// Create poll options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the overall poll timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
