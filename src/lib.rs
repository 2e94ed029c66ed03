//! Apollo Studio Provider
//!
//! Core of an infrastructure provider for the Apollo Studio schema registry:
//! a typed client for the Platform API and the asynchronous subgraph schema
//! check that gates every subgraph update.
//!
//! # Overview
//!
//! - **Client**: [`StudioClient`] speaks GraphQL to the Platform API for
//!   graphs, variants, API keys and subgraphs
//! - **Checks**: [`CheckPoller`] submits a subgraph check, polls the
//!   workflow until it completes and classifies every task result into a
//!   [`CheckReport`]
//! - **Subgraph update**: [`SubgraphUpdater`] checks a proposed schema and
//!   publishes it only when no task reported an error
//! - **Error types**: [`RegistryError`] separates transport failures,
//!   rejections and cancellation
//! - **Logging**: integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```no_run
//! use apollo_studio_provider::{
//!     init_logging, CheckPoller, CheckRequest, ClientConfig, GraphRef, StudioClient,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let config = ClientConfig::from_value(serde_json::json!({"org_id": "my-org"}))?;
//!     let client = StudioClient::new(config)?;
//!
//!     let request = CheckRequest::new(
//!         GraphRef::parse("my-graph@current")?,
//!         "products",
//!         "type Query { products: [String] }",
//!     );
//!     let report = CheckPoller::new(client)
//!         .run_check(&request, &CancellationToken::new())
//!         .await?;
//!
//!     for (kind, line) in report.lines() {
//!         println!("{} [{}] {}", line.severity, kind, line.message);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Check workflow
//!
//! The registry evaluates checks asynchronously. The poller fetches the
//! workflow every two seconds (see [`PollOptions`]) until its status is
//! `PASSED`, `FAILED` or `BLOCKED`, and stops early when the caller's
//! [`CancellationToken`](tokio_util::sync::CancellationToken) fires. Only
//! a terminal workflow produces a report.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod check;
pub mod client;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod logging;
pub mod subgraph;
pub mod testing;
pub mod types;

// Re-export main types at crate root
pub use check::{CheckPoller, CheckReport, CheckRequest, WorkflowSnapshot, WorkflowStatus};
pub use client::{CheckApi, StudioClient};
pub use config::{ClientConfig, PollOptions};
pub use diagnostic::{Diagnostic, DiagnosticSeverity};
pub use error::{ErrorKind, Rejection, RejectionKind, RegistryError, Result};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use subgraph::{SubgraphRegistry, SubgraphState, SubgraphUpdater, UpdateOutcome};
pub use types::{GraphRef, SubgraphRef};

// Re-export async_trait for implementors of the API traits
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tokio_util::sync::CancellationToken;
pub use tracing;
