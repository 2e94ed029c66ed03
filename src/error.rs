//! Error types for the Apollo Studio provider.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors returned by registry operations and the check workflow.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The registry answered with a non-success HTTP status.
    #[error("Unexpected HTTP status {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The response body, as text.
        body: String,
    },

    /// The GraphQL response carried one or more errors.
    #[error("GraphQL error: {}", .0.join("; "))]
    GraphQl(Vec<String>),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The response decoded but did not have the expected shape.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The registry refused the schema check submission.
    #[error("Check rejected: {0}")]
    Rejected(Rejection),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// The poll deadline elapsed before the workflow completed.
    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// The requested registry object does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A graph or subgraph reference could not be parsed.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Broad classification of a [`RegistryError`], used by callers to pick a
/// retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or server-side failure; the caller may retry the operation.
    Transport,
    /// The server refused the request; retrying will not help.
    Rejection,
    /// The caller aborted the operation.
    Cancellation,
    /// The target object does not exist.
    NotFound,
    /// Bad input or configuration on the client side.
    Invalid,
}

impl RegistryError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(_)
            | Self::Status { .. }
            | Self::GraphQl(_)
            | Self::Serialization(_)
            | Self::UnexpectedResponse(_) => ErrorKind::Transport,
            Self::Rejected(_) => ErrorKind::Rejection,
            Self::Cancelled | Self::DeadlineExceeded(_) => ErrorKind::Cancellation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidReference(_) | Self::Configuration(_) => ErrorKind::Invalid,
        }
    }

    /// Whether the caller may retry the whole operation.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// Whether the operation was aborted by cancellation or deadline.
    pub fn is_aborted(&self) -> bool {
        self.kind() == ErrorKind::Cancellation
    }

    /// Get the error message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Http(msg)
            | Self::UnexpectedResponse(msg)
            | Self::NotFound(msg)
            | Self::InvalidReference(msg)
            | Self::Configuration(msg) => msg.clone(),
            Self::Status { body, .. } => body.clone(),
            Self::GraphQl(messages) => messages.join("; "),
            Self::Serialization(err) => err.to_string(),
            Self::Rejected(rejection) => rejection.message.clone(),
            Self::Cancelled => "operation cancelled".to_string(),
            Self::DeadlineExceeded(after) => format!("deadline exceeded after {:?}", after),
        }
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        RegistryError::Http(err.to_string())
    }
}

/// Why the registry refused a check submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// The check input was invalid.
    InvalidInput,
    /// The API key lacks permission to run checks on the graph.
    PermissionDenied,
    /// The check could not be planned (for example, plan limits).
    Plan,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput => f.write_str("invalid input"),
            Self::PermissionDenied => f.write_str("permission denied"),
            Self::Plan => f.write_str("plan error"),
        }
    }
}

/// A semantic rejection of a check submission, with the server's reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// The rejection category.
    pub kind: RejectionKind,
    /// The message the server attached.
    pub message: String,
}

impl Rejection {
    /// Create a new rejection.
    pub fn new(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result alias used across the crate.
pub type Result<T, E = RegistryError> = std::result::Result<T, E>;
