use thiserror::Error;

use crate::core::task::NodeId;
use crate::schema::{FieldViolation, SchemaRef};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Agent binary not found: {0}")]
    AgentBinaryNotFound(String),

    #[error("Schema validation failed for {schema}: {}", describe_violations(.violations))]
    SchemaValidation {
        schema: SchemaRef,
        violations: Vec<FieldViolation>,
    },

    #[error("Agent execution failed: {0}")]
    AgentExecution(String),

    #[error("Search unavailable: {0}")]
    SearchUnavailable(String),

    #[error("Cyclic dependency detected at node '{node}'")]
    CyclicDependency { node: String },

    #[error("Incomplete input: missing {}", .missing.join(", "))]
    IncompleteInput { missing: Vec<String> },

    #[error("Node '{name}' ({node}) failed: {cause}")]
    NodeExecution {
        node: NodeId,
        name: String,
        cause: Box<Error>,
    },

    #[error("Upstream node '{name}' ({node}) failed")]
    UpstreamFailed { node: NodeId, name: String },

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Unknown node referenced: {0}")]
    UnknownNode(String),

    #[error("Worker pool is full (max: {max})")]
    WorkerPoolFull { max: usize },
}

impl Error {
    /// Whether the executor may re-prompt the agent after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::SchemaValidation { .. })
    }

    /// Whether this error aborts a pipeline run before any node executes.
    pub fn is_fatal_to_pipeline(&self) -> bool {
        matches!(
            self,
            Error::CyclicDependency { .. } | Error::EmptyInput(_) | Error::UnknownNode(_)
        )
    }
}

fn describe_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
