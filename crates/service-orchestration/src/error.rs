//! Error types for planning and execution

use thiserror::Error;

/// Error types for orchestration operations
#[derive(Error, Debug)]
pub enum Error {
    /// Manifest failed validation before planning
    #[error("Validation error: {0}")]
    Validation(String),

    /// The task graph could not be built or ordered
    #[error("Planning error: {0}")]
    Planning(String),

    /// A task failed while running
    #[error("Execution error: {0}")]
    Execution(String),

    /// A backend could not be selected or reported a failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Command executor errors
    #[error("Command execution error: {0}")]
    CommandExecutor(#[from] command_executor::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML rendering or parsing failed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The run was cancelled
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Planning error helper
    pub fn planning(msg: impl Into<String>) -> Self {
        Self::Planning(msg.into())
    }

    /// Backend error helper
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Execution error helper
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }
}

impl From<cluster_manifest::ManifestError> for Error {
    fn from(err: cluster_manifest::ManifestError) -> Self {
        match err.validation_message() {
            Some(msg) => Self::Validation(msg.to_string()),
            None => Self::Validation(err.to_string()),
        }
    }
}

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, Error>;
