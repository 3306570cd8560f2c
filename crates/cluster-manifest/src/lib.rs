//! # Cluster Manifest
//!
//! Declarative description of a deployment: which hosts run which
//! infrastructure components and platform services.
//!
//! This crate parses `cluster.yaml` and `edges.yaml` documents, validates
//! them (host references, Kafka wiring, port collisions) and carries the
//! service-definitions registry that supplies default ports and health
//! endpoints.
//!
//! ```no_run
//! use cluster_manifest::parse_file;
//!
//! let manifest = parse_file("cluster.yaml")?;
//! println!("{} hosts", manifest.hosts.len());
//! # Ok::<(), cluster_manifest::ManifestError>(())
//! ```

#![warn(missing_docs)]

use thiserror::Error;

pub mod defaults;
pub mod edge;
pub mod parser;
pub mod ports;
pub mod types;
pub mod validate;

pub use defaults::{ServiceDefaults, ServiceDefinition, ServiceDefinitions};
pub use edge::{EdgeManifest, EdgeNode, parse_edge_file, parse_edge_str};
pub use parser::{load_unchecked, parse_file, parse_file_with, parse_str, parse_str_with};
pub use ports::PortRegistry;
pub use types::*;
pub use validate::{resolve_zookeeper_connect, validate};

/// Manifest error types
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Failed to read manifest file
    #[error("Failed to read manifest file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Manifest is structurally invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl ManifestError {
    /// Validation message without the display prefix, if this is a validation error
    pub fn validation_message(&self) -> Option<&str> {
        match self {
            ManifestError::ValidationError(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, ManifestError>;
