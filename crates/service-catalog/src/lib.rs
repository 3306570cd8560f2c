//! # Service Catalog
//!
//! Static catalog of deployable central-tier services, the profile and
//! include/exclude selection algebra, the persisted selection (`plan.yaml`)
//! and per-service compose fragments.
//!
//! ```no_run
//! use service_catalog::{Catalog, Selection};
//!
//! let catalog = Catalog::load()?;
//! let specs = Selection::profile("control").resolve(&catalog)?;
//! print!("{}", service_catalog::summarize_selection(&specs));
//! # Ok::<(), service_catalog::CatalogError>(())
//! ```

#![warn(missing_docs)]

use std::path::PathBuf;
use thiserror::Error;

pub mod catalog;
pub mod compose;
pub mod fragments;
pub mod plan;
pub mod selection;

pub use catalog::{Catalog, HealthSpec, ServiceSpec};
pub use compose::{ComposeAction, compose_args, compose_command, stop_commands};
pub use fragments::{FragmentReport, fragment_file_name, generate_fragments};
pub use plan::{Plan, load_plan, resolve_service_list, save_plan};
pub use selection::{Selection, parse_list, summarize_selection};

/// Catalog error types
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Failed to read or write a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse or render YAML
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Profile is not defined in the catalog
    #[error("unknown profile: {0}")]
    UnknownProfile(String),

    /// Service is not defined in the catalog
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// Refused to overwrite a generated file
    #[error("file exists: {} (use --overwrite)", .0.display())]
    FileExists(PathBuf),

    /// Catalog definitions are inconsistent
    #[error("invalid catalog: {0}")]
    Invalid(String),
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;
