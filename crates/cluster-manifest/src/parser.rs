//! Manifest loading

use std::path::Path;
use tracing::debug;

use crate::defaults::{ServiceDefaults, ServiceDefinitions};
use crate::types::Manifest;
use crate::validate::validate;
use crate::Result;

/// Parse a cluster manifest file and validate it against the builtin
/// service definitions
pub fn parse_file(path: impl AsRef<Path>) -> Result<Manifest> {
    parse_file_with(path, &ServiceDefinitions::builtin())
}

/// Parse a cluster manifest file with a caller-supplied defaults registry
pub fn parse_file_with(path: impl AsRef<Path>, defaults: &dyn ServiceDefaults) -> Result<Manifest> {
    let path = path.as_ref();
    debug!("Loading manifest from {}", path.display());
    let content = std::fs::read_to_string(path)?;
    parse_str_with(&content, defaults)
}

/// Parse a cluster manifest from a string
pub fn parse_str(content: &str) -> Result<Manifest> {
    parse_str_with(content, &ServiceDefinitions::builtin())
}

/// Parse a cluster manifest from a string with a caller-supplied defaults registry
pub fn parse_str_with(content: &str, defaults: &dyn ServiceDefaults) -> Result<Manifest> {
    let manifest = load_unchecked(content)?;
    validate(&manifest, defaults)?;
    Ok(manifest)
}

/// Parse without validating
pub fn load_unchecked(content: &str) -> Result<Manifest> {
    Ok(serde_yaml::from_str(content)?)
}
