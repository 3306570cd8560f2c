//! Embedded catalog definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::{CatalogError, Result};

const DEFINITIONS: &str = include_str!("definitions.yaml");

static BUILTIN: OnceLock<std::result::Result<Catalog, String>> = OnceLock::new();

/// How a service is probed once running
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSpec {
    /// Checker protocol tag
    pub protocol: String,
    /// HTTP path, when the protocol uses one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Probed port
    pub port: u16,
}

/// A deployable service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Catalog name, filled from the map key
    #[serde(default)]
    pub name: String,
    /// Deploy slug when different from the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<String>,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Role tag
    pub role: String,
    /// Container image
    pub image: String,
    /// Port mappings (`host:container`)
    #[serde(default)]
    pub ports: Vec<String>,
    /// Health probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthSpec>,
    /// Services this one needs
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ServiceSpec {
    /// Deploy slug, the name unless overridden
    pub fn deploy_name(&self) -> &str {
        self.deploy.as_deref().unwrap_or(&self.name)
    }
}

/// Profiles and services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    /// Profile name to service names
    pub profiles: BTreeMap<String, Vec<String>>,
    /// Service name to spec
    pub services: BTreeMap<String, ServiceSpec>,
}

impl Catalog {
    /// The definitions compiled into the binary, parsed on first use
    pub fn load() -> Result<&'static Self> {
        BUILTIN
            .get_or_init(|| Self::from_yaml(DEFINITIONS).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| CatalogError::Invalid(e.clone()))
    }

    /// Parse catalog definitions and check profile references
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut catalog: Catalog = serde_yaml::from_str(content)?;
        for (name, spec) in catalog.services.iter_mut() {
            spec.name = name.clone();
        }

        for (profile, names) in &catalog.profiles {
            if let Some(missing) = names.iter().find(|n| !catalog.services.contains_key(*n)) {
                return Err(CatalogError::Invalid(format!(
                    "profile '{}' references unknown service '{}'",
                    profile, missing
                )));
            }
        }
        Ok(catalog)
    }

    /// Service names of a profile
    pub fn profile(&self, name: &str) -> Option<&[String]> {
        self.profiles.get(name).map(Vec::as_slice)
    }

    /// Look up a service
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.get(name)
    }
}
