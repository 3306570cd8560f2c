//! Persisted selection (`plan.yaml`)

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::Result;
use crate::catalog::ServiceSpec;
use crate::fragments::{FRAGMENT_PREFIX, FRAGMENT_SUFFIX};

/// File name of the persisted plan
pub const PLAN_FILE: &str = "plan.yaml";

/// A resolved selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Originating profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Selected service names, sorted
    #[serde(default)]
    pub services: Vec<String>,
}

impl Plan {
    /// Plan for a set of specs
    pub fn new(specs: &[ServiceSpec], profile: Option<&str>) -> Self {
        let mut services: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
        services.sort();
        services.dedup();
        Self {
            profile: profile.filter(|p| !p.is_empty()).map(String::from),
            services,
        }
    }
}

/// Write `<dir>/plan.yaml`
pub fn save_plan(dir: impl AsRef<Path>, specs: &[ServiceSpec], profile: Option<&str>) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let plan = Plan::new(specs, profile);
    std::fs::write(dir.join(PLAN_FILE), serde_yaml::to_string(&plan)?)?;
    Ok(())
}

/// Read `<dir>/plan.yaml`, `None` if it does not exist
pub fn load_plan(dir: impl AsRef<Path>) -> Result<Option<Plan>> {
    let path = dir.as_ref().join(PLAN_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(serde_yaml::from_str(&content)?))
}

fn scan_fragments(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if !dir.is_dir() {
        return Ok(names);
    }
    for entry in std::fs::read_dir(dir)? {
        let file_name = entry?.file_name();
        let file_name = file_name.to_string_lossy();
        if let Some(name) = file_name
            .strip_prefix(FRAGMENT_PREFIX)
            .and_then(|rest| rest.strip_suffix(FRAGMENT_SUFFIX))
            .filter(|n| !n.is_empty())
        {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Services to operate on: the explicit selection, else the plan file, else
/// every `svc-*.yml` fragment in `dir`
pub fn resolve_service_list(dir: impl AsRef<Path>, selected: &[String]) -> Result<Vec<String>> {
    let explicit: Vec<String> = selected
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if !explicit.is_empty() {
        return Ok(explicit);
    }

    let dir = dir.as_ref();
    if let Some(plan) = load_plan(dir)? {
        if !plan.services.is_empty() {
            debug!("Using {} services from {}", plan.services.len(), PLAN_FILE);
            return Ok(plan.services);
        }
    }

    debug!("No plan in {}, scanning fragments", dir.display());
    scan_fragments(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Catalog, Selection};

    #[test]
    fn test_plan_round_trip_and_resolution() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_plan(dir.path()).unwrap(), None);

        let catalog = Catalog::load().unwrap();
        let specs = Selection::profile("control").resolve(&catalog).unwrap();
        save_plan(dir.path(), &specs, Some("control")).unwrap();

        let plan = load_plan(dir.path()).unwrap().unwrap();
        assert_eq!(plan.profile.as_deref(), Some("control"));
        assert_eq!(
            plan.services,
            vec!["bridge", "commodore", "purser", "quartermaster"]
        );

        assert_eq!(
            resolve_service_list(dir.path(), &[]).unwrap(),
            plan.services
        );
        assert_eq!(
            resolve_service_list(dir.path(), &[" foghorn ".into(), "".into()]).unwrap(),
            vec!["foghorn"]
        );
    }

    #[test]
    fn test_fragment_scan_fallback() {
        let dir = tempfile::tempdir().unwrap();
        for file in ["svc-purser.yml", "svc-bridge.yml", "notes.txt", "svc-.yml"] {
            std::fs::write(dir.path().join(file), "").unwrap();
        }
        assert_eq!(
            resolve_service_list(dir.path(), &[]).unwrap(),
            vec!["bridge", "purser"]
        );
    }

    #[test]
    fn test_missing_dir_resolves_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(resolve_service_list(&missing, &[]).unwrap().is_empty());
    }
}
