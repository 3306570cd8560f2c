//! Per-service compose fragments (`svc-<name>.yml`)

use cluster_manifest::ServiceDefaults;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::catalog::ServiceSpec;
use crate::{CatalogError, Result};

/// Fragment file name prefix
pub const FRAGMENT_PREFIX: &str = "svc-";
/// Fragment file name suffix
pub const FRAGMENT_SUFFIX: &str = ".yml";
/// Env file every fragment references
pub const ENV_FILE: &str = ".central.env";

/// Roles whose containers need volumes and config files wired by hand
const MANUAL_ROLES: &[&str] = &["observability"];

#[derive(Debug, Serialize)]
struct ComposeFile<'a> {
    services: IndexMap<&'a str, ComposeService<'a>>,
}

#[derive(Debug, Serialize)]
struct ComposeService<'a> {
    image: &'a str,
    container_name: String,
    restart: &'static str,
    env_file: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<String>,
}

/// What [`generate_fragments`] did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentReport {
    /// Files written
    pub written: Vec<PathBuf>,
    /// Services skipped, with the reason
    pub skipped: Vec<(String, String)>,
}

/// `svc-<name>.yml`
pub fn fragment_file_name(name: &str) -> String {
    format!("{}{}{}", FRAGMENT_PREFIX, name, FRAGMENT_SUFFIX)
}

fn ports_for(spec: &ServiceSpec, defaults: &dyn ServiceDefaults) -> Vec<String> {
    if !spec.ports.is_empty() {
        return spec.ports.clone();
    }
    defaults
        .default_port(&spec.name)
        .into_iter()
        .chain(defaults.default_grpc_port(&spec.name))
        .map(|p| format!("{}:{}", p, p))
        .fold(Vec::new(), |mut acc, p| {
            if !acc.contains(&p) {
                acc.push(p);
            }
            acc
        })
}

/// Render the compose document for one service
pub fn render_fragment(spec: &ServiceSpec, defaults: &dyn ServiceDefaults) -> Result<String> {
    let mut services = IndexMap::new();
    services.insert(
        spec.name.as_str(),
        ComposeService {
            image: &spec.image,
            container_name: format!("frameworks-{}", spec.name),
            restart: "unless-stopped",
            env_file: vec![ENV_FILE],
            ports: ports_for(spec, defaults),
        },
    );
    Ok(serde_yaml::to_string(&ComposeFile { services })?)
}

/// Write one fragment per spec into `dir`.
///
/// Existing files are only replaced with `overwrite`; a conflict is reported
/// before anything is written. Services whose role needs manual wiring are
/// skipped and listed in the report.
pub fn generate_fragments(
    dir: impl AsRef<Path>,
    specs: &[ServiceSpec],
    overwrite: bool,
    defaults: &dyn ServiceDefaults,
) -> Result<FragmentReport> {
    let dir = dir.as_ref();
    let mut report = FragmentReport::default();
    let mut pending = Vec::with_capacity(specs.len());

    for spec in specs {
        if MANUAL_ROLES.contains(&spec.role.as_str()) {
            warn!(
                "Skipping {}: {} services need manual volume and config wiring",
                spec.name, spec.role
            );
            report.skipped.push((
                spec.name.clone(),
                format!("role '{}' requires manual wiring", spec.role),
            ));
            continue;
        }

        let path = dir.join(fragment_file_name(&spec.name));
        if path.exists() && !overwrite {
            return Err(CatalogError::FileExists(path));
        }
        pending.push((path, render_fragment(spec, defaults)?));
    }

    std::fs::create_dir_all(dir)?;
    for (path, content) in pending {
        std::fs::write(&path, content)?;
        info!("Wrote {}", path.display());
        report.written.push(path);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Catalog, Selection};
    use cluster_manifest::ServiceDefinitions;

    #[test]
    fn test_render_fragment() {
        let catalog = Catalog::load().unwrap();
        let spec = catalog.service("commodore").unwrap();
        let yaml = render_fragment(spec, &ServiceDefinitions::builtin()).unwrap();

        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let svc = &doc["services"]["commodore"];
        assert_eq!(svc["container_name"], "frameworks-commodore");
        assert_eq!(svc["restart"], "unless-stopped");
        assert_eq!(svc["env_file"][0], ".central.env");
        assert_eq!(svc["ports"][1], "19001:19001");
        assert!(yaml.find("image").unwrap() < yaml.find("container_name").unwrap());
    }

    #[test]
    fn test_ports_fall_back_to_defaults() {
        let mut spec = Catalog::load().unwrap().service("quartermaster").unwrap().clone();
        spec.ports.clear();
        assert_eq!(
            ports_for(&spec, &ServiceDefinitions::builtin()),
            vec!["18002:18002", "19002:19002"]
        );
    }

    #[test]
    fn test_observability_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::load().unwrap();
        let specs = Selection::default()
            .include(["bridge", "grafana", "prometheus"])
            .resolve(&catalog)
            .unwrap();

        let report =
            generate_fragments(dir.path(), &specs, false, &ServiceDefinitions::builtin()).unwrap();
        assert_eq!(report.written, vec![dir.path().join("svc-bridge.yml")]);
        let skipped: Vec<&str> = report.skipped.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(skipped, vec!["grafana", "prometheus"]);
        assert!(!dir.path().join("svc-grafana.yml").exists());
    }

    #[test]
    fn test_existing_file_needs_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::load().unwrap();
        let specs = vec![catalog.service("bridge").unwrap().clone()];
        let defaults = ServiceDefinitions::builtin();

        generate_fragments(dir.path(), &specs, false, &defaults).unwrap();
        let err = generate_fragments(dir.path(), &specs, false, &defaults).unwrap_err();
        assert!(err.to_string().starts_with("file exists: "));
        assert!(err.to_string().ends_with("svc-bridge.yml (use --overwrite)"));

        generate_fragments(dir.path(), &specs, true, &defaults).unwrap();
    }

    #[test]
    fn test_conflict_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::load().unwrap();
        let defaults = ServiceDefinitions::builtin();
        let specs: Vec<ServiceSpec> = ["bridge", "commodore", "purser"]
            .iter()
            .map(|n| catalog.service(n).unwrap().clone())
            .collect();

        std::fs::write(dir.path().join("svc-purser.yml"), "hand edited\n").unwrap();
        let err = generate_fragments(dir.path(), &specs, false, &defaults).unwrap_err();
        assert!(matches!(err, CatalogError::FileExists(ref p) if p.ends_with("svc-purser.yml")));

        assert!(!dir.path().join("svc-bridge.yml").exists());
        assert!(!dir.path().join("svc-commodore.yml").exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("svc-purser.yml")).unwrap(),
            "hand edited\n"
        );
    }
}
