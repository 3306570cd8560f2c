//! Edge-node manifest (`edges.yaml`)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::types::DeployMode;
use crate::{ManifestError, Result};

/// Fleet of edge nodes sharing one domain setup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeManifest {
    /// Manifest schema version
    #[serde(default)]
    pub version: String,
    /// Must be `edge` when present
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Root domain for per-node subdomains
    #[serde(default)]
    pub root_domain: String,
    /// Shared load-balancer pool domain
    #[serde(default)]
    pub pool_domain: String,
    /// ACME account email
    #[serde(default)]
    pub email: String,
    /// Cluster the nodes register with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    /// Bootstrap token for node enrollment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_token: Option<String>,
    /// Fetch certificates from the control plane instead of ACME
    #[serde(default)]
    pub fetch_cert: bool,
    /// Default deployment mode for all nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<DeployMode>,
    /// Nodes to provision
    #[serde(default)]
    pub nodes: Vec<EdgeNode>,
}

/// A single edge node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeNode {
    /// Unique node name
    #[serde(default)]
    pub name: String,
    /// SSH target (`user@host`)
    #[serde(default)]
    pub ssh: String,
    /// SSH private key path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,
    /// Subdomain under `root_domain`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    /// Region used at registration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Extra labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Apply kernel tuning
    #[serde(default)]
    pub apply_tune: bool,
    /// Register the node with the control plane
    #[serde(default)]
    pub register_qm: bool,
    /// Per-node mode override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<DeployMode>,
}

impl EdgeNode {
    /// Effective mode: the node's own, else the manifest default, else docker
    pub fn resolved_mode(&self, manifest_default: Option<DeployMode>) -> DeployMode {
        self.mode.or(manifest_default).unwrap_or_default()
    }
}

impl EdgeManifest {
    /// Check required fields
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ManifestError::ValidationError(msg));

        if self.version.trim().is_empty() {
            return invalid("version is required".into());
        }
        if let Some(kind) = self.kind.as_deref().filter(|k| !k.is_empty() && *k != "edge") {
            return invalid(format!("type must be 'edge' or empty, got: {}", kind));
        }
        if self.root_domain.is_empty() && self.pool_domain.is_empty() {
            return invalid("at least one of root_domain or pool_domain is required".into());
        }
        if self.nodes.is_empty() {
            return invalid("at least one node is required".into());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if node.name.is_empty() {
                return invalid(format!("node[{}]: name is required", i));
            }
            if node.ssh.is_empty() {
                return invalid(format!("node '{}': ssh target is required", node.name));
            }
        }
        Ok(())
    }
}

/// Parse and validate an edge manifest file
pub fn parse_edge_file(path: impl AsRef<Path>) -> Result<EdgeManifest> {
    let content = std::fs::read_to_string(path)?;
    parse_edge_str(&content)
}

/// Parse and validate an edge manifest from a string
pub fn parse_edge_str(content: &str) -> Result<EdgeManifest> {
    let manifest: EdgeManifest = serde_yaml::from_str(content)?;
    manifest.validate()?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EDGES: &str = r#"
version: "1"
root_domain: example.com
email: ops@example.com
mode: native
nodes:
  - name: edge-us-east-1
    ssh: root@203.0.113.10
    apply_tune: true
  - name: edge-eu-1
    ssh: root@203.0.113.20
    mode: docker
"#;

    #[test]
    fn test_parse_edges() {
        let m = parse_edge_str(EDGES).unwrap();
        assert_eq!(m.nodes.len(), 2);
        assert!(m.nodes[0].apply_tune);
        assert_eq!(m.nodes[0].resolved_mode(m.mode), DeployMode::Native);
        assert_eq!(m.nodes[1].resolved_mode(m.mode), DeployMode::Docker);
        assert_eq!(EdgeNode::default().resolved_mode(None), DeployMode::Docker);
    }

    #[test]
    fn test_edge_validation_messages() {
        let mut m = parse_edge_str(EDGES).unwrap();

        m.nodes[1].ssh.clear();
        assert_eq!(
            m.validate().unwrap_err().to_string(),
            "Invalid configuration: node 'edge-eu-1': ssh target is required"
        );

        m.nodes[1].name.clear();
        assert!(m.validate().unwrap_err().to_string().contains("node[1]: name is required"));

        m.root_domain.clear();
        assert!(m.validate().unwrap_err().to_string().contains("root_domain or pool_domain"));

        m.version.clear();
        assert!(m.validate().unwrap_err().to_string().contains("version is required"));
    }
}
