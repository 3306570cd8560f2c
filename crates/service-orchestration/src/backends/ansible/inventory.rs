//! INI inventory generation

use cluster_manifest::Manifest;
use std::collections::{BTreeMap, BTreeSet};

/// Group every infrastructure host joins
pub const INFRASTRUCTURE_GROUP: &str = "infrastructure";

/// A host entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryHost {
    pub name: String,
    pub address: String,
    pub vars: BTreeMap<String, String>,
}

/// A named group of hosts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryGroup {
    pub name: String,
    pub hosts: Vec<String>,
    pub vars: BTreeMap<String, String>,
    pub children: Vec<String>,
}

/// Ansible inventory
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    hosts: BTreeMap<String, InventoryHost>,
    groups: BTreeMap<String, InventoryGroup>,
}

impl InventoryHost {
    fn line(&self) -> String {
        let mut parts = vec![self.name.clone()];
        if !self.address.is_empty() && self.address != self.name {
            parts.push(format!("ansible_host={}", self.address));
        }
        for (k, v) in &self.vars {
            parts.push(format!("{}={}", k, v));
        }
        parts.join(" ")
    }
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a host
    pub fn add_host(&mut self, host: InventoryHost) {
        self.hosts.insert(host.name.clone(), host);
    }

    /// Add or replace a group
    pub fn add_group(&mut self, group: InventoryGroup) {
        self.groups.insert(group.name.clone(), group);
    }

    pub fn host(&self, name: &str) -> Option<&InventoryHost> {
        self.hosts.get(name)
    }

    pub fn group(&self, name: &str) -> Option<&InventoryGroup> {
        self.groups.get(name)
    }

    fn ungrouped(&self) -> Vec<&InventoryHost> {
        let grouped: BTreeSet<&str> = self
            .groups
            .values()
            .flat_map(|g| g.hosts.iter().map(String::as_str))
            .collect();
        self.hosts
            .values()
            .filter(|h| !grouped.contains(h.name.as_str()))
            .collect()
    }

    /// Render in INI format
    pub fn to_ini(&self) -> String {
        let mut lines = Vec::new();

        let ungrouped = self.ungrouped();
        if !ungrouped.is_empty() {
            lines.extend(ungrouped.iter().map(|h| h.line()));
            lines.push(String::new());
        }

        for (name, group) in &self.groups {
            lines.push(format!("[{}]", name));
            lines.extend(
                group
                    .hosts
                    .iter()
                    .filter_map(|h| self.hosts.get(h))
                    .map(InventoryHost::line),
            );
            if !group.vars.is_empty() {
                lines.push(String::new());
                lines.push(format!("[{}:vars]", name));
                lines.extend(group.vars.iter().map(|(k, v)| format!("{}={}", k, v)));
            }
            if !group.children.is_empty() {
                lines.push(String::new());
                lines.push(format!("[{}:children]", name));
                lines.extend(group.children.iter().cloned());
            }
            lines.push(String::new());
        }

        lines.join("\n")
    }

    /// Inventory of every manifest host, grouped by role
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut inventory = Self::new();
        let mut roles: BTreeMap<&str, Vec<String>> = BTreeMap::new();

        for (name, host) in &manifest.hosts {
            let mut vars = BTreeMap::new();
            if !host.user.is_empty() {
                vars.insert("ansible_user".to_string(), host.user.clone());
            }
            if let Some(key) = host.ssh_key.as_deref().filter(|k| !k.is_empty()) {
                vars.insert("ansible_ssh_private_key_file".to_string(), key.to_string());
            }
            for (k, v) in &host.labels {
                vars.insert(format!("label_{}", k), v.clone());
            }
            inventory.add_host(InventoryHost {
                name: name.clone(),
                address: host.address.clone(),
                vars,
            });

            for role in &host.roles {
                let members = roles.entry(role.as_str()).or_default();
                if !members.contains(name) {
                    members.push(name.clone());
                }
            }
        }

        for (role, hosts) in roles {
            inventory.add_group(InventoryGroup {
                name: role.to_string(),
                hosts,
                ..Default::default()
            });
        }
        inventory
    }
}
