//! Service-definitions registry
//!
//! Default ports, deploy slugs and health endpoints for every known service.
//! The validator, the planner and the catalog take a `&dyn ServiceDefaults`
//! instead of reading a global table, so tests can substitute their own.

use std::collections::HashMap;

/// Lookup of per-service defaults, keyed by canonical service name
pub trait ServiceDefaults: Send + Sync {
    /// Default HTTP port
    fn default_port(&self, name: &str) -> Option<u16>;

    /// Default gRPC port
    fn default_grpc_port(&self, name: &str) -> Option<u16>;

    /// Health endpoint path, `None` for services probed over plain TCP
    fn health_path(&self, name: &str) -> Option<&str>;

    /// Probe protocol (`http`, `grpc` or `tcp`)
    fn health_protocol(&self, name: &str) -> Option<&str>;

    /// Deploy slug, honouring an explicit override
    fn deploy_name(&self, name: &str, override_name: Option<&str>) -> Option<String>;
}

/// Static definition of one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    /// Canonical name
    pub id: &'static str,
    /// Container or binary slug
    pub deploy: &'static str,
    /// HTTP port
    pub port: u16,
    /// gRPC port when the service exposes one
    pub grpc_port: Option<u16>,
    /// Health endpoint path
    pub health_path: Option<&'static str>,
    /// Probe protocol
    pub health_protocol: &'static str,
    /// Role tag
    pub role: &'static str,
}

const fn def(
    id: &'static str,
    deploy: &'static str,
    port: u16,
    grpc_port: Option<u16>,
    health_path: Option<&'static str>,
    health_protocol: &'static str,
    role: &'static str,
) -> ServiceDefinition {
    ServiceDefinition {
        id,
        deploy,
        port,
        grpc_port,
        health_path,
        health_protocol,
        role,
    }
}

const HEALTH: Option<&str> = Some("/health");

const BUILTIN: &[ServiceDefinition] = &[
    // Control plane
    def("bridge", "bridge", 18000, None, HEALTH, "http", "control"),
    def("commodore", "commodore", 18001, Some(19001), HEALTH, "http", "control"),
    def("quartermaster", "quartermaster", 18002, Some(19002), HEALTH, "http", "control"),
    def("purser", "purser", 18003, Some(19003), HEALTH, "http", "control"),
    // Analytics
    def("periscope-query", "periscope-query", 18004, Some(19004), HEALTH, "http", "analytics"),
    def("periscope-ingest", "periscope-ingest", 18005, None, HEALTH, "http", "analytics"),
    // Routing
    def("decklog", "decklog", 18006, Some(18006), HEALTH, "grpc", "routing"),
    def("helmsman", "helmsman", 18007, None, HEALTH, "http", "routing"),
    def("foghorn", "foghorn", 18008, Some(18019), HEALTH, "http", "routing"),
    def("signalman", "signalman", 18009, Some(19005), HEALTH, "http", "routing"),
    // Infra services
    def("navigator", "navigator", 18010, None, HEALTH, "http", "infra"),
    def("privateer", "privateer", 18012, None, HEALTH, "http", "mesh"),
    // Interfaces
    def("chartroom", "webapp", 18030, None, HEALTH, "http", "interface"),
    def("foredeck", "website", 18031, None, HEALTH, "http", "interface"),
    def("steward", "forms", 18032, None, HEALTH, "http", "support"),
    def("logbook", "docs", 18033, None, HEALTH, "http", "interface"),
    // Infra dependencies
    def("postgres", "postgres", 5432, None, None, "tcp", "infra"),
    def("kafka", "kafka", 9092, None, None, "tcp", "infra"),
    def("zookeeper", "zookeeper", 2181, None, None, "tcp", "infra"),
    def("clickhouse", "clickhouse", 9000, None, None, "tcp", "infra"),
    def("listmonk", "listmonk", 9001, None, HEALTH, "http", "support"),
    def("nginx", "nginx", 18090, None, None, "http", "interface"),
    def("caddy", "caddy", 18090, None, None, "http", "interface"),
    // Observability
    def("prometheus", "prometheus", 9090, None, Some("/-/healthy"), "http", "observability"),
    def("grafana", "grafana", 3000, None, Some("/api/health"), "http", "observability"),
    def("metabase", "metabase", 3001, None, Some("/api/health"), "http", "observability"),
];

/// Table-backed [`ServiceDefaults`]
#[derive(Debug, Clone)]
pub struct ServiceDefinitions {
    by_id: HashMap<&'static str, ServiceDefinition>,
}

impl ServiceDefinitions {
    /// The definitions shipped with the platform
    pub fn builtin() -> Self {
        Self::from_definitions(BUILTIN.iter().cloned())
    }

    /// Build a registry from arbitrary definitions
    pub fn from_definitions(defs: impl IntoIterator<Item = ServiceDefinition>) -> Self {
        Self {
            by_id: defs.into_iter().map(|d| (d.id, d)).collect(),
        }
    }

    /// Full definition for a service
    pub fn lookup(&self, name: &str) -> Option<&ServiceDefinition> {
        self.by_id.get(name)
    }

    /// All known service names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.by_id.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for ServiceDefinitions {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ServiceDefaults for ServiceDefinitions {
    fn default_port(&self, name: &str) -> Option<u16> {
        self.lookup(name).map(|d| d.port)
    }

    fn default_grpc_port(&self, name: &str) -> Option<u16> {
        self.lookup(name).and_then(|d| d.grpc_port)
    }

    fn health_path(&self, name: &str) -> Option<&str> {
        self.lookup(name).and_then(|d| d.health_path)
    }

    fn health_protocol(&self, name: &str) -> Option<&str> {
        self.lookup(name).map(|d| d.health_protocol)
    }

    fn deploy_name(&self, name: &str, override_name: Option<&str>) -> Option<String> {
        match override_name.filter(|o| !o.is_empty()) {
            Some(o) => Some(o.to_string()),
            None => self.lookup(name).map(|d| d.deploy.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookups() {
        let defs = ServiceDefinitions::builtin();
        assert_eq!(defs.default_port("bridge"), Some(18000));
        assert_eq!(defs.default_grpc_port("quartermaster"), Some(19002));
        assert_eq!(defs.default_grpc_port("bridge"), None);
        assert_eq!(defs.health_path("grafana"), Some("/api/health"));
        assert_eq!(defs.health_path("postgres"), None);
        assert_eq!(defs.default_port("unknown"), None);
    }

    #[test]
    fn test_deploy_name_override() {
        let defs = ServiceDefinitions::builtin();
        assert_eq!(defs.deploy_name("chartroom", None).as_deref(), Some("webapp"));
        assert_eq!(defs.deploy_name("chartroom", Some("")).as_deref(), Some("webapp"));
        assert_eq!(defs.deploy_name("chartroom", Some("ui")).as_deref(), Some("ui"));
        assert_eq!(defs.deploy_name("custom", Some("custom-x")).as_deref(), Some("custom-x"));
        assert_eq!(defs.deploy_name("custom", None), None);
    }
}
