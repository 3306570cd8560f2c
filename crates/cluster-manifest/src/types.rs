//! Cluster manifest data model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
    /// A central cluster with infrastructure and platform services
    Cluster,
    /// A fleet of edge nodes
    Edge,
}

/// How a component is deployed on its host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// Container managed through docker compose
    #[default]
    Docker,
    /// Binary managed by systemd
    Native,
}

impl DeployMode {
    /// Lowercase name as written in manifests
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployMode::Docker => "docker",
            DeployMode::Native => "native",
        }
    }
}

impl std::fmt::Display for DeployMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root of a `cluster.yaml` document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest schema version
    #[serde(default)]
    pub version: String,

    /// `cluster` or `edge`; kept optional so a missing value is reported by validation
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    /// Deployment profile, also used as the default cluster id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Target machines keyed by name
    #[serde(default)]
    pub hosts: BTreeMap<String, Host>,

    /// WireGuard mesh settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wireguard: Option<WireGuardConfig>,

    /// Infrastructure components
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Platform services keyed by name
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,

    /// User-facing interfaces keyed by name
    #[serde(default)]
    pub interfaces: BTreeMap<String, ServiceConfig>,

    /// Observability stack keyed by name
    #[serde(default)]
    pub observability: BTreeMap<String, ServiceConfig>,
}

impl Manifest {
    /// Parsed manifest kind, if the `type` field holds a known value
    pub fn manifest_kind(&self) -> Option<ManifestKind> {
        match self.kind.as_deref() {
            Some("cluster") => Some(ManifestKind::Cluster),
            Some("edge") => Some(ManifestKind::Edge),
            _ => None,
        }
    }

    /// Look up a host by name
    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.get(name)
    }

    /// Enabled entries of `services`, in name order
    pub fn enabled_services(&self) -> impl Iterator<Item = (&String, &ServiceConfig)> {
        self.services.iter().filter(|(_, s)| s.enabled)
    }

    /// Enabled entries of `interfaces`, in name order
    pub fn enabled_interfaces(&self) -> impl Iterator<Item = (&String, &ServiceConfig)> {
        self.interfaces.iter().filter(|(_, s)| s.enabled)
    }

    /// Enabled entries of `observability`, in name order
    pub fn enabled_observability(&self) -> impl Iterator<Item = (&String, &ServiceConfig)> {
        self.observability.iter().filter(|(_, s)| s.enabled)
    }
}

/// A target machine
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Host {
    /// Address used for SSH and health checks
    pub address: String,

    /// Public address, when different from `address`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ip: Option<String>,

    /// SSH user
    #[serde(default)]
    pub user: String,

    /// SSH private key path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,

    /// Role tags, used for inventory grouping
    #[serde(default)]
    pub roles: Vec<String>,

    /// Free-form labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// WireGuard mesh configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireGuardConfig {
    /// Whether the mesh is managed
    #[serde(default)]
    pub enabled: bool,
    /// Interface name, e.g. `wg0`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// Write peer names into `/etc/hosts`
    #[serde(default)]
    pub manage_hosts_file: bool,
    /// Mesh peers
    #[serde(default)]
    pub peers: Vec<WireGuardPeer>,
}

/// A peer in the WireGuard mesh
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireGuardPeer {
    /// Peer name
    pub name: String,
    /// Peer public key
    pub public_key: String,
    /// `host:port` endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Routed CIDRs
    #[serde(default)]
    pub allowed_ips: Vec<String>,
}

/// Infrastructure components, each optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfrastructureConfig {
    /// Postgres or YugabyteDB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresConfig>,
    /// Named Redis instances
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConfig>,
    /// ZooKeeper ensemble
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zookeeper: Option<ZookeeperConfig>,
    /// Kafka brokers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kafka: Option<KafkaConfig>,
    /// ClickHouse server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clickhouse: Option<ClickHouseConfig>,
}

impl InfrastructureConfig {
    /// Postgres config when enabled
    pub fn postgres(&self) -> Option<&PostgresConfig> {
        self.postgres.as_ref().filter(|c| c.enabled)
    }

    /// Redis config when enabled
    pub fn redis(&self) -> Option<&RedisConfig> {
        self.redis.as_ref().filter(|c| c.enabled)
    }

    /// ZooKeeper config when enabled
    pub fn zookeeper(&self) -> Option<&ZookeeperConfig> {
        self.zookeeper.as_ref().filter(|c| c.enabled)
    }

    /// Kafka config when enabled
    pub fn kafka(&self) -> Option<&KafkaConfig> {
        self.kafka.as_ref().filter(|c| c.enabled)
    }

    /// ClickHouse config when enabled
    pub fn clickhouse(&self) -> Option<&ClickHouseConfig> {
        self.clickhouse.as_ref().filter(|c| c.enabled)
    }
}

/// Postgres / YugabyteDB configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Whether to provision it
    #[serde(default)]
    pub enabled: bool,
    /// Deployment mode
    #[serde(default)]
    pub mode: Option<DeployMode>,
    /// Server version
    #[serde(default)]
    pub version: String,
    /// Host name from `hosts`
    #[serde(default)]
    pub host: String,
    /// Listen port, default 5432
    #[serde(default)]
    pub port: Option<u16>,
    /// Databases to create
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,
    /// Server settings passed through to the configuration role
    #[serde(default)]
    pub tuning: BTreeMap<String, String>,
}

/// A Postgres database and its owner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database name
    pub name: String,
    /// Owning role
    #[serde(default)]
    pub owner: String,
}

/// ZooKeeper ensemble configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZookeeperConfig {
    /// Whether to provision it
    #[serde(default)]
    pub enabled: bool,
    /// Deployment mode
    #[serde(default)]
    pub mode: Option<DeployMode>,
    /// Server version
    #[serde(default)]
    pub version: String,
    /// Ensemble members
    #[serde(default)]
    pub ensemble: Vec<ZookeeperNode>,
}

/// One ZooKeeper ensemble member
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZookeeperNode {
    /// Host name from `hosts`
    pub host: String,
    /// `myid` of the member
    pub id: u32,
    /// Client port, default 2181
    #[serde(default)]
    pub port: Option<u16>,
}

/// Kafka cluster configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Whether to provision it
    #[serde(default)]
    pub enabled: bool,
    /// Deployment mode
    #[serde(default)]
    pub mode: Option<DeployMode>,
    /// Broker version
    #[serde(default)]
    pub version: String,
    /// Brokers
    #[serde(default)]
    pub brokers: Vec<KafkaBroker>,
    /// Explicit ZooKeeper connect string
    #[serde(default)]
    pub zookeeper_connect: String,
    /// Topics to create
    #[serde(default)]
    pub topics: Vec<KafkaTopic>,
}

/// A Kafka broker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KafkaBroker {
    /// Host name from `hosts`
    pub host: String,
    /// Broker id
    pub id: u32,
    /// Listener port, default 9092
    #[serde(default)]
    pub port: Option<u16>,
}

/// A Kafka topic
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KafkaTopic {
    /// Topic name
    pub name: String,
    /// Partition count
    #[serde(default)]
    pub partitions: u32,
    /// Replication factor
    #[serde(default)]
    pub replication_factor: u32,
    /// Topic-level configuration
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// ClickHouse configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    /// Whether to provision it
    #[serde(default)]
    pub enabled: bool,
    /// Deployment mode
    #[serde(default)]
    pub mode: Option<DeployMode>,
    /// Server version
    #[serde(default)]
    pub version: String,
    /// Host name from `hosts`
    #[serde(default)]
    pub host: String,
    /// Native protocol port, default 9000
    #[serde(default)]
    pub port: Option<u16>,
    /// Databases to create
    #[serde(default)]
    pub databases: Vec<String>,
}

/// Redis configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Whether to provision it
    #[serde(default)]
    pub enabled: bool,
    /// Deployment mode
    #[serde(default)]
    pub mode: Option<DeployMode>,
    /// Server version, e.g. `7`
    #[serde(default)]
    pub version: String,
    /// Named instances
    #[serde(default)]
    pub instances: Vec<RedisInstance>,
}

/// A single named Redis instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisInstance {
    /// Instance name, e.g. `foghorn`
    pub name: String,
    /// Host name from `hosts`
    pub host: String,
    /// Listen port, default 6379
    #[serde(default)]
    pub port: Option<u16>,
    /// AUTH password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Server settings such as `maxmemory`
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// A platform service, interface or observability component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Whether to provision it
    #[serde(default)]
    pub enabled: bool,
    /// Deployment mode
    #[serde(default)]
    pub mode: Option<DeployMode>,
    /// Version tag
    #[serde(default)]
    pub version: String,
    /// Container image for docker mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Binary download URL for native mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_url: Option<String>,
    /// Underlying deploy slug (container or binary name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<String>,
    /// Single host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Multiple hosts, for replicas
    #[serde(default)]
    pub hosts: Vec<String>,
    /// HTTP port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// gRPC port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_port: Option<u16>,
    /// Replica count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    /// Environment file passed to the container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<String>,
    /// Names of services this one depends on
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Has a public-facing endpoint
    #[serde(default)]
    pub public: bool,
    /// Service-specific settings
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl ServiceConfig {
    /// Every host this entry is placed on, `host` first, without duplicates
    pub fn target_hosts(&self) -> Vec<&str> {
        let mut hosts: Vec<&str> = Vec::with_capacity(self.hosts.len() + 1);
        for h in self.host.iter().chain(self.hosts.iter()) {
            if !h.is_empty() && !hosts.contains(&h.as_str()) {
                hosts.push(h);
            }
        }
        hosts
    }

    /// Deployment mode, docker when unset
    pub fn resolved_mode(&self) -> DeployMode {
        self.mode.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_hosts_dedups_and_keeps_order() {
        let svc = ServiceConfig {
            host: Some("a".into()),
            hosts: vec!["b".into(), "a".into(), "c".into()],
            ..Default::default()
        };
        assert_eq!(svc.target_hosts(), vec!["a", "b", "c"]);
        assert!(ServiceConfig::default().target_hosts().is_empty());
    }

    #[test]
    fn test_manifest_kind() {
        let mut m = Manifest {
            kind: Some("cluster".into()),
            ..Default::default()
        };
        assert_eq!(m.manifest_kind(), Some(ManifestKind::Cluster));
        m.kind = Some("mesh".into());
        assert_eq!(m.manifest_kind(), None);
    }
}
