//! Per-host port ownership tracking

use std::collections::BTreeMap;

use crate::{ManifestError, Result};

/// Default ports of infrastructure components
pub mod infra {
    /// Postgres
    pub const POSTGRES: u16 = 5432;
    /// ClickHouse native protocol
    pub const CLICKHOUSE: u16 = 9000;
    /// Redis
    pub const REDIS: u16 = 6379;
    /// ZooKeeper client port
    pub const ZOOKEEPER: u16 = 2181;
    /// Kafka listener
    pub const KAFKA: u16 = 9092;
}

/// Registry of `(host, port) -> owner` claims.
///
/// The same owner may claim a port twice (a service listed under both `host`
/// and `hosts`), a second owner may not.
#[derive(Debug, Default)]
pub struct PortRegistry {
    claims: BTreeMap<(String, u16), String>,
}

impl PortRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `port` on `host` for `owner`
    pub fn claim(&mut self, host: &str, port: u16, owner: impl Into<String>) -> Result<()> {
        let owner = owner.into();
        match self.claims.get(&(host.to_string(), port)) {
            Some(existing) if *existing != owner => Err(ManifestError::ValidationError(format!(
                "port {} on host '{}' claimed by both {} and {}",
                port, host, existing, owner
            ))),
            Some(_) => Ok(()),
            None => {
                self.claims.insert((host.to_string(), port), owner);
                Ok(())
            }
        }
    }

    /// Owner of a port, if claimed
    pub fn owner(&self, host: &str, port: u16) -> Option<&str> {
        self.claims
            .get(&(host.to_string(), port))
            .map(String::as_str)
    }

    /// Number of claims
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Returns true if nothing was claimed
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims() {
        let mut reg = PortRegistry::new();
        reg.claim("core-1", 5432, "postgres").unwrap();
        reg.claim("core-1", 5432, "postgres").unwrap();
        reg.claim("core-2", 5432, "service:bridge").unwrap();
        assert_eq!(reg.owner("core-1", 5432), Some("postgres"));
        assert_eq!(reg.len(), 2);

        let err = reg.claim("core-1", 5432, "service:bridge").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("port 5432"));
        assert!(msg.contains("postgres"));
        assert!(msg.contains("service:bridge"));
    }
}
