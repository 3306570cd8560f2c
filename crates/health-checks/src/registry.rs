//! Registry of checkers keyed by protocol tag

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::{
    CheckResult, Checker, ClickHouseChecker, HttpChecker, KafkaChecker, PostgresChecker,
    TcpChecker,
};

/// Registry that maps protocol tags to checkers
pub struct CheckerRegistry {
    checkers: HashMap<String, Arc<dyn Checker>>,
}

impl CheckerRegistry {
    /// Create a registry with the default checkers
    pub fn new() -> Self {
        let mut registry = Self::empty();

        let postgres: Arc<dyn Checker> = Arc::new(PostgresChecker::default());
        registry.register("http", Arc::new(HttpChecker::new()));
        registry.register("https", Arc::new(HttpChecker::new().https()));
        registry.register("tcp", Arc::new(TcpChecker::new()));
        registry.register("postgres", postgres.clone());
        registry.register("yugabyte", postgres);
        registry.register("kafka", Arc::new(KafkaChecker::new()));
        registry.register("clickhouse", Arc::new(ClickHouseChecker::default()));

        registry
    }

    /// Registry without any checkers
    pub fn empty() -> Self {
        Self {
            checkers: HashMap::new(),
        }
    }

    /// Register or replace a checker
    pub fn register(&mut self, protocol: &str, checker: Arc<dyn Checker>) {
        self.checkers.insert(protocol.to_string(), checker);
    }

    /// Get the checker for a protocol
    pub fn get(&self, protocol: &str) -> Option<Arc<dyn Checker>> {
        self.checkers.get(protocol).cloned()
    }

    /// All registered protocol tags, sorted
    pub fn list_protocols(&self) -> Vec<String> {
        let mut names: Vec<String> = self.checkers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Probe with the checker registered for `protocol`.
    ///
    /// Unknown protocols produce a result with status `unknown`.
    pub async fn check(&self, protocol: &str, address: &str, port: u16) -> CheckResult {
        match self.get(protocol) {
            Some(checker) => {
                debug!("Checking {}:{} via {}", address, port, protocol);
                checker.check(address, port).await
            }
            None => CheckResult::new(protocol)
                .unknown(format!("no checker registered for protocol '{}'", protocol)),
        }
    }
}

impl Default for CheckerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HealthStatus;
    use async_trait::async_trait;

    struct AlwaysHealthy;

    #[async_trait]
    impl Checker for AlwaysHealthy {
        async fn check(&self, address: &str, port: u16) -> CheckResult {
            CheckResult::new("fake").healthy(format!("{}:{}", address, port))
        }
    }

    #[test]
    fn test_registry_creation() {
        let registry = CheckerRegistry::new();
        assert_eq!(
            registry.list_protocols(),
            vec!["clickhouse", "http", "https", "kafka", "postgres", "tcp", "yugabyte"]
        );
    }

    #[tokio::test]
    async fn test_unknown_protocol() {
        let registry = CheckerRegistry::new();
        let result = registry.check("gopher", "127.0.0.1", 70).await;
        assert_eq!(result.status, HealthStatus::Unknown);
        assert!(!result.ok);
        assert!(result.error.unwrap().contains("gopher"));
    }

    #[tokio::test]
    async fn test_custom_checker() {
        let mut registry = CheckerRegistry::empty();
        registry.register("fake", Arc::new(AlwaysHealthy));
        let result = registry.check("fake", "10.0.0.1", 80).await;
        assert!(result.ok);
        assert_eq!(result.message, "10.0.0.1:80");
    }
}
