//! Postgres / YugabyteDB probe

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio_postgres::config::SslMode;
use tokio_postgres::{Client, Config, NoTls};
use tracing::{debug, warn};

use crate::{CheckResult, Checker, DEFAULT_TIMEOUT};

/// Connects, runs `SELECT 1` and collects server metadata
#[derive(Debug, Clone)]
pub struct PostgresChecker {
    /// Role to connect as
    pub user: String,
    /// Password, if any
    pub password: Option<String>,
    /// Database to connect to, `postgres` when empty
    pub database: String,
    /// Connect and query timeout
    pub timeout: Duration,
}

impl Default for PostgresChecker {
    fn default() -> Self {
        Self {
            user: "postgres".to_string(),
            password: None,
            database: String::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PostgresChecker {
    /// Checker connecting as `user`
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Default::default()
        }
    }

    /// Set the password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the connect and query timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the database
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Connection settings for `address:port`
    pub fn connection_config(&self, address: &str, port: u16) -> Config {
        let dbname = if self.database.is_empty() {
            "postgres"
        } else {
            &self.database
        };

        let mut config = Config::new();
        config
            .host(address)
            .port(port)
            .user(&self.user)
            .dbname(dbname)
            .ssl_mode(SslMode::Disable)
            .connect_timeout(self.timeout);
        if let Some(password) = &self.password {
            config.password(password);
        }
        config
    }

    async fn connect(&self, address: &str, port: u16) -> Result<Client, String> {
        let config = self.connection_config(address, port);
        let connecting = config.connect(NoTls);
        let (client, connection) = match tokio::time::timeout(self.timeout, connecting).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(format!("ping failed: {}", e)),
            Err(_) => return Err(format!("ping timed out after {:?}", self.timeout)),
        };

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("postgres connection closed: {}", e);
            }
        });
        Ok(client)
    }

    /// Confirm the named databases exist and accept connections.
    ///
    /// An empty list is healthy without connecting.
    pub async fn check_databases(
        &self,
        address: &str,
        port: u16,
        databases: &[String],
    ) -> CheckResult {
        let result = CheckResult::new("postgres_databases");
        if databases.is_empty() {
            return result.healthy("no databases specified");
        }

        let start = Instant::now();
        let client = match self.connect(address, port).await {
            Ok(c) => c,
            Err(e) => {
                return result
                    .with_latency(start.elapsed())
                    .unhealthy(format!("failed to open connection: {}", e));
            }
        };

        let mut missing = Vec::new();
        let mut denied = Vec::new();
        for name in databases {
            let lookup = tokio::time::timeout(
                self.timeout,
                client.query_opt(
                    "SELECT datallowconn FROM pg_database WHERE datname = $1",
                    &[name],
                ),
            )
            .await;
            match lookup {
                Ok(Ok(None)) => missing.push(name.clone()),
                Ok(Ok(Some(row))) => {
                    if !row.try_get::<_, bool>(0).unwrap_or(false) {
                        denied.push(name.clone());
                    }
                }
                Ok(Err(e)) => {
                    return result
                        .with_latency(start.elapsed())
                        .unhealthy(format!("query failed for {}: {}", name, e));
                }
                Err(_) => {
                    return result
                        .with_latency(start.elapsed())
                        .unhealthy(format!("query timed out for {}", name));
                }
            }
        }

        let latency = start.elapsed();
        let mut result = result.with_latency(latency);

        if !missing.is_empty() || !denied.is_empty() {
            warn!(
                "Database readiness failed on {}:{}: missing={:?} disallowed={:?}",
                address, port, missing, denied
            );
            if !missing.is_empty() {
                result = result.with_metadata("missing", missing.join(","));
            }
            if !denied.is_empty() {
                result = result.with_metadata("disallowed", denied.join(","));
            }
            return result.unhealthy(format!(
                "database readiness failed (missing: {}, disallowed: {})",
                format_list(&missing),
                format_list(&denied)
            ));
        }

        result.healthy(format!("databases ready (latency: {:?})", latency))
    }
}

fn format_list(items: &[String]) -> String {
    format!("[{}]", items.join(" "))
}

/// `yugabyte` when the version string names YugabyteDB, else `postgres`
pub fn server_type(version: &str) -> &'static str {
    if version.contains("YugabyteDB") {
        "yugabyte"
    } else {
        "postgres"
    }
}

#[async_trait]
impl Checker for PostgresChecker {
    async fn check(&self, address: &str, port: u16) -> CheckResult {
        let result = CheckResult::new("postgres");
        let start = Instant::now();

        let client = match self.connect(address, port).await {
            Ok(c) => c,
            Err(e) => return result.with_latency(start.elapsed()).unhealthy(e),
        };

        let ping = tokio::time::timeout(self.timeout, client.query_one("SELECT 1", &[])).await;
        let latency = start.elapsed();
        let mut result = result.with_latency(latency);
        match ping {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return result.degraded(format!("query failed: {}", e)),
            Err(_) => return result.degraded("query timed out"),
        }

        if let Ok(Ok(row)) =
            tokio::time::timeout(self.timeout, client.query_one("SELECT version()", &[])).await
        {
            if let Ok(version) = row.try_get::<_, String>(0) {
                result = result
                    .with_metadata("type", server_type(&version))
                    .with_metadata("version", version);
            }
        }

        let active = client.query_one(
            "SELECT COUNT(*) FROM pg_stat_activity WHERE state = 'active'",
            &[],
        );
        if let Ok(Ok(row)) = tokio::time::timeout(self.timeout, active).await {
            if let Ok(count) = row.try_get::<_, i64>(0) {
                result = result.with_metadata("active_connections", count.to_string());
            }
        }

        result.healthy(format!("Connected successfully (latency: {:?})", latency))
    }
}
