//! ClickHouse probe over the HTTP interface

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::{CheckResult, Checker, DEFAULT_TIMEOUT};

/// Pings ClickHouse, runs `SELECT 1` and collects server details
#[derive(Debug, Clone)]
pub struct ClickHouseChecker {
    /// User sent as `X-ClickHouse-User`
    pub user: String,
    /// Password sent as `X-ClickHouse-Key`
    pub password: Option<String>,
    /// Database whose tables are counted
    pub database: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ClickHouseChecker {
    fn default() -> Self {
        Self {
            user: "default".to_string(),
            password: None,
            database: "default".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClickHouseChecker {
    /// Checker counting tables in `database`
    pub fn for_database(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    /// Query counting the configured database's tables
    pub fn table_count_query(&self) -> String {
        format!(
            "SELECT count() FROM system.tables WHERE database = '{}'",
            self.database.replace('\\', "\\\\").replace('\'', "\\'")
        )
    }

    async fn query(
        &self,
        client: &reqwest::Client,
        base: &str,
        sql: &str,
    ) -> Result<String, String> {
        let mut request = client
            .get(base)
            .query(&[("query", sql)])
            .header("X-ClickHouse-User", &self.user);
        if let Some(password) = &self.password {
            request = request.header("X-ClickHouse-Key", password);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        let body = response.text().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(format!("HTTP {}: {}", status.as_u16(), body.trim()));
        }
        Ok(body.trim().to_string())
    }
}

#[async_trait]
impl Checker for ClickHouseChecker {
    async fn check(&self, address: &str, port: u16) -> CheckResult {
        let result = CheckResult::new("clickhouse");
        let base = format!("http://{}:{}/", address, port);

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .no_proxy()
            .build();
        let client = match client {
            Ok(c) => c,
            Err(e) => return result.unhealthy(format!("failed to build client: {}", e)),
        };

        let start = Instant::now();
        let ping = client.get(format!("{}ping", base)).send().await;
        match ping {
            Ok(r) if r.status().is_success() => {}
            Ok(r) => {
                return result
                    .with_latency(start.elapsed())
                    .unhealthy(format!("ping returned HTTP {}", r.status().as_u16()));
            }
            Err(e) => {
                return result
                    .with_latency(start.elapsed())
                    .unhealthy(format!("ping failed: {}", e));
            }
        }
        let latency = start.elapsed();
        let mut result = result.with_latency(latency);

        if let Err(e) = self.query(&client, &base, "SELECT 1").await {
            return result.degraded(format!("query failed: {}", e));
        }

        // Best effort details
        if let Ok(version) = self.query(&client, &base, "SELECT version()").await {
            result = result.with_metadata("version", version);
        }
        if let Ok(uptime) = self.query(&client, &base, "SELECT uptime()").await {
            result = result.with_metadata("uptime_seconds", uptime);
        }
        if let Ok(tables) = self.query(&client, &base, &self.table_count_query()).await {
            result = result
                .with_metadata("database", self.database.clone())
                .with_metadata("tables", tables);
        }
        debug!("ClickHouse {}:{} healthy in {:?}", address, port, latency);

        result.healthy(format!("Connected successfully (latency: {:?})", latency))
    }
}
