//! # Health Checks
//!
//! Read-only protocol probes for provisioned infrastructure and services.
//!
//! Every checker implements [`Checker`] and reports failures inside the
//! returned [`CheckResult`] rather than as errors, so callers can collect
//! results from many endpoints without short-circuiting. The
//! [`CheckerRegistry`] selects a checker by protocol tag.

#![warn(missing_docs)]

use async_trait::async_trait;
use std::time::Duration;

pub mod clickhouse;
pub mod http;
pub mod kafka;
pub mod postgres;
pub mod preflight;
pub mod registry;
pub mod result;
pub mod tcp;

pub use clickhouse::ClickHouseChecker;
pub use http::HttpChecker;
pub use kafka::KafkaChecker;
pub use postgres::PostgresChecker;
pub use preflight::{PreflightCheck, disk_check_name, disk_space_from_df, remote_disk_space};
pub use registry::CheckerRegistry;
pub use result::{CheckResult, HealthStatus};
pub use tcp::TcpChecker;

/// Timeout applied by every checker unless overridden
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A protocol probe
#[async_trait]
pub trait Checker: Send + Sync {
    /// Probe `address:port`; never fails, problems are reported in the result
    async fn check(&self, address: &str, port: u16) -> CheckResult;
}
