//! Plain TCP connect probe

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::debug;

use crate::{CheckResult, Checker, DEFAULT_TIMEOUT};

/// Healthy if a TCP connection can be opened within the timeout
#[derive(Debug, Clone)]
pub struct TcpChecker {
    timeout: Duration,
}

impl TcpChecker {
    /// Checker with the default timeout
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the connect timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for TcpChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Checker for TcpChecker {
    async fn check(&self, address: &str, port: u16) -> CheckResult {
        let result = CheckResult::new("tcp");
        let start = Instant::now();

        match tokio::time::timeout(self.timeout, TcpStream::connect((address, port))).await {
            Ok(Ok(_stream)) => {
                let latency = start.elapsed();
                debug!("TCP {}:{} reachable in {:?}", address, port, latency);
                result
                    .with_latency(latency)
                    .healthy(format!("Port {} reachable (latency: {:?})", port, latency))
            }
            Ok(Err(e)) => result
                .with_latency(start.elapsed())
                .unhealthy(format!("connect failed: {}", e)),
            Err(_) => result
                .with_latency(start.elapsed())
                .unhealthy(format!("connect timed out after {:?}", self.timeout)),
        }
    }
}
