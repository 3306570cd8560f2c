//! HTTP(S) endpoint probe

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::{CheckResult, Checker, DEFAULT_TIMEOUT};

/// Bytes of response body kept in metadata
const BODY_LIMIT: usize = 1024;

/// GETs a health path and classifies the status code
#[derive(Debug, Clone)]
pub struct HttpChecker {
    path: String,
    https: bool,
    timeout: Duration,
}

impl HttpChecker {
    /// Plain HTTP against `/health`
    pub fn new() -> Self {
        Self {
            path: "/health".to_string(),
            https: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Probe a different path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        self
    }

    /// Use https
    pub fn https(mut self) -> Self {
        self.https = true;
        self
    }

    /// Override the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// URL probed for `address:port`
    pub fn url(&self, address: &str, port: u16) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{}://{}:{}{}", scheme, address, port, self.path)
    }

    fn client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .no_proxy()
            .build()
    }
}

impl Default for HttpChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a status code onto health: 2xx healthy, 5xx unhealthy, anything else degraded
pub fn classify_status(code: StatusCode) -> crate::HealthStatus {
    use crate::HealthStatus;
    if code.is_success() {
        HealthStatus::Healthy
    } else if code.is_server_error() {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Degraded
    }
}

fn truncate_body(bytes: &[u8]) -> String {
    let end = bytes.len().min(BODY_LIMIT);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[async_trait]
impl Checker for HttpChecker {
    async fn check(&self, address: &str, port: u16) -> CheckResult {
        let result = CheckResult::new("http");
        let url = self.url(address, port);

        let client = match self.client() {
            Ok(c) => c,
            Err(e) => return result.unhealthy(format!("failed to build client: {}", e)),
        };

        let start = Instant::now();
        let response = match client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                return result
                    .with_latency(start.elapsed())
                    .unhealthy(format!("request failed: {}", e));
            }
        };
        let latency = start.elapsed();
        let status = response.status();
        debug!("GET {} -> {} in {:?}", url, status, latency);

        let body = response
            .bytes()
            .await
            .map(|b| truncate_body(&b))
            .unwrap_or_default();

        let result = result
            .with_latency(latency)
            .with_metadata("status_code", status.as_u16().to_string())
            .with_metadata("url", url);
        let result = if body.is_empty() {
            result
        } else {
            result.with_metadata("body", body)
        };

        match classify_status(status) {
            crate::HealthStatus::Healthy => {
                result.healthy(format!("HTTP {} (latency: {:?})", status.as_u16(), latency))
            }
            crate::HealthStatus::Unhealthy => {
                result.unhealthy(format!("server error: HTTP {}", status.as_u16()))
            }
            _ => result.degraded(format!("unexpected status: HTTP {}", status.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HealthStatus;

    #[test]
    fn test_url_building() {
        assert_eq!(
            HttpChecker::new().url("10.0.0.1", 18000),
            "http://10.0.0.1:18000/health"
        );
        assert_eq!(
            HttpChecker::new()
                .https()
                .with_path("api/health")
                .url("grafana.local", 3000),
            "https://grafana.local:3000/api/health"
        );
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::OK), HealthStatus::Healthy);
        assert_eq!(classify_status(StatusCode::NO_CONTENT), HealthStatus::Healthy);
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            HealthStatus::Unhealthy
        );
        assert_eq!(classify_status(StatusCode::NOT_FOUND), HealthStatus::Degraded);
        assert_eq!(
            classify_status(StatusCode::MOVED_PERMANENTLY),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn test_body_truncation() {
        let long = vec![b'a'; 4096];
        assert_eq!(truncate_body(&long).len(), BODY_LIMIT);
        assert_eq!(truncate_body(b"ok"), "ok");
    }
}
