//! Probe outcome types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Health of a probed endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Endpoint answered correctly
    Healthy,
    /// Endpoint answered but something is off
    Degraded,
    /// Endpoint unreachable or failing
    Unhealthy,
    /// No probe available for the endpoint
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single probe.
///
/// Produced fresh on every call; `ok` is true only for [`HealthStatus::Healthy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Probe name, e.g. `postgres` or `http`
    pub name: String,
    /// Whether the endpoint is healthy
    pub ok: bool,
    /// Classified status
    pub status: HealthStatus,
    /// Human readable summary
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Duration of the primary round trip
    #[serde(with = "latency_ms")]
    pub latency: Duration,
    /// Probe-specific details
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// When the probe ran
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    /// Fresh result in the `unknown` state
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: false,
            status: HealthStatus::Unknown,
            message: String::new(),
            error: None,
            latency: Duration::ZERO,
            metadata: BTreeMap::new(),
            checked_at: Utc::now(),
        }
    }

    /// Mark healthy
    pub fn healthy(mut self, message: impl Into<String>) -> Self {
        self.ok = true;
        self.status = HealthStatus::Healthy;
        self.message = message.into();
        self
    }

    /// Mark degraded with an error
    pub fn degraded(mut self, error: impl Into<String>) -> Self {
        self.ok = false;
        self.status = HealthStatus::Degraded;
        self.error = Some(error.into());
        self
    }

    /// Mark unhealthy with an error
    pub fn unhealthy(mut self, error: impl Into<String>) -> Self {
        self.ok = false;
        self.status = HealthStatus::Unhealthy;
        self.error = Some(error.into());
        self
    }

    /// Mark unknown with an error
    pub fn unknown(mut self, error: impl Into<String>) -> Self {
        self.ok = false;
        self.status = HealthStatus::Unknown;
        self.error = Some(error.into());
        self
    }

    /// Record latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

mod latency_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let r = CheckResult::new("tcp").healthy("connected");
        assert!(r.ok);
        assert_eq!(r.status, HealthStatus::Healthy);

        let r = r.degraded("slow");
        assert!(!r.ok);
        assert_eq!(r.status, HealthStatus::Degraded);
        assert_eq!(r.error.as_deref(), Some("slow"));

        assert_eq!(CheckResult::new("x").status, HealthStatus::Unknown);
    }

    #[test]
    fn test_json_shape() {
        let r = CheckResult::new("http")
            .healthy("HTTP 200")
            .with_latency(Duration::from_millis(12))
            .with_metadata("status_code", "200");
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["latency"], 12);
        assert_eq!(json["metadata"]["status_code"], "200");
        assert!(json.get("error").is_none());

        let back: CheckResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.latency, Duration::from_millis(12));
    }
}
