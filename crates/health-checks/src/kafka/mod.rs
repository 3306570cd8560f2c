//! Kafka probe speaking the Metadata API directly

pub mod wire;

use async_trait::async_trait;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::{CheckResult, Checker, DEFAULT_TIMEOUT};
use wire::MetadataResponse;

/// Requests cluster metadata from one broker
#[derive(Debug)]
pub struct KafkaChecker {
    timeout: Duration,
    client_id: String,
    correlation: AtomicI32,
}

impl KafkaChecker {
    /// Checker with the default timeout
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            client_id: "frameworks-health".to_string(),
            correlation: AtomicI32::new(1),
        }
    }

    /// Override the timeout for the whole exchange
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch_metadata(&self, address: &str, port: u16) -> Result<MetadataResponse, String> {
        let correlation_id = self.correlation.fetch_add(1, Ordering::Relaxed);

        let mut stream = TcpStream::connect((address, port))
            .await
            .map_err(|e| format!("connect failed: {}", e))?;

        let request = wire::encode_metadata_request(correlation_id, &self.client_id);
        stream
            .write_all(&request)
            .await
            .map_err(|e| format!("write failed: {}", e))?;

        let mut buffer = BytesMut::with_capacity(4096);
        let body = loop {
            if let Some(frame) =
                wire::try_parse_frame(&mut buffer).map_err(|e| format!("decode failed: {}", e))?
            {
                break frame;
            }
            let read = stream
                .read_buf(&mut buffer)
                .await
                .map_err(|e| format!("read failed: {}", e))?;
            if read == 0 {
                return Err("connection closed mid-response".to_string());
            }
        };

        let response =
            wire::decode_metadata_response(&body).map_err(|e| format!("decode failed: {}", e))?;
        if response.correlation_id != correlation_id {
            return Err(format!(
                "correlation id mismatch: sent {}, got {}",
                correlation_id, response.correlation_id
            ));
        }
        Ok(response)
    }
}

impl Default for KafkaChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Checker for KafkaChecker {
    async fn check(&self, address: &str, port: u16) -> CheckResult {
        let result = CheckResult::new("kafka");
        let start = Instant::now();

        let metadata =
            match tokio::time::timeout(self.timeout, self.fetch_metadata(address, port)).await {
                Ok(Ok(m)) => m,
                Ok(Err(e)) => return result.with_latency(start.elapsed()).unhealthy(e),
                Err(_) => {
                    return result
                        .with_latency(start.elapsed())
                        .unhealthy(format!("metadata request timed out after {:?}", self.timeout));
                }
            };
        let latency = start.elapsed();
        debug!(
            "Kafka {}:{} metadata: {} brokers, {} topics, controller {}",
            address,
            port,
            metadata.brokers.len(),
            metadata.topics.len(),
            metadata.controller_id
        );

        let result = result
            .with_latency(latency)
            .with_metadata("brokers", metadata.brokers.len().to_string())
            .with_metadata("topics", metadata.topics.len().to_string())
            .with_metadata("controller_id", metadata.controller_id.to_string());

        if metadata.controller_id < 0 {
            return result.degraded("connected but no controller elected");
        }

        result.healthy(format!(
            "Connected to Kafka cluster (brokers: {}, topics: {}, latency: {:?})",
            metadata.brokers.len(),
            metadata.topics.len(),
            latency
        ))
    }
}
