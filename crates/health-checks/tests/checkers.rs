//! Checker tests against loopback listeners

use health_checks::kafka::wire::{Broker, MetadataResponse, Topic, encode_metadata_response};
use health_checks::{
    Checker, CheckerRegistry, HealthStatus, HttpChecker, KafkaChecker, TcpChecker,
};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

#[tokio::test]
async fn test_tcp_healthy_then_unhealthy() {
    let (listener, port) = listener().await;
    let checker = TcpChecker::new().with_timeout(Duration::from_secs(2));

    let result = checker.check("127.0.0.1", port).await;
    assert!(result.ok, "{:?}", result);
    assert_eq!(result.status, HealthStatus::Healthy);

    drop(listener);
    let result = checker.check("127.0.0.1", port).await;
    assert!(!result.ok);
    assert_eq!(result.status, HealthStatus::Unhealthy);
    assert!(result.error.is_some());
}

/// Serve one HTTP response per connection
async fn serve_http(listener: TcpListener, status_line: &'static str, body: &'static str) {
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
}

#[tokio::test]
async fn test_http_ok() {
    let (listener, port) = listener().await;
    serve_http(listener, "200 OK", "{\"status\":\"ok\"}").await;

    let result = HttpChecker::new().check("127.0.0.1", port).await;
    assert!(result.ok, "{:?}", result);
    assert_eq!(result.metadata["status_code"], "200");
    assert_eq!(result.metadata["body"], "{\"status\":\"ok\"}");
}

#[tokio::test]
async fn test_http_server_error_is_unhealthy() {
    let (listener, port) = listener().await;
    serve_http(listener, "503 Service Unavailable", "down").await;

    let result = HttpChecker::new().check("127.0.0.1", port).await;
    assert_eq!(result.status, HealthStatus::Unhealthy);
    assert_eq!(result.metadata["status_code"], "503");
}

#[tokio::test]
async fn test_http_not_found_is_degraded() {
    let (listener, port) = listener().await;
    serve_http(listener, "404 Not Found", "").await;

    let result = HttpChecker::new().check("127.0.0.1", port).await;
    assert_eq!(result.status, HealthStatus::Degraded);
    assert!(!result.metadata.contains_key("body"));
}

/// Answer one metadata request with the given controller
async fn serve_kafka(listener: TcpListener, controller_id: i32) {
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut size = [0u8; 4];
        socket.read_exact(&mut size).await.unwrap();
        let mut request = vec![0u8; i32::from_be_bytes(size) as usize];
        socket.read_exact(&mut request).await.unwrap();
        let correlation_id =
            i32::from_be_bytes([request[4], request[5], request[6], request[7]]);

        let body = encode_metadata_response(&MetadataResponse {
            correlation_id,
            brokers: vec![Broker {
                node_id: 1,
                host: "127.0.0.1".into(),
                port: 9092,
                rack: None,
            }],
            controller_id,
            topics: vec![
                Topic {
                    error_code: 0,
                    name: "analytics_events".into(),
                    is_internal: false,
                    partitions: 2,
                },
                Topic {
                    error_code: 0,
                    name: "__consumer_offsets".into(),
                    is_internal: true,
                    partitions: 1,
                },
            ],
        });
        socket
            .write_all(&(body.len() as i32).to_be_bytes())
            .await
            .unwrap();
        socket.write_all(&body).await.unwrap();
    });
}

#[tokio::test]
async fn test_kafka_metadata() {
    let (listener, port) = listener().await;
    serve_kafka(listener, 1).await;

    let result = KafkaChecker::new().check("127.0.0.1", port).await;
    assert!(result.ok, "{:?}", result);
    assert_eq!(result.metadata["brokers"], "1");
    assert_eq!(result.metadata["topics"], "2");
    assert_eq!(result.metadata["controller_id"], "1");
}

#[tokio::test]
async fn test_kafka_without_controller_is_degraded() {
    let (listener, port) = listener().await;
    serve_kafka(listener, -1).await;

    let result = KafkaChecker::new().check("127.0.0.1", port).await;
    assert_eq!(result.status, HealthStatus::Degraded);
    assert_eq!(result.metadata["controller_id"], "-1");
}

#[tokio::test]
async fn test_registry_dispatches_by_protocol() {
    let (_listener, port) = listener().await;
    let registry = CheckerRegistry::new();

    let result = registry.check("tcp", "127.0.0.1", port).await;
    assert!(result.ok);
    assert_eq!(result.name, "tcp");

    let result = registry.check("carrier-pigeon", "127.0.0.1", port).await;
    assert_eq!(result.status, HealthStatus::Unknown);
}
