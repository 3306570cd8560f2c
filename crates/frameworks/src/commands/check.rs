use anyhow::Result;
use health_checks::{CheckResult, CheckerRegistry, HttpChecker};
use std::sync::Arc;

/// Build the probe for `protocol`, honouring a custom HTTP path
fn registry(protocol: &str, path: Option<String>) -> CheckerRegistry {
    let mut registry = CheckerRegistry::new();
    if let Some(path) = path {
        match protocol {
            "http" => registry.register("http", Arc::new(HttpChecker::new().with_path(path))),
            "https" => registry.register("https", Arc::new(HttpChecker::new().https().with_path(path))),
            _ => {}
        }
    }
    registry
}

async fn probe(protocol: &str, address: &str, port: u16, path: Option<String>) -> CheckResult {
    registry(protocol, path).check(protocol, address, port).await
}

pub async fn run(protocol: &str, address: &str, port: u16, path: Option<String>) -> Result<()> {
    let result = probe(protocol, address, port, path).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.ok {
        anyhow::bail!(
            "{} check of {}:{} is {}",
            protocol,
            address,
            port,
            result.status
        );
    }
    Ok(())
}
