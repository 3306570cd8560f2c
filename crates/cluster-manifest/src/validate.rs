//! Manifest validation
//!
//! Checks run in a fixed order so the first reported problem is the most
//! fundamental one: required fields, host presence, host references, Kafka's
//! ZooKeeper wiring, then port collisions.

use crate::defaults::ServiceDefaults;
use crate::ports::{PortRegistry, infra};
use crate::types::{Manifest, ManifestKind, ServiceConfig};
use crate::{ManifestError, Result};

/// Validate a cluster manifest against the service-definitions registry
pub fn validate(manifest: &Manifest, defaults: &dyn ServiceDefaults) -> Result<()> {
    validate_required(manifest)?;
    validate_host_references(manifest)?;
    validate_kafka(manifest)?;
    validate_ports(manifest, defaults)?;
    Ok(())
}

fn invalid(msg: impl Into<String>) -> ManifestError {
    ManifestError::ValidationError(msg.into())
}

fn validate_required(manifest: &Manifest) -> Result<()> {
    if manifest.version.trim().is_empty() {
        return Err(invalid("version is required"));
    }

    let kind = match manifest.kind.as_deref().map(str::trim) {
        None | Some("") => return Err(invalid("type is required (cluster or edge)")),
        Some(k) => k,
    };
    let kind = manifest.manifest_kind().ok_or_else(|| {
        invalid(format!("type must be 'cluster' or 'edge', got: {}", kind))
    })?;

    if kind == ManifestKind::Cluster && manifest.hosts.is_empty() {
        return Err(invalid("cluster type requires at least one host"));
    }
    Ok(())
}

fn validate_host_references(manifest: &Manifest) -> Result<()> {
    let has = |h: &str| manifest.hosts.contains_key(h);
    let infra = &manifest.infrastructure;

    if let Some(pg) = infra.postgres().filter(|pg| !has(&pg.host)) {
        return Err(invalid(format!("postgres.host '{}' not found in hosts", pg.host)));
    }

    if let Some(ch) = infra.clickhouse().filter(|ch| !has(&ch.host)) {
        return Err(invalid(format!(
            "clickhouse.host '{}' not found in hosts",
            ch.host
        )));
    }

    if let Some(zk) = infra.zookeeper() {
        for node in &zk.ensemble {
            if !has(&node.host) {
                return Err(invalid(format!(
                    "zookeeper.ensemble host '{}' not found in hosts",
                    node.host
                )));
            }
        }
    }

    if let Some(kafka) = infra.kafka() {
        for broker in &kafka.brokers {
            if !has(&broker.host) {
                return Err(invalid(format!(
                    "kafka.broker host '{}' not found in hosts",
                    broker.host
                )));
            }
        }
    }

    if let Some(redis) = infra.redis() {
        for inst in &redis.instances {
            if !has(&inst.host) {
                return Err(invalid(format!(
                    "redis.instance '{}' host '{}' not found in hosts",
                    inst.name, inst.host
                )));
            }
        }
    }

    let sections = [
        ("service", &manifest.services),
        ("interface", &manifest.interfaces),
        ("observability", &manifest.observability),
    ];
    for (label, entries) in sections {
        for (name, svc) in entries {
            for host in svc.target_hosts() {
                if !has(host) {
                    return Err(invalid(format!(
                        "{} '{}' host '{}' not found in hosts",
                        label, name, host
                    )));
                }
            }
        }
    }

    Ok(())
}

/// ZooKeeper connect string for the manifest's Kafka brokers.
///
/// An explicit `zookeeper_connect` wins. Otherwise the string is derived from
/// an enabled ensemble as `address:port` pairs, provided every member's host
/// resolves.
pub fn resolve_zookeeper_connect(manifest: &Manifest) -> Option<String> {
    let kafka = manifest.infrastructure.kafka.as_ref()?;
    let explicit = kafka.zookeeper_connect.trim();
    if !explicit.is_empty() {
        return Some(explicit.to_string());
    }

    let zk = manifest.infrastructure.zookeeper()?;
    if zk.ensemble.is_empty() {
        return None;
    }
    let members = zk
        .ensemble
        .iter()
        .map(|node| {
            manifest.host(&node.host).map(|h| {
                format!("{}:{}", h.address, node.port.unwrap_or(infra::ZOOKEEPER))
            })
        })
        .collect::<Option<Vec<_>>>()?;
    Some(members.join(","))
}

fn validate_kafka(manifest: &Manifest) -> Result<()> {
    if manifest.infrastructure.kafka().is_some() && resolve_zookeeper_connect(manifest).is_none() {
        return Err(invalid(
            "kafka.zookeeper_connect is required: set it explicitly or enable a zookeeper ensemble",
        ));
    }
    Ok(())
}

fn validate_ports(manifest: &Manifest, defaults: &dyn ServiceDefaults) -> Result<()> {
    let mut ports = PortRegistry::new();
    let infra_cfg = &manifest.infrastructure;

    if let Some(pg) = infra_cfg.postgres() {
        ports.claim(&pg.host, pg.port.unwrap_or(infra::POSTGRES), "postgres")?;
    }
    if let Some(ch) = infra_cfg.clickhouse() {
        ports.claim(&ch.host, ch.port.unwrap_or(infra::CLICKHOUSE), "clickhouse")?;
    }
    if let Some(redis) = infra_cfg.redis() {
        for inst in &redis.instances {
            ports.claim(
                &inst.host,
                inst.port.unwrap_or(infra::REDIS),
                format!("redis-{}", inst.name),
            )?;
        }
    }
    if let Some(zk) = infra_cfg.zookeeper() {
        for node in &zk.ensemble {
            ports.claim(
                &node.host,
                node.port.unwrap_or(infra::ZOOKEEPER),
                format!("zookeeper-{}", node.id),
            )?;
        }
    }
    if let Some(kafka) = infra_cfg.kafka() {
        for broker in &kafka.brokers {
            ports.claim(
                &broker.host,
                broker.port.unwrap_or(infra::KAFKA),
                format!("kafka-broker-{}", broker.id),
            )?;
        }
    }

    for (name, svc) in manifest.enabled_services() {
        claim_service_ports(&mut ports, defaults, "service", name, svc)?;
    }
    for (name, svc) in manifest.enabled_interfaces() {
        claim_service_ports(&mut ports, defaults, "interface", name, svc)?;
    }
    for (name, svc) in manifest.enabled_observability() {
        claim_service_ports(&mut ports, defaults, "observability", name, svc)?;
    }

    Ok(())
}

fn claim_service_ports(
    ports: &mut PortRegistry,
    defaults: &dyn ServiceDefaults,
    label: &str,
    name: &str,
    svc: &ServiceConfig,
) -> Result<()> {
    let http = svc.port.or_else(|| defaults.default_port(name));
    let grpc = svc
        .grpc_port
        .or_else(|| defaults.default_grpc_port(name))
        .filter(|g| Some(*g) != http);

    for host in svc.target_hosts() {
        if let Some(port) = http {
            ports.claim(host, port, format!("{}:{}", label, name))?;
        }
        if let Some(port) = grpc {
            ports.claim(host, port, format!("{}:{}-grpc", label, name))?;
        }
    }
    Ok(())
}
