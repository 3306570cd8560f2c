//! Playbooks for the infrastructure roles provisioned through Ansible

use cluster_manifest::ports::infra;
use cluster_manifest::{DatabaseConfig, Host, KafkaTopic, Manifest};
use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

use super::playbook::{AnsibleTask, Play, Playbook, Role};
use crate::task::Task;
use crate::{Error, Result};

/// Kafka data directory on brokers
pub const KAFKA_LOG_DIRS: &str = "/var/lib/kafka/logs";
/// Where `sleighzy.kafka` installs the distribution
pub const KAFKA_DIR: &str = "/opt/kafka";
/// `max_connections` unless tuning overrides it
pub const POSTGRES_MAX_CONNECTIONS: &str = "200";

fn entry(pairs: &[(&str, Value)]) -> Value {
    let mut map = Mapping::new();
    for (k, v) in pairs {
        map.insert(Value::String(k.to_string()), v.clone());
    }
    Value::Mapping(map)
}

fn hba(kind: &str, address: Option<&str>, method: &str) -> Value {
    let mut pairs = vec![
        ("type", Value::from(kind)),
        ("database", Value::from("all")),
        ("user", Value::from("all")),
    ];
    if let Some(address) = address {
        pairs.push(("address", Value::from(address)));
    }
    pairs.push(("method", Value::from(method)));
    entry(&pairs)
}

fn single_play(playbook: &str, play: &str, hosts: &str, role: Role) -> Playbook {
    let mut book = Playbook::new(playbook, hosts);
    book.add_play(Play {
        name: play.into(),
        hosts: hosts.into(),
        r#become: true,
        gather_facts: true,
        roles: vec![role],
        ..Default::default()
    });
    book
}

/// PostgreSQL via `geerlingguy.postgresql`.
///
/// Owners become roles, and `tuning` entries are appended to the server
/// options, replacing the defaults they name.
pub fn postgres_playbook(
    hosts: &str,
    version: &str,
    databases: &[DatabaseConfig],
    tuning: &BTreeMap<String, String>,
) -> Playbook {
    let mut owners: Vec<&str> = Vec::new();
    let mut dbs = Vec::with_capacity(databases.len());
    for db in databases {
        let mut pairs = vec![("name", Value::from(db.name.as_str()))];
        if !db.owner.is_empty() {
            pairs.push(("owner", Value::from(db.owner.as_str())));
            if !owners.contains(&db.owner.as_str()) {
                owners.push(&db.owner);
            }
        }
        dbs.push(entry(&pairs));
    }
    let users: Vec<Value> = owners
        .iter()
        .map(|owner| entry(&[("name", Value::from(*owner))]))
        .collect();

    let mut options: IndexMap<&str, &str> = IndexMap::new();
    options.insert("listen_addresses", "*");
    options.insert("max_connections", POSTGRES_MAX_CONNECTIONS);
    for (option, value) in tuning {
        options.insert(option, value);
    }
    let options: Vec<Value> = options
        .into_iter()
        .map(|(option, value)| entry(&[("option", option.into()), ("value", value.into())]))
        .collect();

    let mut role = Role::new("geerlingguy.postgresql");
    if !version.is_empty() {
        role = role.var("postgresql_version", version);
    }
    let role = role
        .var("postgresql_users", users)
        .var("postgresql_databases", dbs)
        .var("postgresql_global_config_options", options)
        .var(
            "postgresql_hba_entries",
            vec![
                hba("local", None, "peer"),
                hba("host", Some("127.0.0.1/32"), "md5"),
                hba("host", Some("0.0.0.0/0"), "md5"),
            ],
        );

    single_play("Provision PostgreSQL", "Install and configure PostgreSQL", hosts, role)
}

/// `kafka-topics.sh` invocation creating `topic` unless it exists
pub fn create_topic_task(bootstrap: &str, topic: &KafkaTopic) -> AnsibleTask {
    let mut argv: Vec<Value> = [
        format!("{}/bin/kafka-topics.sh", KAFKA_DIR),
        "--bootstrap-server".into(),
        bootstrap.into(),
        "--create".into(),
        "--if-not-exists".into(),
        "--topic".into(),
        topic.name.clone(),
        "--partitions".into(),
        topic.partitions.max(1).to_string(),
        "--replication-factor".into(),
        topic.replication_factor.max(1).to_string(),
    ]
    .into_iter()
    .map(Value::String)
    .collect();
    for (key, value) in &topic.config {
        argv.push(Value::from("--config"));
        argv.push(Value::String(format!("{}={}", key, value)));
    }

    AnsibleTask::new(
        format!("Create topic {}", topic.name),
        "ansible.builtin.command",
        entry(&[("argv", Value::Sequence(argv))]),
    )
}

/// Kafka broker via `sleighzy.kafka`; `topics` are created once the broker is up
pub fn kafka_playbook(
    hosts: &str,
    broker_id: u32,
    listener_host: &str,
    listener_port: u16,
    zookeeper_connect: &str,
    topics: &[KafkaTopic],
) -> Playbook {
    let role = Role::new("sleighzy.kafka")
        .var("kafka_broker_id", broker_id)
        .var("kafka_listener_hostname", listener_host)
        .var("kafka_listener_port", listener_port)
        .var("kafka_zookeeper_connect", zookeeper_connect)
        .var("kafka_log_dirs", KAFKA_LOG_DIRS);

    let mut book = single_play("Provision Kafka", "Install and configure Kafka", hosts, role);
    let bootstrap = format!("{}:{}", listener_host, listener_port);
    book.plays[0].post_tasks = topics
        .iter()
        .map(|topic| create_topic_task(&bootstrap, topic))
        .collect();
    book
}

/// ZooKeeper ensemble member via `sleighzy.zookeeper`
pub fn zookeeper_playbook(hosts: &str, id: u32, client_port: u16, servers: &[&str]) -> Playbook {
    let servers: Vec<Value> = servers.iter().map(|s| Value::from(*s)).collect();
    let role = Role::new("sleighzy.zookeeper")
        .var("zookeeper_id", id)
        .var("zookeeper_client_port", client_port)
        .var("zookeeper_servers", servers);

    single_play("Provision ZooKeeper", "Install and configure ZooKeeper", hosts, role)
}

fn numeric(task: &Task, key: &str) -> Result<u32> {
    task.config
        .get(key)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| Error::backend(format!("task {}: missing or invalid {}", task.name, key)))
}

/// Playbook for an Ansible-provisioned task on `host`
pub fn playbook_for(task: &Task, host: &Host, manifest: &Manifest) -> Result<Playbook> {
    let target = task.host.as_str();
    let config = |key: &str| task.config.get(key).map(String::as_str).unwrap_or_default();
    let infra_cfg = &manifest.infrastructure;

    match task.task_type.as_str() {
        "postgres" => match infra_cfg.postgres() {
            Some(pg) => Ok(postgres_playbook(target, &task.version, &pg.databases, &pg.tuning)),
            None => {
                let databases: Vec<DatabaseConfig> = config("databases")
                    .split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(|name| DatabaseConfig {
                        name: name.to_string(),
                        ..Default::default()
                    })
                    .collect();
                Ok(postgres_playbook(target, &task.version, &databases, &BTreeMap::new()))
            }
        },
        "kafka" => {
            let broker_id = numeric(task, "broker_id")?;
            // the first broker creates topics for the cluster
            let topics = infra_cfg
                .kafka()
                .filter(|k| k.brokers.first().map(|b| b.id) == Some(broker_id))
                .map(|k| k.topics.as_slice())
                .unwrap_or_default();
            Ok(kafka_playbook(
                target,
                broker_id,
                &host.address,
                task.port.unwrap_or(infra::KAFKA),
                config("zookeeper_connect"),
                topics,
            ))
        }
        "zookeeper" => {
            let servers: Vec<&str> = config("servers").split_whitespace().collect();
            Ok(zookeeper_playbook(
                target,
                numeric(task, "server_id")?,
                task.port.unwrap_or(infra::ZOOKEEPER),
                &servers,
            ))
        }
        other => Err(Error::backend(format!(
            "task {}: no playbook for task type '{}'",
            task.name, other
        ))),
    }
}
