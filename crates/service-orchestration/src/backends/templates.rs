//! Compose documents, systemd units and the scripts that install them

use cluster_manifest::DeployMode;
use cluster_manifest::ports::infra;
use command_executor::shell_quote;
use indexmap::IndexMap;
use serde::Serialize;

use crate::task::Task;
use crate::{Error, Result};

/// Root of per-component install directories
pub const INSTALL_ROOT: &str = "/opt/frameworks";
/// Heredoc terminator used when writing files remotely
const EOF_MARKER: &str = "FRAMEWORKS_EOF";
/// Task config key carrying a Redis instance's AUTH password
pub const REDIS_PASSWORD_ENV: &str = "REDIS_PASSWORD";

/// Install directory of a task's component
pub fn install_dir(task: &Task) -> String {
    format!("{}/{}", INSTALL_ROOT, task.component())
}

/// Container and unit name (`frameworks-<component>`)
pub fn unit_name(task: &Task) -> String {
    format!("frameworks-{}", task.component())
}

/// Env file for a task, `/etc/frameworks/<component>.env` unless overridden
pub fn env_file(task: &Task) -> String {
    task.env_file
        .clone()
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| format!("/etc/frameworks/{}.env", task.component()))
}

fn tag(version: &str, fallback: &str) -> String {
    if version.is_empty() {
        fallback.to_string()
    } else {
        version.to_string()
    }
}

/// Container image: explicit, else a well-known image for infrastructure,
/// else the platform image of the deploy slug
pub fn image_for(task: &Task) -> String {
    if let Some(image) = task.image.as_deref().filter(|i| !i.is_empty()) {
        return image.to_string();
    }
    match task.task_type.as_str() {
        "redis" => format!("redis:{}", tag(&task.version, "7-alpine")),
        "clickhouse" => format!("clickhouse/clickhouse-server:{}", tag(&task.version, "latest")),
        "postgres" => format!("postgres:{}", tag(&task.version, "16")),
        deploy => format!("livepeerframeworks/{}:{}", deploy, tag(&task.version, "latest")),
    }
}

#[derive(Serialize)]
struct ComposeService {
    image: String,
    container_name: String,
    restart: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    command: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<String>,
    env_file: Vec<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    environment: IndexMap<String, String>,
    volumes: Vec<String>,
    networks: Vec<&'static str>,
    logging: Logging,
}

#[derive(Serialize)]
struct Logging {
    driver: &'static str,
    options: IndexMap<&'static str, String>,
}

#[derive(Serialize)]
struct Network {
    driver: &'static str,
}

#[derive(Serialize)]
struct ComposeDocument {
    services: IndexMap<String, ComposeService>,
    networks: IndexMap<&'static str, Network>,
}

fn is_env_key(key: &str) -> bool {
    key.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// `redis-server` arguments: append-only persistence, a non-default port and
/// the AUTH password, then every lowercase config key as `--<directive> <value>`
pub fn redis_command(task: &Task) -> Vec<String> {
    let mut args: Vec<String> = ["redis-server", "--appendonly", "yes"]
        .into_iter()
        .map(String::from)
        .collect();
    if let Some(port) = task.port.filter(|p| *p != infra::REDIS) {
        args.push("--port".into());
        args.push(port.to_string());
    }
    if let Some(password) = task.config.get(REDIS_PASSWORD_ENV) {
        args.push("--requirepass".into());
        args.push(password.clone());
    }
    for (directive, value) in task.config.iter().filter(|(k, _)| !is_env_key(k)) {
        args.push(format!("--{}", directive));
        args.push(value.clone());
    }
    args
}

/// `docker-compose.yml` for a task
pub fn compose_document(task: &Task) -> Result<String> {
    let name = task.component().to_string();
    let mut ports = Vec::new();
    for port in task.port.iter().chain(task.grpc_port.iter()) {
        let mapping = format!("{}:{}", port, port);
        if !ports.contains(&mapping) {
            ports.push(mapping);
        }
    }

    let environment: IndexMap<String, String> = task
        .config
        .iter()
        .filter(|(k, _)| is_env_key(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let is_redis = task.task_type == "redis";
    let command = if is_redis { redis_command(task) } else { Vec::new() };
    let volumes = if is_redis {
        vec![format!("/var/lib/frameworks/{}:/data", name)]
    } else {
        vec![
            format!("/var/log/frameworks/{}:/var/log/frameworks", name),
            format!("/var/lib/frameworks/{}:/var/lib/frameworks", name),
        ]
    };

    let mut log_options = IndexMap::new();
    log_options.insert("max-size", "100m".to_string());
    log_options.insert("max-file", "10".to_string());
    log_options.insert("labels", format!("service={}", name));

    let service = ComposeService {
        image: image_for(task),
        container_name: unit_name(task),
        restart: "always",
        command,
        ports,
        env_file: vec![env_file(task)],
        environment,
        volumes,
        networks: vec!["frameworks"],
        logging: Logging {
            driver: "json-file",
            options: log_options,
        },
    };

    let mut services = IndexMap::new();
    services.insert(name, service);
    let mut networks = IndexMap::new();
    networks.insert("frameworks", Network { driver: "bridge" });

    Ok(serde_yaml::to_string(&ComposeDocument { services, networks })?)
}

/// systemd unit for a natively installed task
pub fn systemd_unit(task: &Task) -> String {
    let dir = install_dir(task);
    format!(
        "[Unit]
Description=Frameworks {name}
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
User=frameworks
Group=frameworks
WorkingDirectory={dir}
EnvironmentFile=-{env}
ExecStart={dir}/{binary}
Restart=always
RestartSec=5s
StandardOutput=journal
StandardError=journal
SyslogIdentifier={unit}
NoNewPrivileges=true
PrivateTmp=true

[Install]
WantedBy=multi-user.target
",
        name = task.component(),
        dir = dir,
        env = env_file(task),
        binary = task.task_type,
        unit = unit_name(task),
    )
}

fn write_file(path: &str, content: &str) -> String {
    format!(
        "cat > {} <<'{}'\n{}{}{}\n",
        shell_quote(path),
        EOF_MARKER,
        content,
        if content.ends_with('\n') { "" } else { "\n" },
        EOF_MARKER
    )
}

/// Script that installs and starts a task in docker mode
pub fn docker_script(task: &Task) -> Result<String> {
    let dir = install_dir(task);
    let mut script = String::from("set -e\n");
    script.push_str(&format!("mkdir -p {}\n", shell_quote(&dir)));
    script.push_str(&write_file(
        &format!("{}/docker-compose.yml", dir),
        &compose_document(task)?,
    ));
    script.push_str(&format!("cd {}\n", shell_quote(&dir)));
    script.push_str("docker compose pull\n");
    script.push_str("docker compose up -d\n");
    Ok(script)
}

/// Script that downloads a release archive and installs a systemd unit
pub fn native_script(task: &Task) -> Result<String> {
    let url = task
        .binary_url
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            Error::backend(format!("task {}: native mode requires binary_url", task.name))
        })?;
    let dir = install_dir(task);
    let unit = unit_name(task);
    let archive = format!("/tmp/{}.tar.gz", unit);

    let mut script = String::from("set -e\n");
    script.push_str(&format!("mkdir -p {}\n", shell_quote(&dir)));
    script.push_str(&format!("wget -q -O {} {}\n", shell_quote(&archive), shell_quote(url)));
    script.push_str(&format!("tar -xzf {} -C {}\n", shell_quote(&archive), shell_quote(&dir)));
    script.push_str(&format!("chmod +x {}/{}\n", shell_quote(&dir), shell_quote(&task.task_type)));
    script.push_str(&format!("rm -f {}\n", shell_quote(&archive)));
    script.push_str(&write_file(
        &format!("/etc/systemd/system/{}.service", unit),
        &systemd_unit(task),
    ));
    script.push_str("systemctl daemon-reload\n");
    script.push_str(&format!("systemctl enable {}\n", unit));
    script.push_str(&format!("systemctl restart {}\n", unit));
    Ok(script)
}

/// Install script for the task's mode
pub fn install_script(task: &Task) -> Result<String> {
    match task.mode {
        DeployMode::Docker => docker_script(task),
        DeployMode::Native => native_script(task),
    }
}
