//! Manifest to execution plan

use cluster_manifest::ports::infra;
use cluster_manifest::{Manifest, ServiceConfig, ServiceDefaults, resolve_zookeeper_connect};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backends::templates::REDIS_PASSWORD_ENV;
use crate::graph::DependencyGraph;
use crate::task::{ExecutionPlan, Phase, ProvisionOptions, Task};
use crate::{Error, Result};

/// Control plane service every other application waits for
pub const QUARTERMASTER: &str = "quartermaster";
/// Mesh agent every other application waits for
pub const PRIVATEER: &str = "privateer";

/// ZooKeeper quorum and election ports
const ZK_PEER_PORTS: &str = "2888:3888";

/// Builds [`ExecutionPlan`]s from a manifest. Planning has no side effects.
pub struct Planner<'a> {
    manifest: Arc<Manifest>,
    defaults: &'a dyn ServiceDefaults,
}

impl<'a> Planner<'a> {
    /// Planner for a validated manifest
    pub fn new(manifest: Arc<Manifest>, defaults: &'a dyn ServiceDefaults) -> Self {
        Self { manifest, defaults }
    }

    /// Build the plan for the requested phase and filters
    pub fn plan(&self, opts: &ProvisionOptions) -> Result<ExecutionPlan> {
        let mut graph = DependencyGraph::new();

        if opts.phase.includes(Phase::Infrastructure) {
            self.add_infrastructure_tasks(&mut graph)?;
        }
        let apps = if opts.phase.includes(Phase::Applications) {
            self.add_application_tasks(&mut graph)?
        } else {
            Vec::new()
        };
        if opts.phase.includes(Phase::Interfaces) {
            self.add_interface_tasks(&mut graph, &apps)?;
        }
        graph.validate()?;

        if !opts.only_hosts.is_empty() || !opts.only_services.is_empty() {
            graph.retain(|task| {
                let host_ok = opts.only_hosts.is_empty() || opts.only_hosts.contains(&task.host);
                let svc_ok = opts.only_services.is_empty()
                    || opts.only_services.iter().any(|s| s == task.component() || *s == task.name);
                host_ok && svc_ok
            });
            debug!("{} tasks left after host/service filters", graph.len());
        }

        let batches = graph.batches()?;
        let plan = ExecutionPlan::new(self.manifest.clone(), batches);
        info!(
            "Planned {} tasks in {} batches (phase {})",
            plan.len(),
            plan.batches.len(),
            opts.phase
        );
        Ok(plan)
    }

    fn cluster_for(&self, svc: Option<&ServiceConfig>) -> Option<String> {
        svc.and_then(|s| s.config.get("cluster_id"))
            .filter(|c| !c.is_empty())
            .cloned()
            .or_else(|| self.manifest.profile.clone().filter(|p| !p.is_empty()))
    }

    fn address_of(&self, host: &str) -> String {
        self.manifest
            .host(host)
            .map(|h| h.address.clone())
            .unwrap_or_else(|| host.to_string())
    }

    fn infra_task(&self, name: String, task_type: &str, host: &str) -> Task {
        let mut task = Task::new(name, task_type, host, Phase::Infrastructure);
        task.cluster_id = self.cluster_for(None);
        task
    }

    fn add_infrastructure_tasks(&self, graph: &mut DependencyGraph) -> Result<()> {
        let infra_cfg = &self.manifest.infrastructure;

        if let Some(pg) = infra_cfg.postgres() {
            let mut task = self.infra_task("postgres".into(), "postgres", &pg.host);
            task.mode = pg.mode.unwrap_or_default();
            task.version = pg.version.clone();
            task.port = Some(pg.port.unwrap_or(infra::POSTGRES));
            let dbs: Vec<&str> = pg.databases.iter().map(|d| d.name.as_str()).collect();
            graph.add_task(task.with_config("databases", dbs.join(",")))?;
        }

        if let Some(redis) = infra_cfg.redis() {
            for instance in &redis.instances {
                let mut task =
                    self.infra_task(format!("redis-{}", instance.name), "redis", &instance.host);
                task.mode = redis.mode.unwrap_or_default();
                task.version = redis.version.clone();
                task.port = Some(instance.port.unwrap_or(infra::REDIS));
                task.config = instance.config.clone();
                if let Some(password) = instance.password.as_deref().filter(|p| !p.is_empty()) {
                    task.config.insert(REDIS_PASSWORD_ENV.to_string(), password.to_string());
                }
                graph.add_task(task)?;
            }
        }

        let mut zk_tasks = Vec::new();
        if let Some(zk) = infra_cfg.zookeeper() {
            let servers: Vec<String> = zk
                .ensemble
                .iter()
                .map(|n| format!("server.{}={}:{}", n.id, self.address_of(&n.host), ZK_PEER_PORTS))
                .collect();
            for node in &zk.ensemble {
                let name = format!("zookeeper-{}", node.id);
                let mut task = self.infra_task(name.clone(), "zookeeper", &node.host);
                task.mode = zk.mode.unwrap_or_default();
                task.version = zk.version.clone();
                task.port = Some(node.port.unwrap_or(infra::ZOOKEEPER));
                graph.add_task(
                    task.with_config("server_id", node.id.to_string())
                        .with_config("servers", servers.join(" ")),
                )?;
                zk_tasks.push(name);
            }
        }

        if let Some(kafka) = infra_cfg.kafka() {
            let zk_connect = resolve_zookeeper_connect(&self.manifest).unwrap_or_default();
            for broker in &kafka.brokers {
                let mut task = self
                    .infra_task(format!("kafka-broker-{}", broker.id), "kafka", &broker.host)
                    .depends_on(zk_tasks.iter().cloned());
                task.mode = kafka.mode.unwrap_or_default();
                task.version = kafka.version.clone();
                task.port = Some(broker.port.unwrap_or(infra::KAFKA));
                graph.add_task(
                    task.with_config("broker_id", broker.id.to_string())
                        .with_config("zookeeper_connect", zk_connect.clone()),
                )?;
            }
        }

        if let Some(ch) = infra_cfg.clickhouse() {
            let mut task = self.infra_task("clickhouse".into(), "clickhouse", &ch.host);
            task.mode = ch.mode.unwrap_or_default();
            task.version = ch.version.clone();
            task.port = Some(ch.port.unwrap_or(infra::CLICKHOUSE));
            graph.add_task(task.with_config("databases", ch.databases.join(",")))?;
        }

        Ok(())
    }

    /// Names of infrastructure tasks applications wait for
    fn infra_deps(&self) -> Vec<String> {
        let infra_cfg = &self.manifest.infrastructure;
        let mut deps = Vec::new();
        if infra_cfg.postgres().is_some() {
            deps.push("postgres".to_string());
        }
        if let Some(redis) = infra_cfg.redis() {
            deps.extend(redis.instances.iter().map(|i| format!("redis-{}", i.name)));
        }
        if let Some(kafka) = infra_cfg.kafka() {
            deps.extend(kafka.brokers.iter().map(|b| format!("kafka-broker-{}", b.id)));
        }
        deps
    }

    fn service_tasks(
        &self,
        name: &str,
        svc: &ServiceConfig,
        phase: Phase,
        kind: &str,
    ) -> Result<Vec<Task>> {
        let deploy = self
            .defaults
            .deploy_name(name, svc.deploy.as_deref())
            .ok_or_else(|| Error::planning(format!("unknown {} id: {}", kind, name)))?;

        let hosts = svc.target_hosts();
        let hosts = if hosts.is_empty() { vec![""] } else { hosts };
        let multi = hosts.len() > 1;

        Ok(hosts
            .into_iter()
            .map(|host| {
                let task_name = if multi {
                    format!("{}@{}", name, host)
                } else {
                    name.to_string()
                };
                let mut task = Task::new(task_name, deploy.clone(), host, phase);
                task.cluster_id = self.cluster_for(Some(svc));
                task.mode = svc.resolved_mode();
                task.version = svc.version.clone();
                task.image = svc.image.clone();
                task.binary_url = svc.binary_url.clone();
                task.port = svc.port.or_else(|| self.defaults.default_port(name));
                task.grpc_port = svc.grpc_port.or_else(|| self.defaults.default_grpc_port(name));
                task.env_file = svc.env_file.clone();
                task.config = svc.config.clone();
                task
            })
            .collect())
    }

    /// Add application tasks, returning every application task name
    fn add_application_tasks(&self, graph: &mut DependencyGraph) -> Result<Vec<String>> {
        let infra_deps: Vec<String> = self
            .infra_deps()
            .into_iter()
            .filter(|d| graph.contains(d))
            .collect();

        let mut by_service: BTreeMap<&str, Vec<Task>> = BTreeMap::new();
        for (name, svc) in self.manifest.enabled_services() {
            let tasks = self.service_tasks(name, svc, Phase::Applications, "service")?;
            by_service.insert(name.as_str(), tasks);
        }
        let names_of = |svc: &str| -> Vec<String> {
            by_service
                .get(svc)
                .map(|ts| ts.iter().map(|t| t.name.clone()).collect())
                .unwrap_or_default()
        };
        let qm_tasks = names_of(QUARTERMASTER);
        let privateer_tasks = names_of(PRIVATEER);

        let mut planned = Vec::new();
        for (name, tasks) in &by_service {
            let declared = &self.manifest.services[*name].depends_on;
            for mut task in tasks.clone() {
                task.depends_on.extend(infra_deps.iter().cloned());
                if *name != QUARTERMASTER {
                    task.depends_on.extend(qm_tasks.iter().cloned());
                }
                if *name != QUARTERMASTER && *name != PRIVATEER {
                    task.depends_on.extend(privateer_tasks.iter().cloned());
                }
                for dep in declared {
                    let targets = names_of(dep);
                    if targets.is_empty() {
                        // left dangling so validation names it
                        task.depends_on.push(dep.clone());
                    } else {
                        task.depends_on.extend(targets);
                    }
                }
                task.depends_on.sort();
                task.depends_on.dedup();
                planned.push(task.name.clone());
                graph.add_task(task)?;
            }
        }
        Ok(planned)
    }

    fn add_interface_tasks(&self, graph: &mut DependencyGraph, apps: &[String]) -> Result<()> {
        let groups = [
            (self.manifest.enabled_interfaces().collect::<Vec<_>>(), "interface"),
            (self.manifest.enabled_observability().collect::<Vec<_>>(), "observability"),
        ];
        for (entries, kind) in groups {
            for (name, svc) in entries {
                for task in self.service_tasks(name, svc, Phase::Interfaces, kind)? {
                    graph.add_task(task.depends_on(apps.iter().cloned()))?;
                }
            }
        }
        Ok(())
    }
}
