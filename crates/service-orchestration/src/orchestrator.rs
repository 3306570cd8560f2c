//! Plan, execute and validate a cluster
//!
//! The [`Orchestrator`] ties the planner, the backend registry and the health
//! checkers together. Batches run strictly in order; the tasks of one batch
//! run concurrently when requested. A failed task never aborts its batch, but
//! everything that depends on it, directly or through other tasks, is skipped.

use chrono::Utc;
use cluster_manifest::{Manifest, ServiceConfig, ServiceDefaults, ServiceDefinitions, validate};
use futures::future::join_all;
use health_checks::{CheckResult, Checker, CheckerRegistry, HttpChecker};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use tracing::{debug, error, info, warn};

use crate::backends::{BackendRegistry, TaskContext};
use crate::planner::Planner;
use crate::task::{
    BLOCKED_MESSAGE, CANCELLED_MESSAGE, ExecutionPlan, ExecutionReport, ProvisionOptions,
    SATISFIED_MESSAGE, Task, TaskResult,
};
use crate::{Error, Result};

/// ClickHouse HTTP interface, probed instead of the native port
pub const CLICKHOUSE_HTTP_PORT: u16 = 8123;
/// Path probed by the registry's `http` checker
const DEFAULT_HEALTH_PATH: &str = "/health";
/// Output lines kept in a failed task's error
const FAILURE_TAIL_LINES: usize = 20;

/// Section of a health report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthGroup {
    /// Postgres, ClickHouse, Kafka, ZooKeeper and Redis
    Infrastructure,
    /// Entries of `services`
    Applications,
    /// Entries of `interfaces`
    Interfaces,
    /// Entries of `observability`
    Observability,
}

impl fmt::Display for HealthGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthGroup::Infrastructure => "Infrastructure",
            HealthGroup::Applications => "Applications",
            HealthGroup::Interfaces => "Interfaces",
            HealthGroup::Observability => "Observability",
        })
    }
}

/// One probed endpoint
#[derive(Debug, Clone, Serialize)]
pub struct HealthEntry {
    /// Report section
    pub group: HealthGroup,
    /// Component name, e.g. `postgres` or `kafka-broker-1`
    pub target: String,
    /// Manifest host name
    pub host: String,
    /// Probed port
    pub port: u16,
    /// Probe outcome
    pub result: CheckResult,
}

/// Health of every provisioned endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusterHealth {
    /// One entry per probed endpoint, in probe order
    pub results: Vec<HealthEntry>,
}

impl ClusterHealth {
    /// Entries whose probe succeeded
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|e| e.result.ok).count()
    }

    /// Number of probed endpoints
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// True when every probe succeeded
    pub fn is_healthy(&self) -> bool {
        self.passed() == self.total()
    }

    /// `Summary: <ok>/<total> checks passed`
    pub fn summary(&self) -> String {
        format!("Summary: {}/{} checks passed", self.passed(), self.total())
    }
}

/// Drives provisioning of one manifest
pub struct Orchestrator {
    manifest: Arc<Manifest>,
    defaults: Arc<dyn ServiceDefaults>,
    backends: Arc<BackendRegistry>,
    checkers: Arc<CheckerRegistry>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Orchestrator with the built-in service table, backends and checkers
    pub fn new(manifest: Manifest) -> Self {
        Self {
            manifest: Arc::new(manifest),
            defaults: Arc::new(ServiceDefinitions::builtin()),
            backends: Arc::new(BackendRegistry::new()),
            checkers: Arc::new(CheckerRegistry::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the backend registry
    pub fn with_backends(mut self, backends: BackendRegistry) -> Self {
        self.backends = Arc::new(backends);
        self
    }

    /// Replace the health checker registry
    pub fn with_checkers(mut self, checkers: CheckerRegistry) -> Self {
        self.checkers = Arc::new(checkers);
        self
    }

    /// The manifest being provisioned
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Token that aborts a running `execute`
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abort the current run; in-flight commands are killed
    pub fn cancel(&self) {
        warn!("Cancelling provisioning run");
        self.cancel.cancel();
    }

    /// Validate the manifest and build an execution plan
    pub fn plan(&self, opts: &ProvisionOptions) -> Result<ExecutionPlan> {
        validate(&self.manifest, self.defaults.as_ref())?;
        Planner::new(self.manifest.clone(), self.defaults.as_ref()).plan(opts)
    }

    /// Run every batch of `plan` and collect one result per task
    pub async fn execute(&self, plan: ExecutionPlan, opts: &ProvisionOptions) -> ExecutionReport {
        let ctx = TaskContext::new(plan.manifest.clone(), self.cancel.clone());
        let results: Arc<Mutex<Vec<TaskResult>>> = Arc::new(Mutex::new(Vec::new()));
        let semaphore = Arc::new(Semaphore::new(opts.max_parallel.max(1)));
        let mut unavailable: HashSet<String> = HashSet::new();

        info!("Executing plan {} ({} tasks)", plan.id, plan.len());
        for (index, batch) in plan.batches.iter().enumerate() {
            debug!(
                "Batch {}/{}: {}",
                index + 1,
                plan.batches.len(),
                batch.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ")
            );

            if opts.parallel && batch.len() > 1 {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|task| {
                        let blocked = is_blocked(task, &unavailable);
                        let task = task.clone();
                        let backends = self.backends.clone();
                        let ctx = ctx.clone();
                        let semaphore = semaphore.clone();
                        let results = results.clone();
                        let force = opts.force;
                        tokio::spawn(async move {
                            let _permit = semaphore.acquire_owned().await;
                            let result = run_task(&backends, &ctx, task, blocked, force).await;
                            results.lock().await.push(result);
                        })
                    })
                    .collect();

                for (task, joined) in batch.iter().zip(join_all(handles).await) {
                    if let Err(e) = joined {
                        error!("Task {} aborted: {}", task.name, e);
                        results
                            .lock()
                            .await
                            .push(TaskResult::failed(task.clone(), "task aborted", e.to_string()));
                    }
                }
            } else {
                for task in batch {
                    let blocked = is_blocked(task, &unavailable);
                    let result =
                        run_task(&self.backends, &ctx, task.clone(), blocked, opts.force).await;
                    results.lock().await.push(result);
                }
            }

            for result in results.lock().await.iter() {
                if !result.unblocks_dependents() {
                    unavailable.insert(result.task.name.clone());
                }
            }
        }

        let order: HashMap<&str, usize> = plan
            .all_tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.as_str(), i))
            .collect();
        let mut results = std::mem::take(&mut *results.lock().await);
        results.sort_by_key(|r| order.get(r.task.name.as_str()).copied().unwrap_or(usize::MAX));

        let report = ExecutionReport {
            run_id: Uuid::new_v4(),
            plan_id: plan.id,
            results,
        };
        match report.error() {
            Some(e) => warn!("{}", e),
            None => info!("Plan {} finished without failures", plan.id),
        }
        report
    }

    /// Probe every provisioned endpoint. Never fails; problems are reported
    /// in the returned entries.
    pub async fn validate(&self) -> ClusterHealth {
        let mut health = ClusterHealth::default();
        let infra_cfg = &self.manifest.infrastructure;

        if let Some(pg) = infra_cfg.postgres() {
            let port = pg.port.unwrap_or(cluster_manifest::ports::infra::POSTGRES);
            self.probe(&mut health, HealthGroup::Infrastructure, "postgres", &pg.host, port, "postgres")
                .await;
        }
        if let Some(ch) = infra_cfg.clickhouse() {
            self.probe(
                &mut health,
                HealthGroup::Infrastructure,
                "clickhouse",
                &ch.host,
                CLICKHOUSE_HTTP_PORT,
                "clickhouse",
            )
            .await;
        }
        if let Some(kafka) = infra_cfg.kafka() {
            for broker in &kafka.brokers {
                let port = broker.port.unwrap_or(cluster_manifest::ports::infra::KAFKA);
                let target = format!("kafka-broker-{}", broker.id);
                self.probe(&mut health, HealthGroup::Infrastructure, &target, &broker.host, port, "kafka")
                    .await;
            }
        }
        if let Some(zk) = infra_cfg.zookeeper() {
            for node in &zk.ensemble {
                let port = node.port.unwrap_or(cluster_manifest::ports::infra::ZOOKEEPER);
                let target = format!("zookeeper-{}", node.id);
                self.probe(&mut health, HealthGroup::Infrastructure, &target, &node.host, port, "tcp")
                    .await;
            }
        }
        if let Some(redis) = infra_cfg.redis() {
            for instance in &redis.instances {
                let port = instance.port.unwrap_or(cluster_manifest::ports::infra::REDIS);
                let target = format!("redis-{}", instance.name);
                self.probe(&mut health, HealthGroup::Infrastructure, &target, &instance.host, port, "tcp")
                    .await;
            }
        }

        let groups = [
            (HealthGroup::Applications, &self.manifest.services),
            (HealthGroup::Interfaces, &self.manifest.interfaces),
            (HealthGroup::Observability, &self.manifest.observability),
        ];
        for (group, entries) in groups {
            for (name, svc) in entries.iter().filter(|(_, s)| s.enabled) {
                self.probe_service(&mut health, group, name, svc).await;
            }
        }

        info!("{}", health.summary());
        health
    }

    async fn probe_service(
        &self,
        health: &mut ClusterHealth,
        group: HealthGroup,
        name: &str,
        svc: &ServiceConfig,
    ) {
        // first replica only
        let host = svc.target_hosts().first().map(|h| h.to_string());
        let port = svc.port.or_else(|| self.defaults.default_port(name));
        let (host, port) = match (host, port) {
            (Some(host), Some(port)) => (host, port),
            (host, port) => {
                let reason = if host.is_none() {
                    "no host assigned"
                } else {
                    "no port configured and no default known"
                };
                warn!("{}: {}", name, reason);
                health.results.push(HealthEntry {
                    group,
                    target: name.to_string(),
                    host: host.unwrap_or_default(),
                    port: port.unwrap_or_default(),
                    result: CheckResult::new(name).unknown(reason),
                });
                return;
            }
        };

        let protocol = match self.defaults.health_protocol(name).unwrap_or("http") {
            "grpc" => "tcp",
            other => other,
        };
        match self.defaults.health_path(name) {
            Some(path) if protocol == "http" && path != DEFAULT_HEALTH_PATH => {
                let checker = HttpChecker::new().with_path(path);
                self.probe_with(health, group, name, &host, port, |address| async move {
                    checker.check(&address, port).await
                })
                .await;
            }
            _ => self.probe(health, group, name, &host, port, protocol).await,
        }
    }

    async fn probe(
        &self,
        health: &mut ClusterHealth,
        group: HealthGroup,
        target: &str,
        host: &str,
        port: u16,
        protocol: &str,
    ) {
        let checkers = self.checkers.clone();
        let protocol = protocol.to_string();
        self.probe_with(health, group, target, host, port, |address| async move {
            checkers.check(&protocol, &address, port).await
        })
        .await;
    }

    async fn probe_with<F, Fut>(
        &self,
        health: &mut ClusterHealth,
        group: HealthGroup,
        target: &str,
        host: &str,
        port: u16,
        check: F,
    ) where
        F: FnOnce(String) -> Fut,
        Fut: std::future::Future<Output = CheckResult>,
    {
        let result = match self.manifest.host(host) {
            Some(h) => check(h.address.clone()).await,
            None => CheckResult::new(target).unhealthy(format!("host '{}' not found", host)),
        };
        if result.ok {
            debug!("{} on {}:{} healthy", target, host, port);
        } else {
            warn!(
                "{} on {}:{} {}: {}",
                target,
                host,
                port,
                result.status,
                result.error.as_deref().unwrap_or_default()
            );
        }
        health.results.push(HealthEntry {
            group,
            target: target.to_string(),
            host: host.to_string(),
            port,
            result,
        });
    }
}

fn is_blocked(task: &Task, unavailable: &HashSet<String>) -> bool {
    task.depends_on.iter().any(|d| unavailable.contains(d))
}

fn is_cancellation(e: &Error) -> bool {
    matches!(
        e,
        Error::Cancelled | Error::CommandExecutor(command_executor::Error::Cancelled { .. })
    )
}

async fn run_task(
    backends: &BackendRegistry,
    ctx: &TaskContext,
    task: Task,
    blocked: bool,
    force: bool,
) -> TaskResult {
    let started_at = Utc::now();
    let clock = Instant::now();

    let result = if ctx.cancel.is_cancelled() {
        TaskResult::failed(task, CANCELLED_MESSAGE, CANCELLED_MESSAGE)
    } else if blocked {
        info!("Skipping {}: {}", task.name, BLOCKED_MESSAGE);
        TaskResult::skipped(task, BLOCKED_MESSAGE)
    } else {
        attempt(backends, ctx, task, force).await
    };
    result.timed(started_at, clock.elapsed())
}

async fn attempt(backends: &BackendRegistry, ctx: &TaskContext, task: Task, force: bool) -> TaskResult {
    let backend = match backends.for_task(&task) {
        Ok(backend) => backend,
        Err(e) => return TaskResult::failed(task, "no backend", e.to_string()),
    };

    if task.idempotent && !force {
        match backend.is_satisfied(&task, ctx).await {
            Ok(true) => {
                info!("{} {}", task.name, SATISFIED_MESSAGE);
                return TaskResult::skipped(task, SATISFIED_MESSAGE);
            }
            Ok(false) => {}
            Err(e) if is_cancellation(&e) => {
                return TaskResult::failed(task, CANCELLED_MESSAGE, e.to_string());
            }
            Err(e) => debug!("{}: probe failed, provisioning anyway: {}", task.name, e),
        }
    }

    info!("Provisioning {} via {}", task.name, backend.name());
    match backend.run(&task, ctx).await {
        Ok(outcome) if outcome.success => {
            info!("{}: {}", task.name, outcome.message);
            TaskResult::success(task, outcome.message)
        }
        Ok(outcome) => {
            error!("{} failed: {}", task.name, outcome.message);
            let tail = outcome.output_tail(FAILURE_TAIL_LINES);
            TaskResult::failed(task, outcome.message, tail)
        }
        Err(e) if is_cancellation(&e) => TaskResult::failed(task, CANCELLED_MESSAGE, e.to_string()),
        Err(e) => {
            error!("{} failed: {}", task.name, e);
            TaskResult::failed(task, "backend error", e.to_string())
        }
    }
}
