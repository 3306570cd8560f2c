//! Tasks, plans and execution results

use chrono::{DateTime, Utc};
use cluster_manifest::{DeployMode, Manifest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::Error;

/// Provisioning phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Databases, brokers and caches
    Infrastructure,
    /// Platform services
    Applications,
    /// Web front ends and observability
    Interfaces,
    /// Every phase in order
    #[default]
    All,
}

impl Phase {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Infrastructure => "infrastructure",
            Phase::Applications => "applications",
            Phase::Interfaces => "interfaces",
            Phase::All => "all",
        }
    }

    /// Whether selecting `self` plans the tasks of `phase`
    pub fn includes(&self, phase: Phase) -> bool {
        *self == Phase::All || *self == phase
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "infrastructure" | "infra" => Ok(Phase::Infrastructure),
            "applications" | "apps" => Ok(Phase::Applications),
            "interfaces" => Ok(Phase::Interfaces),
            "all" | "" => Ok(Phase::All),
            other => Err(Error::planning(format!("unknown phase: {}", other))),
        }
    }
}

/// A unit of provisioning work on one host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique name (`postgres`, `kafka-broker-1`, `bridge@web-2`)
    pub name: String,
    /// Backend and target selector (`postgres`, `kafka`, a deploy slug)
    pub task_type: String,
    /// Host name from the manifest
    pub host: String,
    /// Cluster the component belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    /// Names of tasks that must finish first
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Phase that produced this task
    pub phase: Phase,
    /// Safe to skip when already in place
    pub idempotent: bool,
    /// Deployment mode
    #[serde(default)]
    pub mode: DeployMode,
    /// Requested version, empty for latest
    #[serde(default)]
    pub version: String,
    /// Explicit container image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Explicit release archive for native mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_url: Option<String>,
    /// Main listening port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// gRPC port, when the component has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_port: Option<u16>,
    /// Env file passed to the container or unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<String>,
    /// Backend specific parameters
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl Task {
    /// Task with no dependencies and default deployment parameters
    pub fn new(name: impl Into<String>, task_type: impl Into<String>, host: impl Into<String>, phase: Phase) -> Self {
        Self {
            name: name.into(),
            task_type: task_type.into(),
            host: host.into(),
            cluster_id: None,
            depends_on: Vec::new(),
            phase,
            idempotent: true,
            mode: DeployMode::Docker,
            version: String::new(),
            image: None,
            binary_url: None,
            port: None,
            grpc_port: None,
            env_file: None,
            config: BTreeMap::new(),
        }
    }

    /// Add dependencies
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Set a backend parameter
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Component name without the `@host` suffix
    pub fn component(&self) -> &str {
        match self.name.split_once('@') {
            Some((component, _)) => component,
            None => &self.name,
        }
    }
}

/// Outcome of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Backend ran and reported success
    Success,
    /// Already satisfied, or blocked by a failed dependency
    Skipped,
    /// Backend failed, or the run was cancelled
    Failed,
}

impl TaskStatus {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Success => "success",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message of a task skipped because a dependency did not succeed
pub const BLOCKED_MESSAGE: &str = "blocked by failed dependency";
/// Message of a task skipped by its idempotency probe
pub const SATISFIED_MESSAGE: &str = "already satisfied";
/// Message of a task that never finished because the run was cancelled
pub const CANCELLED_MESSAGE: &str = "cancelled";

/// What happened to one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// The task
    pub task: Task,
    /// Outcome
    pub status: TaskStatus,
    /// Short human readable description
    pub message: String,
    /// Failure detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When work on the task began
    pub started_at: DateTime<Utc>,
    /// Wall time spent
    pub duration: Duration,
}

impl TaskResult {
    fn new(task: Task, status: TaskStatus, message: impl Into<String>) -> Self {
        Self {
            task,
            status,
            message: message.into(),
            error: None,
            started_at: Utc::now(),
            duration: Duration::ZERO,
        }
    }

    /// Successful run
    pub fn success(task: Task, message: impl Into<String>) -> Self {
        Self::new(task, TaskStatus::Success, message)
    }

    /// Skipped run
    pub fn skipped(task: Task, message: impl Into<String>) -> Self {
        Self::new(task, TaskStatus::Skipped, message)
    }

    /// Failed run
    pub fn failed(task: Task, message: impl Into<String>, error: impl Into<String>) -> Self {
        let mut result = Self::new(task, TaskStatus::Failed, message);
        result.error = Some(error.into());
        result
    }

    /// Record timing
    pub fn timed(mut self, started_at: DateTime<Utc>, duration: Duration) -> Self {
        self.started_at = started_at;
        self.duration = duration;
        self
    }

    /// Whether dependents may run after this result
    pub fn unblocks_dependents(&self) -> bool {
        match self.status {
            TaskStatus::Success => true,
            TaskStatus::Skipped => self.message == SATISFIED_MESSAGE,
            TaskStatus::Failed => false,
        }
    }
}

/// Knobs for planning and execution
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Which phase to plan
    pub phase: Phase,
    /// Keep only tasks on these hosts
    pub only_hosts: Vec<String>,
    /// Keep only tasks of these components
    pub only_services: Vec<String>,
    /// Plan without executing
    pub dry_run: bool,
    /// Run tasks even when their idempotency probe says they are in place
    pub force: bool,
    /// Run the tasks of a batch concurrently
    pub parallel: bool,
    /// Concurrency bound when `parallel` is set
    pub max_parallel: usize,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            phase: Phase::All,
            only_hosts: Vec::new(),
            only_services: Vec::new(),
            dry_run: false,
            force: false,
            parallel: false,
            max_parallel: 8,
        }
    }
}

/// Ordered batches of tasks for one manifest.
///
/// Not `Clone`: [`Orchestrator::execute`](crate::Orchestrator::execute) takes
/// the plan by value, so a plan runs at most once.
#[derive(Debug)]
pub struct ExecutionPlan {
    /// Content id, equal for plans built from the same manifest and options
    pub id: Uuid,
    /// The manifest the plan was built from
    pub manifest: Arc<Manifest>,
    /// Tasks grouped so every dependency sits in an earlier batch
    pub batches: Vec<Vec<Task>>,
    /// Every task, in batch order
    pub all_tasks: Vec<Task>,
}

impl ExecutionPlan {
    /// Build a plan from ordered batches
    pub fn new(manifest: Arc<Manifest>, batches: Vec<Vec<Task>>) -> Self {
        let all_tasks: Vec<Task> = batches.iter().flatten().cloned().collect();
        Self {
            id: plan_id(&manifest, &all_tasks),
            manifest,
            batches,
            all_tasks,
        }
    }

    /// Number of tasks
    pub fn len(&self) -> usize {
        self.all_tasks.len()
    }

    /// Whether the plan has no tasks
    pub fn is_empty(&self) -> bool {
        self.all_tasks.is_empty()
    }

    /// Look up a task by name
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.all_tasks.iter().find(|t| t.name == name)
    }
}

fn plan_id(manifest: &Manifest, tasks: &[Task]) -> Uuid {
    let mut key = serde_yaml::to_string(manifest).unwrap_or_default();
    for task in tasks {
        key.push('\n');
        key.push_str(&task.name);
        key.push('@');
        key.push_str(&task.host);
    }
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}

/// Every task result of one `execute` call
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    /// Id of this run
    pub run_id: Uuid,
    /// Id of the executed plan
    pub plan_id: Uuid,
    /// One result per planned task
    pub results: Vec<TaskResult>,
}

impl ExecutionReport {
    /// Results with the given status
    pub fn with_status(&self, status: TaskStatus) -> impl Iterator<Item = &TaskResult> {
        self.results.iter().filter(move |r| r.status == status)
    }

    /// Number of results with the given status
    pub fn count(&self, status: TaskStatus) -> usize {
        self.with_status(status).count()
    }

    /// Result of a task by name
    pub fn result(&self, name: &str) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.task.name == name)
    }

    /// `Some` iff at least one task failed
    pub fn error(&self) -> Option<Error> {
        let failed: Vec<&str> = self
            .with_status(TaskStatus::Failed)
            .map(|r| r.task.name.as_str())
            .collect();
        if failed.is_empty() {
            return None;
        }
        Some(Error::execution(format!(
            "{} of {} tasks failed: {}",
            failed.len(),
            self.results.len(),
            failed.join(", ")
        )))
    }
}
