//! Task execution backends
//!
//! A backend turns one [`Task`] into side effects on its host. Backends are
//! held in a [`BackendRegistry`] keyed by name and picked from the task type:
//! infrastructure with an Ansible role goes to `ansible`, everything else to
//! `shell`.

use async_trait::async_trait;
use cluster_manifest::{Host, Manifest};
use command_executor::backends::is_local_address;
use command_executor::{LocalRunner, RunOptions, Runner, SshConfig, SshRunner};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::task::Task;
use crate::{Error, Result};

pub mod ansible;
pub mod shell;
pub mod templates;

pub use ansible::AnsibleBackend;
pub use shell::ShellBackend;

/// Task types provisioned through Ansible roles
pub const ANSIBLE_TASK_TYPES: &[&str] = &["postgres", "kafka", "zookeeper"];

/// Name of the backend that handles a task type
pub fn backend_for(task_type: &str) -> &'static str {
    if ANSIBLE_TASK_TYPES.contains(&task_type) {
        "ansible"
    } else {
        "shell"
    }
}

/// Shared state handed to every backend call
#[derive(Clone)]
pub struct TaskContext {
    /// Manifest the plan was built from
    pub manifest: Arc<Manifest>,
    /// Cancelled when the run is aborted
    pub cancel: CancellationToken,
}

impl TaskContext {
    /// Context for a run
    pub fn new(manifest: Arc<Manifest>, cancel: CancellationToken) -> Self {
        Self { manifest, cancel }
    }

    /// Host entry of a task
    pub fn host(&self, task: &Task) -> Result<&Host> {
        self.manifest.host(&task.host).ok_or_else(|| {
            Error::backend(format!("task {}: host '{}' not in manifest", task.name, task.host))
        })
    }

    /// Run options with a deadline, cancelled with the run
    pub fn run_options(&self, timeout: Duration) -> RunOptions {
        RunOptions::with_timeout(timeout).cancel_on(self.cancel.clone())
    }
}

/// Uniform result of a backend run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutcome {
    /// Whether the task reached its desired state
    pub success: bool,
    /// One-line description
    pub message: String,
    /// Captured process output
    pub output: String,
}

impl TaskOutcome {
    /// Successful outcome
    pub fn success(message: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            output: output.into(),
        }
    }

    /// Failed outcome
    pub fn failure(message: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            output: output.into(),
        }
    }

    /// Last lines of output, for error reports
    pub fn output_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.output.lines().collect();
        all[all.len().saturating_sub(lines)..].join("\n")
    }
}

/// Something that can provision a task
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    /// Whether the task's desired state is already in place
    async fn is_satisfied(&self, task: &Task, ctx: &TaskContext) -> Result<bool>;

    /// Provision the task
    async fn run(&self, task: &Task, ctx: &TaskContext) -> Result<TaskOutcome>;
}

/// Registry that maps backend names to implementations
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn TaskBackend>>,
}

impl BackendRegistry {
    /// Registry with the Ansible and shell backends
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(AnsibleBackend::default()));
        registry.register(Arc::new(ShellBackend::default()));
        registry
    }

    /// Registry without any backends
    pub fn empty() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Register or replace a backend under its own name
    pub fn register(&mut self, backend: Arc<dyn TaskBackend>) {
        let name = backend.name().to_string();
        self.backends.insert(name, backend);
    }

    /// Register or replace a backend under an explicit name
    pub fn register_as(&mut self, name: &str, backend: Arc<dyn TaskBackend>) {
        self.backends.insert(name.to_string(), backend);
    }

    /// Get a backend by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskBackend>> {
        self.backends.get(name).cloned()
    }

    /// Backend that handles a task
    pub fn for_task(&self, task: &Task) -> Result<Arc<dyn TaskBackend>> {
        let name = backend_for(&task.task_type);
        self.get(name).ok_or_else(|| {
            Error::backend(format!(
                "no backend registered as '{}' for task {}",
                name, task.name
            ))
        })
    }

    /// All registered backend names, sorted
    pub fn list_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Runner for a manifest host: local for loopback addresses, SSH otherwise
pub fn host_runner(host: &Host) -> Arc<dyn Runner> {
    if is_local_address(&host.address) {
        return Arc::new(LocalRunner::new());
    }
    let mut config = SshConfig::new(&host.address);
    if !host.user.is_empty() {
        config = config.with_user(&host.user);
    }
    if let Some(key) = host.ssh_key.as_deref().filter(|k| !k.is_empty()) {
        config = config.with_identity_file(key);
    }
    Arc::new(SshRunner::new(config))
}
