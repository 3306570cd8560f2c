//! Remote shell backend
//!
//! Installs compose projects or systemd units over SSH (or locally for
//! loopback hosts) by running generated scripts.

use async_trait::async_trait;
use cluster_manifest::DeployMode;
use command_executor::{Command, Runner};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::templates::{install_script, unit_name};
use super::{TaskBackend, TaskContext, TaskOutcome, host_runner};
use crate::Result;
use crate::task::Task;

/// Default deadline for one remote script
pub const DEFAULT_SSH_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Deadline for idempotency probes
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend that runs install scripts through a [`Runner`]
pub struct ShellBackend {
    timeout: Duration,
    runner: Option<Arc<dyn Runner>>,
}

impl Default for ShellBackend {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SSH_TIMEOUT,
            runner: None,
        }
    }
}

impl ShellBackend {
    /// Backend that picks a runner per host
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-script deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run everything through one runner instead of per-host runners
    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runner = Some(runner);
        self
    }

    fn runner_for(&self, task: &Task, ctx: &TaskContext) -> Result<Arc<dyn Runner>> {
        match &self.runner {
            Some(runner) => Ok(runner.clone()),
            None => Ok(host_runner(ctx.host(task)?)),
        }
    }
}

/// Command that reports whether a task is already running
pub fn probe_command(task: &Task) -> Command {
    let unit = unit_name(task);
    match task.mode {
        DeployMode::Docker => Command::builder("docker")
            .args(["ps", "--filter"])
            .arg(format!("name={}", unit))
            .args(["--format", "{{.State}}"])
            .build(),
        DeployMode::Native => Command::builder("systemctl")
            .args(["is-active", unit.as_str()])
            .build(),
    }
}

#[async_trait]
impl TaskBackend for ShellBackend {
    fn name(&self) -> &str {
        "shell"
    }

    async fn is_satisfied(&self, task: &Task, ctx: &TaskContext) -> Result<bool> {
        let runner = self.runner_for(task, ctx)?;
        let output = runner
            .run_command(&probe_command(task), &ctx.run_options(PROBE_TIMEOUT))
            .await?;

        let satisfied = match task.mode {
            DeployMode::Docker => {
                output.success() && output.stdout.lines().any(|l| l.trim() == "running")
            }
            DeployMode::Native => output.success(),
        };
        debug!("{} on {}: satisfied={}", task.name, runner.describe(), satisfied);
        Ok(satisfied)
    }

    async fn run(&self, task: &Task, ctx: &TaskContext) -> Result<TaskOutcome> {
        let runner = self.runner_for(task, ctx)?;
        let script = install_script(task)?;

        info!(
            "Provisioning {} ({}) on {}",
            task.name,
            task.mode,
            runner.describe()
        );
        let output = runner.run(&script, &ctx.run_options(self.timeout)).await?;

        if output.success() {
            Ok(TaskOutcome::success(
                format!("{} provisioned ({}) on {}", task.name, task.mode, runner.describe()),
                output.combined(),
            ))
        } else {
            warn!("{} failed with exit code {}", task.name, output.exit_code());
            Ok(TaskOutcome::failure(
                format!("install script exited with code {}", output.exit_code()),
                output.combined(),
            ))
        }
    }
}
