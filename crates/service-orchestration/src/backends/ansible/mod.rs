//! Ansible backend
//!
//! Stateful infrastructure (PostgreSQL, Kafka, ZooKeeper) is installed by
//! community roles. The backend renders a one-play playbook and an inventory
//! of the whole manifest, then runs `ansible-playbook` limited to the task's
//! host.

use async_trait::async_trait;
use health_checks::{Checker, TcpChecker};
use std::sync::Arc;
use tracing::{debug, info};

use super::{TaskBackend, TaskContext, TaskOutcome};
use crate::Result;
use crate::task::Task;

pub mod executor;
pub mod generators;
pub mod inventory;
pub mod playbook;

pub use executor::{AnsibleExecutor, ExecuteOptions, ExecuteResult, PlaybookRunStats, parse_recap};
pub use inventory::{Inventory, InventoryGroup, InventoryHost};
pub use playbook::{AnsibleTask, Handler, Play, Playbook, Role};

/// Backend that provisions tasks with `ansible-playbook`
pub struct AnsibleBackend {
    executor: AnsibleExecutor,
    probe: Arc<dyn Checker>,
}

impl Default for AnsibleBackend {
    fn default() -> Self {
        Self {
            executor: AnsibleExecutor::default(),
            probe: Arc::new(TcpChecker::new()),
        }
    }
}

impl AnsibleBackend {
    /// Backend around `executor`, probing ports over TCP
    pub fn new(executor: AnsibleExecutor) -> Self {
        Self {
            executor,
            ..Default::default()
        }
    }

    /// Replace the idempotency probe
    pub fn with_probe(mut self, probe: Arc<dyn Checker>) -> Self {
        self.probe = probe;
        self
    }
}

fn recap_message(task: &Task, stats: Option<&PlaybookRunStats>) -> String {
    match stats {
        Some(s) => format!(
            "{}: ok={} changed={} unreachable={} failed={} skipped={}",
            task.name, s.ok, s.changed, s.unreachable, s.failures, s.skipped
        ),
        None => format!("{}: playbook finished without recap", task.name),
    }
}

#[async_trait]
impl TaskBackend for AnsibleBackend {
    fn name(&self) -> &str {
        "ansible"
    }

    async fn is_satisfied(&self, task: &Task, ctx: &TaskContext) -> Result<bool> {
        let Some(port) = task.port else {
            return Ok(false);
        };
        let host = ctx.host(task)?;
        let result = self.probe.check(&host.address, port).await;
        debug!("{} probe {}:{} -> {}", task.name, host.address, port, result.status);
        Ok(result.ok)
    }

    async fn run(&self, task: &Task, ctx: &TaskContext) -> Result<TaskOutcome> {
        let host = ctx.host(task)?;
        let playbook = generators::playbook_for(task, host, &ctx.manifest)?;
        let inventory = Inventory::from_manifest(&ctx.manifest);
        let opts = ExecuteOptions {
            limit: Some(task.host.clone()),
            ..Default::default()
        };

        info!("Running {} for {}", playbook.summary(), task.name);
        let result = self
            .executor
            .execute_playbook(
                &playbook,
                &inventory,
                opts,
                &ctx.run_options(self.executor.timeout()),
            )
            .await?;

        let message = recap_message(task, result.stats.as_ref());
        if result.success {
            Ok(TaskOutcome::success(message, result.output))
        } else {
            Ok(TaskOutcome::failure(
                format!("ansible playbook failed ({})", message),
                result.output,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Phase;
    use cluster_manifest::{Host, Manifest};
    use command_executor::{Command, CommandOutput, ExitStatus, RunOptions, Runner};
    use health_checks::CheckResult;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedProbe(bool);

    #[async_trait]
    impl Checker for FixedProbe {
        async fn check(&self, _address: &str, _port: u16) -> CheckResult {
            if self.0 {
                CheckResult::new("tcp").healthy("open")
            } else {
                CheckResult::new("tcp").unhealthy("refused")
            }
        }
    }

    /// Captures the playbook it is asked to run and prints a recap
    struct RecordingRunner {
        recap: &'static str,
        code: i32,
        playbooks: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Runner for RecordingRunner {
        async fn run_command(
            &self,
            command: &Command,
            _opts: &RunOptions,
        ) -> command_executor::Result<CommandOutput> {
            let args: Vec<String> = command
                .get_args()
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect();
            self.playbooks
                .lock()
                .unwrap()
                .push(std::fs::read_to_string(&args[0]).unwrap_or_default());
            assert!(args.windows(2).any(|w| w[0] == "--limit" && w[1] == "db"));
            Ok(CommandOutput {
                status: ExitStatus {
                    code: Some(self.code),
                    signal: None,
                },
                stdout: self.recap.to_string(),
                stderr: String::new(),
                duration: Duration::ZERO,
            })
        }

        fn describe(&self) -> String {
            "recording".into()
        }
    }

    fn ctx() -> TaskContext {
        let mut manifest = Manifest::default();
        manifest.hosts.insert(
            "db".into(),
            Host {
                address: "10.0.0.1".into(),
                ..Default::default()
            },
        );
        TaskContext::new(Arc::new(manifest), Default::default())
    }

    fn postgres() -> Task {
        let mut task = Task::new("postgres", "postgres", "db", Phase::Infrastructure)
            .with_config("databases", "commodore");
        task.port = Some(5432);
        task
    }

    fn backend(recap: &'static str, code: i32) -> (AnsibleBackend, Arc<RecordingRunner>) {
        let runner = Arc::new(RecordingRunner {
            recap,
            code,
            playbooks: Mutex::new(Vec::new()),
        });
        let executor = AnsibleExecutor::new().with_runner(runner.clone());
        (AnsibleBackend::new(executor), runner)
    }

    #[tokio::test]
    async fn test_probe_decides_satisfaction() {
        let open = AnsibleBackend::default().with_probe(Arc::new(FixedProbe(true)));
        assert!(open.is_satisfied(&postgres(), &ctx()).await.unwrap());

        let closed = AnsibleBackend::default().with_probe(Arc::new(FixedProbe(false)));
        assert!(!closed.is_satisfied(&postgres(), &ctx()).await.unwrap());

        let mut portless = postgres();
        portless.port = None;
        assert!(!open.is_satisfied(&portless, &ctx()).await.unwrap());
    }

    #[tokio::test]
    async fn test_recap_overrides_exit_code() {
        let (backend, runner) = backend(
            "PLAY RECAP ***\ndb : ok=5 changed=2 unreachable=0 failed=0 skipped=1\n",
            2,
        );
        let outcome = backend.run(&postgres(), &ctx()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(
            outcome.message,
            "postgres: ok=5 changed=2 unreachable=0 failed=0 skipped=1"
        );
        let playbooks = runner.playbooks.lock().unwrap();
        assert!(playbooks[0].contains("geerlingguy.postgresql"));
    }

    #[tokio::test]
    async fn test_failed_recap_fails_task() {
        let (backend, _) = backend(
            "PLAY RECAP ***\ndb : ok=1 changed=0 unreachable=0 failed=1 skipped=0\n",
            0,
        );
        let outcome = backend.run(&postgres(), &ctx()).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.starts_with("ansible playbook failed (postgres: ok=1"));
    }

    #[tokio::test]
    async fn test_no_recap_uses_exit_code() {
        let (backend, _) = backend("ERROR! the role was not found", 1);
        let outcome = backend.run(&postgres(), &ctx()).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.contains("without recap"));
    }
}
