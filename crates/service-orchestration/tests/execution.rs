//! End-to-end planning and execution against scripted backends

use async_trait::async_trait;
use cluster_manifest::parse_str;
use health_checks::{CheckResult, Checker, CheckerRegistry};
use service_orchestration::{
    BLOCKED_MESSAGE, BackendRegistry, CANCELLED_MESSAGE, ExecutionReport, HealthGroup,
    Orchestrator, ProvisionOptions, SATISFIED_MESSAGE, Task, TaskBackend, TaskContext,
    TaskOutcome, TaskStatus,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MANIFEST: &str = r#"
version: "1"
type: cluster
hosts:
  db:
    address: 10.0.0.1
  web:
    address: 10.0.0.2
infrastructure:
  postgres:
    enabled: true
    host: db
  clickhouse:
    enabled: true
    host: db
  redis:
    enabled: true
    instances:
      - { name: cache, host: db }
services:
  quartermaster:
    enabled: true
    host: web
  commodore:
    enabled: true
    host: web
  purser:
    enabled: true
    host: web
  bridge:
    enabled: true
    host: web
    depends_on: [commodore]
"#;

/// Backend whose behaviour is scripted per task name
#[derive(Default)]
struct ScriptedBackend {
    failing: HashSet<String>,
    satisfied: HashSet<String>,
    cancel_after: Option<(String, CancellationToken)>,
    delay: Duration,
    ran: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedBackend {
    fn failing(mut self, names: &[&str]) -> Self {
        self.failing = names.iter().map(|n| n.to_string()).collect();
        self
    }

    fn satisfied(mut self, names: &[&str]) -> Self {
        self.satisfied = names.iter().map(|n| n.to_string()).collect();
        self
    }

    fn ran(&self) -> Vec<String> {
        self.ran.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn is_satisfied(&self, task: &Task, _ctx: &TaskContext) -> service_orchestration::Result<bool> {
        Ok(self.satisfied.contains(&task.name))
    }

    async fn run(&self, task: &Task, _ctx: &TaskContext) -> service_orchestration::Result<TaskOutcome> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.ran.lock().unwrap().push(task.name.clone());

        if let Some((name, token)) = &self.cancel_after {
            if *name == task.name {
                token.cancel();
            }
        }
        if self.failing.contains(&task.name) {
            Ok(TaskOutcome::failure("exit 1", "line one\nboom"))
        } else {
            Ok(TaskOutcome::success(format!("{} done", task.name), ""))
        }
    }
}

fn registry(backend: Arc<ScriptedBackend>) -> BackendRegistry {
    let mut registry = BackendRegistry::empty();
    registry.register_as("shell", backend.clone());
    registry.register_as("ansible", backend);
    registry
}

fn orchestrator(backend: Arc<ScriptedBackend>) -> Orchestrator {
    Orchestrator::new(parse_str(MANIFEST).unwrap()).with_backends(registry(backend))
}

async fn run(orchestrator: &Orchestrator, opts: ProvisionOptions) -> ExecutionReport {
    let plan = orchestrator.plan(&opts).unwrap();
    orchestrator.execute(plan, &opts).await
}

fn status(report: &ExecutionReport, name: &str) -> (TaskStatus, String) {
    let result = report.result(name).unwrap();
    (result.status, result.message.clone())
}

#[tokio::test]
async fn test_plan_shape() {
    let plan = orchestrator(Arc::default())
        .plan(&ProvisionOptions::default())
        .unwrap();
    let names: Vec<Vec<&str>> = plan
        .batches
        .iter()
        .map(|b| b.iter().map(|t| t.name.as_str()).collect())
        .collect();
    assert_eq!(
        names,
        vec![
            vec!["clickhouse", "postgres", "redis-cache"],
            vec!["quartermaster"],
            vec!["commodore", "purser"],
            vec!["bridge"],
        ]
    );
}

#[tokio::test]
async fn test_each_run_consumes_its_plan() {
    let backend = Arc::new(ScriptedBackend::default());
    let orchestrator = orchestrator(backend.clone());
    let opts = ProvisionOptions::default();

    let plan = orchestrator.plan(&opts).unwrap();
    let plan_id = plan.id;
    let first = orchestrator.execute(plan, &opts).await;
    assert_eq!(first.plan_id, plan_id);

    // a second run needs a fresh plan; the same manifest yields the same plan id
    let replanned = orchestrator.plan(&opts).unwrap();
    assert_eq!(replanned.id, plan_id);
    let second = orchestrator.execute(replanned, &opts).await;
    assert_eq!(second.plan_id, plan_id);
    assert_ne!(second.run_id, first.run_id);
    assert_eq!(backend.ran().len(), 2 * first.results.len());

    let infra_only = ProvisionOptions {
        phase: "infrastructure".parse().unwrap(),
        ..Default::default()
    };
    assert_ne!(orchestrator.plan(&infra_only).unwrap().id, plan_id);
}

#[tokio::test]
async fn test_failure_blocks_only_dependents() {
    let backend = Arc::new(ScriptedBackend::default().failing(&["commodore"]));
    let report = run(&orchestrator(backend.clone()), ProvisionOptions::default()).await;

    assert_eq!(report.results.len(), 7);
    assert_eq!(status(&report, "commodore").0, TaskStatus::Failed);
    assert_eq!(report.result("commodore").unwrap().error.as_deref(), Some("line one\nboom"));
    assert_eq!(status(&report, "purser").0, TaskStatus::Success);
    assert_eq!(
        status(&report, "bridge"),
        (TaskStatus::Skipped, BLOCKED_MESSAGE.to_string())
    );
    assert!(!backend.ran().contains(&"bridge".to_string()));

    let err = report.error().unwrap();
    assert_eq!(err.to_string(), "Execution error: 1 of 7 tasks failed: commodore");
}

#[tokio::test]
async fn test_blocking_is_transitive() {
    let backend = Arc::new(ScriptedBackend::default().failing(&["postgres"]));
    let report = run(&orchestrator(backend.clone()), ProvisionOptions::default()).await;

    for name in ["quartermaster", "commodore", "purser", "bridge"] {
        assert_eq!(status(&report, name), (TaskStatus::Skipped, BLOCKED_MESSAGE.to_string()));
    }
    assert_eq!(backend.ran(), vec!["clickhouse", "postgres", "redis-cache"]);
}

#[tokio::test]
async fn test_satisfied_tasks_skip_unless_forced() {
    let backend = Arc::new(ScriptedBackend::default().satisfied(&["postgres"]));
    let report = run(&orchestrator(backend.clone()), ProvisionOptions::default()).await;
    assert_eq!(
        status(&report, "postgres"),
        (TaskStatus::Skipped, SATISFIED_MESSAGE.to_string())
    );
    assert_eq!(status(&report, "quartermaster").0, TaskStatus::Success);
    assert!(report.error().is_none());

    let forced = ProvisionOptions {
        force: true,
        ..Default::default()
    };
    let backend = Arc::new(ScriptedBackend::default().satisfied(&["postgres"]));
    let report = run(&orchestrator(backend.clone()), forced).await;
    assert_eq!(status(&report, "postgres").0, TaskStatus::Success);
    assert!(backend.ran().contains(&"postgres".to_string()));
}

#[tokio::test]
async fn test_parallel_batches_respect_bound() {
    let parallel = ProvisionOptions {
        parallel: true,
        ..Default::default()
    };
    let backend = Arc::new(ScriptedBackend {
        delay: Duration::from_millis(50),
        ..Default::default()
    });
    let report = run(&orchestrator(backend.clone()), parallel.clone()).await;
    assert!(report.error().is_none());
    assert_eq!(backend.peak.load(Ordering::SeqCst), 3);

    // results come back in plan order regardless of completion order
    let order: Vec<&str> = report.results.iter().map(|r| r.task.name.as_str()).collect();
    assert_eq!(
        order,
        vec!["clickhouse", "postgres", "redis-cache", "quartermaster", "commodore", "purser", "bridge"]
    );

    let bounded = ProvisionOptions {
        max_parallel: 1,
        ..parallel
    };
    let backend = Arc::new(ScriptedBackend {
        delay: Duration::from_millis(20),
        ..Default::default()
    });
    run(&orchestrator(backend.clone()), bounded).await;
    assert_eq!(backend.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancellation_fails_remaining_tasks() {
    let orchestrator = Orchestrator::new(parse_str(MANIFEST).unwrap());
    let backend = Arc::new(ScriptedBackend {
        cancel_after: Some(("quartermaster".into(), orchestrator.cancellation_token())),
        ..Default::default()
    });
    let orchestrator = orchestrator.with_backends(registry(backend.clone()));

    let report = run(&orchestrator, ProvisionOptions::default()).await;

    assert_eq!(status(&report, "quartermaster").0, TaskStatus::Success);
    for name in ["commodore", "purser", "bridge"] {
        assert_eq!(status(&report, name), (TaskStatus::Failed, CANCELLED_MESSAGE.to_string()));
    }
    assert!(!backend.ran().contains(&"commodore".to_string()));
    assert!(report.error().is_some());
}

#[tokio::test]
async fn test_phase_and_service_filters() {
    let backend = Arc::new(ScriptedBackend::default());
    let infra_only = ProvisionOptions {
        phase: "infrastructure".parse().unwrap(),
        ..Default::default()
    };
    let report = run(&orchestrator(backend.clone()), infra_only).await;
    assert_eq!(report.results.len(), 3);

    let only_bridge = ProvisionOptions {
        only_services: vec!["bridge".into()],
        ..Default::default()
    };
    let report = run(&orchestrator(Arc::default()), only_bridge).await;
    assert_eq!(report.results.len(), 1);
    assert_eq!(status(&report, "bridge").0, TaskStatus::Success);
}

struct Fixed(bool);

#[async_trait]
impl Checker for Fixed {
    async fn check(&self, address: &str, port: u16) -> CheckResult {
        let result = CheckResult::new("fixed");
        if self.0 {
            result.healthy(format!("{}:{}", address, port))
        } else {
            result.unhealthy("connection refused")
        }
    }
}

#[tokio::test]
async fn test_validate_reports_every_endpoint() {
    let mut checkers = CheckerRegistry::empty();
    checkers.register("postgres", Arc::new(Fixed(true)));
    checkers.register("clickhouse", Arc::new(Fixed(false)));
    checkers.register("tcp", Arc::new(Fixed(true)));
    checkers.register("http", Arc::new(Fixed(true)));

    let orchestrator = Orchestrator::new(parse_str(MANIFEST).unwrap()).with_checkers(checkers);
    let health = orchestrator.validate().await;

    assert_eq!(health.total(), 7);
    assert_eq!(health.summary(), "Summary: 6/7 checks passed");
    assert!(!health.is_healthy());

    let clickhouse = health.results.iter().find(|e| e.target == "clickhouse").unwrap();
    assert_eq!(clickhouse.port, 8123);
    assert_eq!(clickhouse.group, HealthGroup::Infrastructure);

    let bridge = health.results.iter().find(|e| e.target == "bridge").unwrap();
    assert_eq!(bridge.group, HealthGroup::Applications);
    assert_eq!(bridge.port, 18000);
    assert_eq!(bridge.result.message, "10.0.0.2:18000");
}

#[tokio::test]
async fn test_validate_reports_unprobeable_services() {
    let manifest = format!(
        "{}{}",
        MANIFEST,
        r#"  mystery:
    enabled: true
    host: web
"#
    );
    let mut checkers = CheckerRegistry::empty();
    checkers.register("postgres", Arc::new(Fixed(true)));
    checkers.register("clickhouse", Arc::new(Fixed(true)));
    checkers.register("tcp", Arc::new(Fixed(true)));
    checkers.register("http", Arc::new(Fixed(true)));

    let orchestrator = Orchestrator::new(parse_str(&manifest).unwrap()).with_checkers(checkers);
    let health = orchestrator.validate().await;

    assert_eq!(health.total(), 8);
    assert!(!health.is_healthy());
    let mystery = health.results.iter().find(|e| e.target == "mystery").unwrap();
    assert_eq!(mystery.result.status, health_checks::HealthStatus::Unknown);
    assert_eq!(mystery.port, 0);
    assert!(mystery.result.error.as_deref().unwrap().contains("no port"));
}
