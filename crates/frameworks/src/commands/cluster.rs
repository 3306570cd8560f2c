use anyhow::{Context, Result};
use cluster_manifest::Manifest;
use comfy_table::{Cell, Color, Table};
use futures::future::join_all;
use health_checks::{HealthStatus, PreflightCheck, remote_disk_space};
use service_orchestration::backends::ansible::AnsibleExecutor;
use service_orchestration::{
    ClusterHealth, ExecutionPlan, ExecutionReport, Orchestrator, ProvisionOptions, TaskStatus,
    host_runner,
};
use std::path::Path;
use tracing::warn;

use crate::Selection;

/// Free space required on `/` of every host
const MIN_FREE_BYTES: u64 = 1024 * 1024 * 1024;
const MIN_FREE_PERCENT: f64 = 5.0;

fn load(manifest_path: &Path) -> Result<Manifest> {
    cluster_manifest::parse_file(manifest_path)
        .with_context(|| format!("Failed to load manifest {}", manifest_path.display()))
}

pub fn provision_options(
    selection: Selection,
    parallel: bool,
    max_parallel: usize,
    force: bool,
    dry_run: bool,
) -> ProvisionOptions {
    ProvisionOptions {
        phase: selection.phase,
        only_hosts: selection.only_hosts,
        only_services: selection.only_services,
        dry_run,
        force,
        parallel,
        max_parallel: max_parallel.max(1),
    }
}

pub fn validate(manifest_path: &Path) -> Result<()> {
    println!("Validating {}...", manifest_path.display());
    let manifest = load(manifest_path)?;

    println!("✓ Manifest valid");
    println!("  Version: {}", manifest.version);
    if let Some(profile) = &manifest.profile {
        println!("  Profile: {}", profile);
    }
    println!("  Hosts: {}", manifest.hosts.len());

    let infra = &manifest.infrastructure;
    let mut enabled = Vec::new();
    if infra.postgres().is_some() {
        enabled.push("postgres");
    }
    if infra.zookeeper().is_some() {
        enabled.push("zookeeper");
    }
    if infra.kafka().is_some() {
        enabled.push("kafka");
    }
    if infra.clickhouse().is_some() {
        enabled.push("clickhouse");
    }
    if infra.redis().is_some() {
        enabled.push("redis");
    }
    if !enabled.is_empty() {
        println!("  Infrastructure: {}", enabled.join(", "));
    }
    println!("  Services: {}", manifest.enabled_services().count());
    println!("  Interfaces: {}", manifest.enabled_interfaces().count());
    println!("  Observability: {}", manifest.enabled_observability().count());

    Ok(())
}

pub fn plan(manifest_path: &Path, selection: Selection) -> Result<()> {
    let opts = provision_options(selection, false, 1, false, true);
    let orchestrator = Orchestrator::new(load(manifest_path)?);
    let plan = orchestrator.plan(&opts).context("Failed to build execution plan")?;
    print_plan(&plan);
    Ok(())
}

pub async fn provision(manifest_path: &Path, opts: ProvisionOptions) -> Result<()> {
    let orchestrator = Orchestrator::new(load(manifest_path)?);
    let plan = orchestrator.plan(&opts).context("Failed to build execution plan")?;

    if opts.dry_run {
        println!("Dry run - nothing will be executed\n");
        print_plan(&plan);
        return Ok(());
    }
    if plan.is_empty() {
        println!("Nothing to provision");
        return Ok(());
    }

    println!(
        "Provisioning {} tasks in {} batches{}...",
        plan.len(),
        plan.batches.len(),
        if opts.parallel { " (parallel)" } else { "" }
    );

    let cancel = orchestrator.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling remaining tasks");
            cancel.cancel();
        }
    });
    let report = orchestrator.execute(plan, &opts).await;
    interrupt.abort();

    print_report(&report);
    if let Some(e) = report.error() {
        return Err(e).context("Provisioning failed");
    }
    println!("✓ Provisioning complete");
    Ok(())
}

pub async fn doctor(manifest_path: &Path, preflight: bool) -> Result<()> {
    let manifest = load(manifest_path)?;
    let preflight_failures = if preflight { run_preflight(&manifest).await } else { 0 };

    let orchestrator = Orchestrator::new(manifest);
    let health = orchestrator.validate().await;

    print_health(&health);
    if !health.is_healthy() {
        anyhow::bail!("{} of {} checks failed", health.total() - health.passed(), health.total());
    }
    if preflight_failures > 0 {
        anyhow::bail!("{} preflight checks failed", preflight_failures);
    }
    Ok(())
}

/// Print the Ansible version and disk checks, returning the failure count
async fn run_preflight(manifest: &Manifest) -> usize {
    let mut failures = 0;
    match AnsibleExecutor::new().ansible_version().await {
        Ok(version) => println!("✓ ansible-playbook {}", version),
        Err(e) => {
            println!("✗ ansible-playbook unavailable: {}", e);
            failures += 1;
        }
    }

    let checks: Vec<(&String, PreflightCheck)> =
        join_all(manifest.hosts.iter().map(|(name, host)| async move {
            let runner = host_runner(host);
            let check = remote_disk_space(runner.as_ref(), "/", MIN_FREE_BYTES, MIN_FREE_PERCENT).await;
            (name, check)
        }))
        .await;

    let mut table = Table::new();
    table.set_header(vec!["HOST", "CHECK", "STATUS", "DETAIL"]);
    for (host, check) in &checks {
        let (status, color) = if check.ok { ("ok", Color::Green) } else { ("failed", Color::Red) };
        table.add_row(vec![
            Cell::new(host),
            Cell::new(&check.name),
            Cell::new(status).fg(color),
            Cell::new(check.error.as_deref().unwrap_or(&check.detail)),
        ]);
    }
    println!("{}", table);

    failures + checks.iter().filter(|(_, c)| !c.ok).count()
}

fn print_plan(plan: &ExecutionPlan) {
    if plan.is_empty() {
        println!("No tasks selected");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["BATCH", "TASK", "TYPE", "HOST", "PHASE", "MODE", "DEPENDS ON"]);
    for (i, batch) in plan.batches.iter().enumerate() {
        for task in batch {
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(&task.name),
                Cell::new(&task.task_type),
                Cell::new(&task.host),
                Cell::new(task.phase.as_str()),
                Cell::new(&task.mode),
                Cell::new(task.depends_on.join(", ")),
            ]);
        }
    }

    println!("{}", table);
    println!("{} tasks in {} batches", plan.len(), plan.batches.len());
}

fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Success => Color::Green,
        TaskStatus::Skipped => Color::DarkGrey,
        TaskStatus::Failed => Color::Red,
    }
}

fn print_report(report: &ExecutionReport) {
    let mut table = Table::new();
    table.set_header(vec!["TASK", "HOST", "STATUS", "DURATION", "MESSAGE"]);
    for result in &report.results {
        table.add_row(vec![
            Cell::new(&result.task.name),
            Cell::new(&result.task.host),
            Cell::new(result.status).fg(status_color(result.status)),
            Cell::new(format!("{:.1}s", result.duration.as_secs_f64())),
            Cell::new(&result.message),
        ]);
    }
    println!("{}", table);

    for result in report.with_status(TaskStatus::Failed) {
        if let Some(error) = result.error.as_deref().filter(|e| !e.is_empty()) {
            eprintln!("\n{} output:", result.task.name);
            for line in error.lines() {
                eprintln!("  {}", line);
            }
        }
    }

    println!(
        "{} succeeded, {} skipped, {} failed",
        report.count(TaskStatus::Success),
        report.count(TaskStatus::Skipped),
        report.count(TaskStatus::Failed)
    );
}

fn health_color(status: HealthStatus) -> Color {
    match status {
        HealthStatus::Healthy => Color::Green,
        HealthStatus::Degraded => Color::Yellow,
        _ => Color::Red,
    }
}

fn print_health(health: &ClusterHealth) {
    let mut table = Table::new();
    table.set_header(vec!["GROUP", "TARGET", "ENDPOINT", "STATUS", "DETAIL"]);
    for entry in &health.results {
        let detail = entry.result.error.as_deref().unwrap_or(&entry.result.message);
        table.add_row(vec![
            Cell::new(&entry.group),
            Cell::new(&entry.target),
            Cell::new(format!("{}:{}", entry.host, entry.port)),
            Cell::new(entry.result.status).fg(health_color(entry.result.status)),
            Cell::new(detail),
        ]);
    }

    println!("{}", table);
    println!("{}", health.summary());
}
