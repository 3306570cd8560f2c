//! # Service Orchestration
//!
//! Turns a validated cluster manifest into batches of provisioning tasks and
//! runs them on the target hosts.
//!
//! - [`Planner`] builds a dependency graph (infrastructure, then
//!   applications, then interfaces) and layers it into [`ExecutionPlan`]
//!   batches.
//! - [`BackendRegistry`] maps each task type to a [`TaskBackend`]: Ansible
//!   roles for stateful infrastructure, generated shell scripts over SSH for
//!   everything else.
//! - [`Orchestrator`] executes plans with bounded parallelism, skips the
//!   dependents of failed tasks and validates cluster health afterwards.
//!
//! ## Example
//!
//! ```rust,no_run
//! use service_orchestration::{Orchestrator, ProvisionOptions};
//!
//! # async fn example() -> service_orchestration::Result<()> {
//! let manifest = cluster_manifest::parse_file("cluster.yaml")?;
//! let orchestrator = Orchestrator::new(manifest);
//!
//! let opts = ProvisionOptions::default();
//! let plan = orchestrator.plan(&opts)?;
//! let report = orchestrator.execute(plan, &opts).await;
//! if let Some(e) = report.error() {
//!     return Err(e);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backends;
mod error;
mod graph;
pub mod mistdiag;
mod orchestrator;
mod planner;
mod task;

pub use backends::{
    AnsibleBackend, BackendRegistry, ShellBackend, TaskBackend, TaskContext, TaskOutcome,
    backend_for, host_runner,
};
pub use error::{Error, Result};
pub use graph::DependencyGraph;
pub use orchestrator::{ClusterHealth, HealthEntry, HealthGroup, Orchestrator};
pub use planner::{PRIVATEER, Planner, QUARTERMASTER};
pub use task::{
    BLOCKED_MESSAGE, CANCELLED_MESSAGE, ExecutionPlan, ExecutionReport, Phase, ProvisionOptions,
    SATISFIED_MESSAGE, Task, TaskResult, TaskStatus,
};
