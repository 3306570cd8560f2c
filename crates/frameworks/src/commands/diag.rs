use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use cluster_manifest::DeployMode;
use command_executor::{Runner, SshConfig, SshRunner};
use service_orchestration::backends::host_runner;
use service_orchestration::mistdiag::{AnalyzerOptions, AnalyzerResult, AnalyzerRunner, KNOWN_ANALYZERS};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Subcommand)]
pub enum DiagCommands {
    /// List the analyzers installed on a node
    Analyzers {
        #[command(flatten)]
        node: Node,
    },

    /// Run an analyzer on a node
    Analyze {
        /// Analyzer name, e.g. HLS or MistAnalyserHLS
        analyzer: String,

        /// Stream URL or file to analyze ("-" for none)
        #[arg(default_value = "-")]
        target: String,

        #[command(flatten)]
        node: Node,

        /// Output detail level (0-10)
        #[arg(long, default_value_t = 2)]
        detail: u32,

        /// Validation mode: exit non-zero on stream errors
        #[arg(long)]
        validate: bool,

        /// Analyzer timeout in seconds (max 300)
        #[arg(long, default_value_t = 30)]
        timeout: u32,
    },
}

/// The node to diagnose
#[derive(Args, Debug, Clone)]
pub struct Node {
    #[command(flatten)]
    target: NodeTarget,

    /// SSH private key for --ssh
    #[arg(long, requires = "ssh")]
    ssh_key: Option<PathBuf>,

    /// MistServer runs natively rather than in the mistserver container
    #[arg(long)]
    native: bool,
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
struct NodeTarget {
    /// Host name from the cluster manifest
    #[arg(long)]
    host: Option<String>,

    /// Remote node as user@host
    #[arg(long)]
    ssh: Option<String>,
}

impl Node {
    fn runner(&self, manifest_path: &Path) -> Result<Arc<dyn Runner>> {
        if let Some(target) = &self.target.ssh {
            let config = SshConfig::from_target(target);
            let config = match &self.ssh_key {
                Some(key) => config.with_identity_file(key),
                None => config,
            };
            return Ok(Arc::new(SshRunner::new(config)));
        }

        let name = self.target.host.as_deref().unwrap_or_default();
        let manifest = cluster_manifest::parse_file(manifest_path)
            .with_context(|| format!("Failed to load manifest {}", manifest_path.display()))?;
        let host = manifest
            .host(name)
            .with_context(|| format!("Host '{}' not found in {}", name, manifest_path.display()))?;
        Ok(host_runner(host))
    }

    fn analyzers(&self, manifest_path: &Path) -> Result<AnalyzerRunner> {
        let mode = if self.native {
            DeployMode::Native
        } else {
            DeployMode::Docker
        };
        Ok(AnalyzerRunner::new(self.runner(manifest_path)?, mode))
    }
}

pub async fn run(manifest_path: &Path, command: DiagCommands) -> Result<()> {
    match command {
        DiagCommands::Analyzers { node } => {
            let installed = node.analyzers(manifest_path)?.available().await?;
            if installed.is_empty() {
                println!("No analyzers found (known: {})", KNOWN_ANALYZERS.join(", "));
            }
            for name in installed {
                println!("{}", name);
            }
            Ok(())
        }
        DiagCommands::Analyze {
            analyzer,
            target,
            node,
            detail,
            validate,
            timeout,
        } => {
            let runner = node.analyzers(manifest_path)?;
            let result = if validate {
                runner.validate(&analyzer, &target, timeout).await?
            } else {
                let opts = AnalyzerOptions {
                    analyzer,
                    target,
                    detail,
                    validate,
                    timeout,
                };
                runner.run(&opts).await?
            };
            report(&result)
        }
    }
}

fn report(result: &AnalyzerResult) -> Result<()> {
    print!("{}", result.output);
    if !result.output.ends_with('\n') {
        println!();
    }
    for warning in &result.warnings {
        println!("  ⚠ {}", warning);
    }
    for error in &result.errors {
        println!("  ✗ {}", error);
    }
    println!(
        "{} in {:.1}s ({} errors, {} warnings)",
        if result.ok { "✓ Completed" } else { "✗ Failed" },
        result.duration.as_secs_f64(),
        result.errors.len(),
        result.warnings.len()
    );

    if !result.ok {
        anyhow::bail!("analyzer exited with code {}", result.exit_code);
    }
    Ok(())
}
