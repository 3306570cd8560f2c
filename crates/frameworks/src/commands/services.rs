use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use cluster_manifest::ServiceDefinitions;
use command_executor::{Command, LocalRunner, RunOptions, Runner, SshConfig, SshRunner};
use service_catalog::{
    Catalog, ComposeAction, Selection, compose_command, generate_fragments, parse_list,
    resolve_service_list, save_plan, stop_commands, summarize_selection,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Subcommand)]
pub enum ServicesCommands {
    /// Select services from the catalog and write compose fragments
    Plan {
        /// Directory for plan.yaml and the svc-*.yml fragments
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Catalog profile to start from
        #[arg(long)]
        profile: Option<String>,

        /// Services to add (comma separated)
        #[arg(long, default_value = "")]
        include: String,

        /// Services to remove (comma separated)
        #[arg(long, default_value = "")]
        exclude: String,

        /// Replace existing fragments
        #[arg(long)]
        overwrite: bool,
    },

    /// Start the selected services
    Up(Target),

    /// Stop the selected services
    Down(Target),

    /// Show container status
    Status(Target),

    /// Show container logs
    Logs {
        #[command(flatten)]
        target: Target,

        /// Follow log output until interrupted
        #[arg(short, long)]
        follow: bool,

        /// Number of lines to show from the end of the logs
        #[arg(long)]
        tail: Option<u32>,
    },
}

/// Where compose runs and on which services
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Directory holding plan.yaml and the svc-*.yml fragments
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Only these services (comma separated)
    #[arg(long, default_value = "")]
    pub only: String,

    /// Run on a remote host (user@host)
    #[arg(long)]
    pub ssh: Option<String>,

    /// SSH private key for --ssh
    #[arg(long, requires = "ssh")]
    pub ssh_key: Option<PathBuf>,
}

impl Target {
    fn ssh_config(&self) -> Option<SshConfig> {
        self.ssh.as_deref().map(|target| {
            let config = SshConfig::from_target(target);
            match &self.ssh_key {
                Some(key) => config.with_identity_file(key),
                None => config,
            }
        })
    }

    fn runner(&self) -> Arc<dyn Runner> {
        match self.ssh_config() {
            Some(config) => Arc::new(SshRunner::new(config)),
            None => Arc::new(LocalRunner::new()),
        }
    }

    fn services(&self) -> Result<Vec<String>> {
        let services = resolve_service_list(&self.dir, &parse_list(&self.only))
            .with_context(|| format!("Failed to resolve services in {}", self.dir.display()))?;
        if services.is_empty() {
            anyhow::bail!(
                "No services selected in {} (run `frameworks services plan` first)",
                self.dir.display()
            );
        }
        Ok(services)
    }
}

pub async fn run(command: ServicesCommands) -> Result<()> {
    match command {
        ServicesCommands::Plan {
            dir,
            profile,
            include,
            exclude,
            overwrite,
        } => plan(&dir, profile, &include, &exclude, overwrite),
        ServicesCommands::Up(target) => compose(&target, ComposeAction::Up).await,
        ServicesCommands::Down(target) => down(&target).await,
        ServicesCommands::Status(target) => compose(&target, ComposeAction::Ps).await,
        ServicesCommands::Logs {
            target,
            follow,
            tail,
        } => {
            let action = ComposeAction::Logs {
                follow,
                tail,
                services: Vec::new(),
            };
            if follow {
                stream(&target, &action).await
            } else {
                compose(&target, action).await
            }
        }
    }
}

fn plan(dir: &Path, profile: Option<String>, include: &str, exclude: &str, overwrite: bool) -> Result<()> {
    let catalog = Catalog::load().context("Failed to load service catalog")?;
    let selection = Selection {
        profile,
        include: parse_list(include),
        exclude: parse_list(exclude),
    };
    let specs = selection.resolve(&catalog).context("Failed to resolve selection")?;

    let report = generate_fragments(dir, &specs, overwrite, &ServiceDefinitions::builtin())
        .context("Failed to write compose fragments")?;
    save_plan(dir, &specs, selection.profile.as_deref()).context("Failed to write plan")?;

    println!("Selected {} services:", specs.len());
    print!("{}", summarize_selection(&specs));
    println!("✓ Wrote {} fragments to {}", report.written.len(), dir.display());
    for (name, reason) in &report.skipped {
        println!("  ⚠ Skipped {}: {}", name, reason);
    }
    Ok(())
}

async fn compose(target: &Target, action: ComposeAction) -> Result<()> {
    let services = target.services()?;
    execute(target, &compose_command(&target.dir, &services, &action)).await
}

async fn down(target: &Target) -> Result<()> {
    let only = parse_list(&target.only);
    if only.is_empty() {
        return compose(target, ComposeAction::Down).await;
    }
    for command in stop_commands(&target.dir, &only) {
        execute(target, &command).await?;
    }
    Ok(())
}

async fn execute(target: &Target, command: &Command) -> Result<()> {
    let runner = target.runner();
    info!("Running on {}: {}", runner.describe(), command);

    let output = runner
        .run_command(command, &RunOptions::default())
        .await
        .with_context(|| format!("Failed to run `{}`", command))?;
    print!("{}", output.stdout);
    eprint!("{}", output.stderr);

    if !output.success() {
        anyhow::bail!("`{}` exited with code {}", command, output.exit_code());
    }
    Ok(())
}

/// Run with the terminal attached so followed logs show up as they arrive
async fn stream(target: &Target, action: &ComposeAction) -> Result<()> {
    let services = target.services()?;
    let local = compose_command(&target.dir, &services, action);
    let command = match target.ssh_config() {
        Some(config) => config.wrap(&local.to_shell_string()),
        None => local,
    };
    debug!("Streaming: {}", command);

    let status = command
        .prepare()
        .status()
        .await
        .with_context(|| format!("Failed to run `{}`", command))?;
    if !status.success() {
        anyhow::bail!("`{}` exited with {}", command, status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(dir: &Path, only: &str) -> Target {
        Target {
            dir: dir.to_path_buf(),
            only: only.to_string(),
            ssh: None,
            ssh_key: None,
        }
    }

    #[test]
    fn test_plan_writes_fragments_and_selection() {
        let dir = tempfile::tempdir().unwrap();
        plan(dir.path(), Some("control".into()), "", "purser", false).unwrap();

        assert!(dir.path().join("plan.yaml").exists());
        assert!(dir.path().join("svc-bridge.yml").exists());
        assert!(!dir.path().join("svc-purser.yml").exists());

        let services = target(dir.path(), "").services().unwrap();
        assert_eq!(services, vec!["bridge", "commodore", "quartermaster"]);

        // fragments exist now
        assert!(plan(dir.path(), Some("control".into()), "", "", false).is_err());
        plan(dir.path(), Some("control".into()), "", "", true).unwrap();
    }

    #[test]
    fn test_only_overrides_plan() {
        let dir = tempfile::tempdir().unwrap();
        plan(dir.path(), Some("control".into()), "", "", false).unwrap();

        let services = target(dir.path(), "bridge, purser").services().unwrap();
        assert_eq!(services, vec!["bridge", "purser"]);
    }

    #[test]
    fn test_empty_dir_has_no_services() {
        let dir = tempfile::tempdir().unwrap();
        let err = target(dir.path(), "").services().unwrap_err();
        assert!(err.to_string().contains("No services selected"));
    }

    #[test]
    fn test_ssh_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = target(dir.path(), "");
        assert_eq!(t.runner().describe(), LocalRunner::new().describe());

        t.ssh = Some("deploy@10.0.0.5".into());
        assert_eq!(t.runner().describe(), "ssh://deploy@10.0.0.5");
    }
}
