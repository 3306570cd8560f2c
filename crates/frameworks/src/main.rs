//! `frameworks`: validate, plan and provision Frameworks clusters

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use service_orchestration::Phase;
use std::path::PathBuf;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "frameworks")]
#[command(about = "Frameworks - cluster provisioning and operations tool")]
#[command(version)]
struct Cli {
    /// Cluster manifest path
    #[arg(short, long, global = true, default_value = "cluster.yaml")]
    manifest: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Which part of the cluster a plan covers
#[derive(Args, Debug, Clone)]
pub struct Selection {
    /// Phase: infrastructure, applications, interfaces or all
    #[arg(long, default_value = "all")]
    pub phase: Phase,

    /// Only tasks on these hosts (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub only_hosts: Vec<String>,

    /// Only these tasks (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub only_services: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the cluster manifest
    Validate,

    /// Show the execution plan
    Plan {
        #[command(flatten)]
        selection: Selection,
    },

    /// Provision the cluster
    Provision {
        #[command(flatten)]
        selection: Selection,

        /// Run the tasks of a batch concurrently
        #[arg(long)]
        parallel: bool,

        /// Upper bound on concurrent tasks per batch
        #[arg(long, default_value_t = 8)]
        max_parallel: usize,

        /// Re-run tasks whose target state is already present
        #[arg(short, long)]
        force: bool,

        /// Print the plan without executing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Check the health of every provisioned endpoint
    Doctor {
        /// Also check the local Ansible install and free disk on every host
        #[arg(long)]
        preflight: bool,
    },

    /// Run a single health probe and print the result as JSON
    Check {
        /// Protocol: http, https, tcp, postgres, yugabyte, kafka, clickhouse
        protocol: String,
        /// Address to probe
        address: String,
        /// Port to probe
        port: u16,
        /// HTTP path (http and https only)
        #[arg(long)]
        path: Option<String>,
    },

    /// Central-tier services managed with docker compose
    Services {
        #[command(subcommand)]
        command: commands::services::ServicesCommands,
    },

    /// Edge node fleet
    Edge {
        #[command(subcommand)]
        command: commands::edge::EdgeCommands,
    },

    /// MistServer diagnostics
    Diag {
        #[command(subcommand)]
        command: commands::diag::DiagCommands,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Validate => commands::cluster::validate(&cli.manifest),
        Commands::Plan { selection } => commands::cluster::plan(&cli.manifest, selection),
        Commands::Provision {
            selection,
            parallel,
            max_parallel,
            force,
            dry_run,
        } => {
            let opts = commands::cluster::provision_options(selection, parallel, max_parallel, force, dry_run);
            commands::cluster::provision(&cli.manifest, opts).await
        }
        Commands::Doctor { preflight } => commands::cluster::doctor(&cli.manifest, preflight).await,
        Commands::Check {
            protocol,
            address,
            port,
            path,
        } => commands::check::run(&protocol, &address, port, path).await,
        Commands::Services { command } => commands::services::run(command).await,
        Commands::Edge { command } => commands::edge::run(command),
        Commands::Diag { command } => commands::diag::run(&cli.manifest, command).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_provision_flags() {
        let cli = Cli::try_parse_from([
            "frameworks",
            "--manifest",
            "prod.yaml",
            "provision",
            "--phase",
            "infra",
            "--only-hosts",
            "db-1,db-2",
            "--parallel",
        ])
        .unwrap();

        assert_eq!(cli.manifest, PathBuf::from("prod.yaml"));
        match cli.command {
            Commands::Provision {
                selection,
                parallel,
                max_parallel,
                ..
            } => {
                assert_eq!(selection.phase, Phase::Infrastructure);
                assert_eq!(selection.only_hosts, vec!["db-1", "db-2"]);
                assert!(parallel);
                assert_eq!(max_parallel, 8);
            }
            _ => panic!("expected provision"),
        }
    }

    #[test]
    fn test_unknown_phase_is_rejected() {
        assert!(Cli::try_parse_from(["frameworks", "plan", "--phase", "edge"]).is_err());
    }
}
