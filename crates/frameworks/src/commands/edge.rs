use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Table};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum EdgeCommands {
    /// Validate an edge manifest
    Validate {
        /// Edge manifest path
        #[arg(default_value = "edges.yaml")]
        file: PathBuf,
    },
}

pub fn run(command: EdgeCommands) -> Result<()> {
    match command {
        EdgeCommands::Validate { file } => validate(&file),
    }
}

fn validate(path: &Path) -> Result<()> {
    println!("Validating {}...", path.display());
    let manifest = cluster_manifest::parse_edge_file(path)
        .with_context(|| format!("Failed to load edge manifest {}", path.display()))?;

    println!("✓ Edge manifest valid");
    if !manifest.root_domain.is_empty() {
        println!("  Root domain: {}", manifest.root_domain);
    }
    if !manifest.pool_domain.is_empty() {
        println!("  Pool domain: {}", manifest.pool_domain);
    }

    let mut table = Table::new();
    table.set_header(vec!["NODE", "SSH", "REGION", "MODE"]);
    for node in &manifest.nodes {
        table.add_row(vec![
            Cell::new(&node.name),
            Cell::new(&node.ssh),
            Cell::new(node.region.as_deref().unwrap_or("-")),
            Cell::new(node.resolved_mode(manifest.mode)),
        ]);
    }
    println!("{}", table);
    Ok(())
}
