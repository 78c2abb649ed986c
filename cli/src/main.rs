//! fleetbench: bootstrap a storage cluster fleet and benchmark it

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fleetbench_bench::{BenchmarkFanout, FleetRegistry, WorkDir};
use fleetbench_client::HttpClientFactory;
use fleetbench_cluster::{BashRunner, BootstrapOrchestrator, TopologyPlan};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod output;

use crate::config::FleetConfig;

#[derive(Parser)]
#[command(name = "fleetbench")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Form the fleet described by a topology plan and keep it running
    Bootstrap {
        /// Topology plan (YAML)
        #[arg(long)]
        plan: PathBuf,

        /// Where to write the fleet description
        #[arg(long)]
        fleet_file: Option<PathBuf>,
    },

    /// Create a test file in the working directory
    NewFile { name: String },

    /// Read a file from every member of a node
    Read { node: String, cid: String },

    /// Write a working file to every member of a node
    Write { node: String, filename: String },

    /// Check that every member of a node answers
    Check { node: String },

    /// List nodes in the fleet description
    Nodes,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = FleetConfig::load(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Bootstrap { plan, fleet_file } => {
            let fleet_file = fleet_file.unwrap_or_else(|| cfg.fleet_file.clone());
            bootstrap(&cfg, &plan, &fleet_file, cli.json).await
        }
        Commands::NewFile { name } => {
            let path = WorkDir::new(&cfg.work_dir).new_file(&name).await?;
            println!("{}", path.display());
            Ok(())
        }
        Commands::Read { node, cid } => {
            let report = fanout(&cfg).read(&node, &cid).await?;
            output::print_read(&report, cli.json)
        }
        Commands::Write { node, filename } => {
            let report = fanout(&cfg).write(&node, &filename).await?;
            output::print_write(&report, cli.json)
        }
        Commands::Check { node } => {
            let report = fanout(&cfg).check(&node).await?;
            output::print_check(&report, cli.json)?;
            let members = report.timings.len();
            if report.healthy() < members {
                bail!("{} of {} members of {} failed", members - report.healthy(), members, node);
            }
            Ok(())
        }
        Commands::Nodes => {
            let names = registry(&cfg).node_names().await?;
            if cli.json {
                output::print_json(&names)
            } else {
                names.iter().for_each(|name| println!("{}", name));
                Ok(())
            }
        }
    }
}

async fn bootstrap(cfg: &FleetConfig, plan_path: &Path, fleet_file: &Path, json: bool) -> Result<()> {
    let plan = TopologyPlan::load(plan_path)
        .await
        .with_context(|| format!("Failed to read topology plan {}", plan_path.display()))?;

    let orchestrator = Arc::new(BootstrapOrchestrator::new(
        cfg.orchestrator()?,
        Arc::new(BashRunner::new()),
    )?);
    let fleet = orchestrator.form_topology(&plan).await?;

    for (leader, e) in fleet.failures() {
        error!("Group led by {} incomplete: {}", leader, e);
    }
    if fleet.members().next().is_none() {
        bail!("no cluster member could be formed");
    }

    let description = fleet.describe();
    if let Some(parent) = fleet_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(fleet_file, description.render())
        .await
        .with_context(|| format!("Failed to write {}", fleet_file.display()))?;
    info!("Fleet description written to {}", fleet_file.display());
    output::print_description(&description, json)?;

    info!("Fleet running; press Ctrl-C to stop it");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
    }
    orchestrator.shutdown(&fleet).await;
    Ok(())
}

fn registry(cfg: &FleetConfig) -> FleetRegistry {
    FleetRegistry::new(
        &cfg.fleet_file,
        Arc::new(HttpClientFactory::new(cfg.client())),
    )
}

fn fanout(cfg: &FleetConfig) -> BenchmarkFanout {
    BenchmarkFanout::new(Arc::new(registry(cfg)), WorkDir::new(&cfg.work_dir))
}
