mod commands;
mod ssh;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "vmflow")]
#[command(about = "Build VM images on a VergeIO cluster", long_about = None)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, provision and shut down a VM, then print the artifact
    Build {
        /// Build file (default: discovered, see VMFLOW_CONFIG_PATH)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write the artifact JSON to this file instead of stdout
        #[arg(short, long)]
        artifact: Option<PathBuf>,
    },
    /// Check the build file without touching the cluster
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List virtual networks on the cluster
    Networks {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Exact network name
        #[arg(short, long)]
        name: Option<String>,
        /// Network type, e.g. internal or external
        #[arg(short = 't', long = "type")]
        kind: Option<String>,
    },
    /// List VMs on the cluster
    Vms {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Exact VM name
        #[arg(short, long)]
        name: Option<String>,
        /// Include snapshot VMs
        #[arg(long)]
        snapshots: bool,
    },
    /// Show version information
    Version,
}

fn init_tracing(verbose: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_writer(file)
                .with_env_filter(filter)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Version) {
        println!("vmflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    init_tracing(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Build { config, artifact } => {
            commands::build::handle(config.as_deref(), artifact.as_deref()).await
        }
        Commands::Validate { config } => commands::validate::handle(config.as_deref()),
        Commands::Networks { config, name, kind } => {
            commands::networks::handle(config.as_deref(), name.as_deref(), kind.as_deref()).await
        }
        Commands::Vms {
            config,
            name,
            snapshots,
        } => commands::vms::handle(config.as_deref(), name.as_deref(), snapshots).await,
        Commands::Version => Ok(()),
    }
}
