use crate::init_config::{CmdConfig, load_config};
use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use clap_verbosity_flag::InfoLevel;
use directories::ProjectDirs;
use pinsync_worker::EngineSelection;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod init_config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Worker config file; defaults to <config dir>/pinsync/worker.toml
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Modify the worker config
    Config {
        #[command(subcommand)]
        cmd: CmdConfig,
    },
    /// Run delivery and reconciliation until interrupted
    Run,
    /// Hand queued pin requests to the pinning service
    Deliver {
        /// Run a single tick and print its report
        #[arg(long, action = ArgAction::SetTrue)]
        once: bool,
    },
    /// Sync recorded pin statuses with the cluster
    Reconcile {
        /// Run a single tick and print its report
        #[arg(long, action = ArgAction::SetTrue)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config_file = match cli.config {
        Some(path) => path,
        None => ProjectDirs::from("", "", "pinsync")
            .context("failed to determine config directory path")?
            .config_dir()
            .join("worker.toml"),
    };

    let (selection, once) = match cli.cmd {
        Commands::Config { cmd } => return cmd.run(config_file),
        Commands::Run => (EngineSelection::All, false),
        Commands::Deliver { once } => (EngineSelection::Delivery, once),
        Commands::Reconcile { once } => (EngineSelection::Reconcile, once),
    };

    let config = load_config(&config_file, |key| std::env::var(key).ok())?;

    if once {
        for report in pinsync_worker::run_once(config, selection).await? {
            println!("{report}");
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("could not listen for ctrl-c: {err}");
            return;
        }
        info!("shutting down after the current tick");
        shutdown.cancel();
    });

    pinsync_worker::run_worker(config, selection, cancel).await
}
