use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use tollgate_cli::{create_example_config, load_packets, replay};
use tollgate_proxy::{init_logging, spawn_event_logger, ConfigLoadError, ProxySession, TollgateConfig};

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
    /// Feed a TOML file of decoded server packets through a proxy session
    Replay {
        /// File with one [[packets]] table per server packet
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .or_else(TollgateConfig::config_path)
        .context("Failed to determine config directory")?;

    match cli.command {
        Commands::Init { force } => {
            let _guard = init_logging("cli", false)?;
            create_example_config(&config_path, force)?;
            eprintln!("Config file created at: {}", config_path.display());
        }
        Commands::Replay { file } => {
            let config = match TollgateConfig::load_from(&config_path) {
                Ok(config) => config,
                Err(ConfigLoadError::NotFound) => TollgateConfig::default(),
                Err(e) => return Err(e.into()),
            };

            let _guard = init_logging("replay", config.logging.file)?;

            let packets = load_packets(&file)?;
            info!("Replaying {} packet(s) from {}", packets.len(), file.display());

            let session = ProxySession::builder().with_config(config).build()?;
            let logger = spawn_event_logger(session.source().feed());

            let summary = replay(&session, packets);
            drop(session);
            let logged = logger.await?;

            info!(
                "Replayed {} packet(s): {} forwarded, {} dropped, {} event(s) logged, journal at {}",
                summary.received,
                summary.forwarded,
                summary.dropped,
                logged,
                summary.last_event_id
            );
        }
    }

    Ok(())
}
