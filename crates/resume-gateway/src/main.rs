//! Resume Gateway daemon - HTTP relay in front of the scoring service

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use resume_gateway::GatewayServer;
use resume_gateway::config::Config;
use resume_gateway::error::Result;

/// Resume Gateway - relays resume uploads to a scoring service
#[derive(Parser)]
#[command(name = "resume-gateway")]
#[command(about = "A streaming HTTP gateway that relays resume uploads to a scoring service")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the gateway (default command)
    #[command(name = "serve")]
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,resume_gateway=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting resume gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(config_path.as_deref())?;
    tracing::debug!("Config loaded: {:?}", config);

    GatewayServer::new(config).serve().await?;

    tracing::info!("Resume gateway stopped");
    Ok(())
}
