//! Vaultsync CLI
//!
//! Provides commands for:
//! - Running the manifest service (`serve`)
//! - One-shot and interval-driven syncing (`sync`, `watch`)
//! - Inspecting device state (`status`)
//! - Minting device tokens (`token`)
//! - Bootstrapping client settings (`init`)

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;
mod prompt;

use commands::{
    init::InitCommand, serve::ServeCommand, status::StatusCommand, sync::SyncCommand,
    token::TokenCommand, watch::WatchCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "vaultsync", version, about = "Vault synchronization over a small object store")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use an alternate settings file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write an initial settings file
    Init(InitCommand),
    /// Run the manifest service
    Serve(ServeCommand),
    /// Run one sync cycle
    Sync(SyncCommand),
    /// Sync on an interval until interrupted
    Watch(WatchCommand),
    /// Show settings, device state, and server health
    Status(StatusCommand),
    /// Mint a device token from the shared secret
    Token(TokenCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Init(cmd) => cmd.execute(format, cli.config.as_deref()).await,
        Commands::Serve(cmd) => cmd.execute(format).await,
        Commands::Sync(cmd) => cmd.execute(format, cli.config.as_deref()).await,
        Commands::Watch(cmd) => cmd.execute(format, cli.config.as_deref()).await,
        Commands::Status(cmd) => cmd.execute(format, cli.config.as_deref()).await,
        Commands::Token(cmd) => cmd.execute(format).await,
    }
}
