use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tether_core::config::ServerConfig;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Tether CLI - inspect and recover store-backed protocol sessions", long_about = None)]
struct Cli {
    /// Server configuration file (TOML). Without it sessions are memory-only.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Work with stored sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Validate the configuration and show the selected store
    CheckConfig,
}

#[derive(Subcommand)]
enum SessionAction {
    /// List stored session ids
    List,
    /// Start a supervisor and report which sessions it recovers
    Recover,
    /// Print the state a session actor restores for an id
    Inspect { session_id: String },
    /// Delete a stored session
    Purge { session_id: String },
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<ServerConfig> {
    match path {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(ServerConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Sessions { action } => match action {
            SessionAction::List => commands::sessions::list(&config).await?,
            SessionAction::Recover => commands::sessions::recover(&config).await?,
            SessionAction::Inspect { session_id } => {
                commands::sessions::inspect(&config, &session_id).await?
            }
            SessionAction::Purge { session_id } => {
                commands::sessions::purge(&config, &session_id).await?
            }
        },
        Commands::CheckConfig => commands::config::check(&config)?,
    }

    Ok(())
}
