//! Settle CLI - settle command

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use settle_cli::{cmd, logging};
use settle_core::SettleConfig;
use std::path::PathBuf;

/// Settle - debounce bursts of triggers into one downstream dispatch per key
#[derive(Parser)]
#[command(name = "settle")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ./settle.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the intake server and coordination engine
    Serve {
        /// Also write logs to a daily rolling file in this directory
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Override server.listen
        #[arg(long)]
        listen: Option<String>,
    },
    /// Show pending and locked batches
    Status,
    /// Delete a key's record so it can start a fresh cycle
    Release {
        /// Coordination key
        key: String,

        /// Release even if the record is still accumulating
        #[arg(long)]
        force: bool,
    },
    /// Inspect or edit configuration
    Config {
        /// List all configuration values
        #[arg(long, conflicts_with_all = ["get", "set", "path", "example"])]
        list: bool,

        /// Print a single value (e.g. engine.quiet_period_ms)
        #[arg(long, value_name = "KEY")]
        get: Option<String>,

        /// Set a value in the config file (e.g. --set engine.quiet_period_ms 2000)
        #[arg(long, num_args = 2, value_names = ["KEY", "VALUE"], conflicts_with = "get")]
        set: Option<Vec<String>>,

        /// Show the config file in effect
        #[arg(long)]
        path: bool,

        /// Print an annotated example config
        #[arg(long)]
        example: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (level, log_dir) = match &cli.command {
        Commands::Serve { log_dir, .. } => ("info", log_dir.clone()),
        _ => ("warn", None),
    };
    let _log_guard = logging::init(level, log_dir.as_deref())?;

    match cli.command {
        Commands::Config { example: true, .. } => cmd::config::run_example(),
        Commands::Config { path: true, .. } => cmd::config::run_path(cli.config.as_deref()),
        Commands::Config { set: Some(pair), .. } => match pair.as_slice() {
            [key, value] => cmd::config::run_set(&cmd::config::resolve_path(cli.config.as_deref()), key, value),
            _ => anyhow::bail!("--set takes KEY VALUE"),
        },
        Commands::Config { get, .. } => {
            let config = load(&cli.config)?;
            match get {
                Some(key) => cmd::config::run_get(&config, &key),
                None => cmd::config::run_list(&config, &cmd::config::resolve_path(cli.config.as_deref())),
            }
        }
        Commands::Serve { listen, .. } => {
            let mut config = load(&cli.config)?;
            if let Some(listen) = listen {
                config.server.listen = listen;
                config.validate().context("Invalid --listen address")?;
            }
            cmd::serve::run(config).await
        }
        Commands::Status => cmd::status::run(&load(&cli.config)?).await,
        Commands::Release { key, force } => cmd::release::run(&load(&cli.config)?, &key, force).await,
    }
}

fn load(path: &Option<PathBuf>) -> Result<SettleConfig> {
    SettleConfig::load(path.as_deref()).context("Failed to load configuration")
}
