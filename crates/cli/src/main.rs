//! sms - command line client for the school management API

mod commands;
mod logging;
mod storage;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use commands::Commands;
use sms_core::ClientConfig;
use sms_http::{ApiClient, TokenStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storage::FileStorage;
use tracing::{Level, error, info};

#[derive(Parser)]
#[command(name = "sms")]
#[command(about = "Command line client for the school management API")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Configuration file (YAML or TOML)
    #[arg(short = 'c', long, global = true, env = "SMS_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for stored tokens and logs
    #[arg(short = 'd', long, global = true)]
    data_dir: Option<PathBuf>,

    /// Timeout for operations in seconds (0 = no timeout)
    #[arg(short = 't', long, global = true, default_value = "30")]
    timeout: u64,

    /// Disable file logging (only log to stderr)
    #[arg(long, global = true)]
    no_file_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ClientConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    logging::init_logging(cli.log_level.into(), &config.data_dir, cli.no_file_log)?;

    info!(base_url = %config.api.base_url, "Starting sms CLI");

    let storage = Arc::new(
        FileStorage::open(&config.data_dir).context("Failed to open token storage")?,
    );
    let store = TokenStore::new(storage.clone(), storage, config.context);
    let client = Arc::new(ApiClient::from_config(&config, store)?);

    // Execute command with optional timeout
    if cli.timeout == 0 || cli.command.is_long_running() {
        match cli.command.execute(&config, client).await {
            Ok(()) => {
                info!("Command completed successfully");
            }
            Err(e) => {
                error!("Command failed: {e:#}");
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
        }
    } else {
        let timeout_duration = Duration::from_secs(cli.timeout);
        match tokio::time::timeout(timeout_duration, cli.command.execute(&config, client)).await {
            Ok(Ok(())) => {
                info!("Command completed successfully");
            }
            Ok(Err(e)) => {
                error!("Command failed: {e:#}");
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
            Err(_) => {
                error!("Command timed out after {} seconds", cli.timeout);
                eprintln!("Error: timed out after {} seconds", cli.timeout);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

#[derive(Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}
