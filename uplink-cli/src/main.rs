use std::time::Duration;

use clap::Parser;
use error::AppError;
use tracing::{Level, error};
use tracing_subscriber::FmtSubscriber;
use uplink_engine::{CacheConfig, CacheStore, Expiry};

mod cli;
mod commands;
mod error;
mod utils;

use cli::{CacheCommand, CliArgs, Command};

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    let mut cache_config = CacheConfig::default();
    if let Some(dir) = args.cache_dir {
        cache_config = cache_config.with_disk_cache_path(dir);
    }
    if let Some(ttl) = args.cache_ttl {
        cache_config = cache_config.with_expiry(Expiry::After(Duration::from_secs(ttl)));
    }

    match args.command {
        Command::Key(request) => commands::key(&request),
        Command::Upload(upload) => {
            let cache = open_cache(cache_config)?;
            commands::upload(upload, cache).await
        }
        Command::Status(request) => {
            let cache = open_cache(cache_config)?;
            commands::status(&request, &cache)
        }
        Command::Cache { command } => {
            let cache = open_cache(cache_config)?;
            match command {
                CacheCommand::Get(request) => commands::cache_get(&request, &cache).await,
                CacheCommand::Clear => commands::cache_clear(&cache).await,
            }
        }
    }
}

fn open_cache(config: CacheConfig) -> Result<CacheStore, AppError> {
    let store = CacheStore::in_memory();
    store.reconfigure(config)?;
    Ok(store)
}
