//! InfluxDB Backup Tool
//!
//! Snapshots an InfluxDB database, uploads the snapshot as a tar.gz archive to
//! S3-compatible storage and removes the local files afterwards.

// influxbackup/src/main.rs
mod backup;
mod config;
mod errors;
mod snapshot;

use anyhow::{Context, Result};
use config::AppConfig;
use log::{LevelFilter, info};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

/// Main entry point for the backup tool
fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_logging();

    match run_app() {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let level = env::var(ENV_LOG_LEVEL)
        .ok()
        .and_then(|lvl| LevelFilter::from_str(lvl.trim()).ok())
        .unwrap_or(LevelFilter::Info);
    env_logger::Builder::new().filter_level(level).init();
}

fn run_app() -> Result<()> {
    // Defaults to config.json in the working directory.
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));
    let app_config = AppConfig::load_from_json(&config_path).context(format!(
        "Failed to load application configuration from {}",
        config_path.display()
    ))?;

    info!("🚀 Starting Backup Process...");
    let storage_location =
        backup::run_backup_flow(&app_config).context("Backup process failed")?;
    info!(
        "successfully dumped influxdb {} to s3 at {}",
        app_config.request.database, storage_location
    );
    Ok(())
}
