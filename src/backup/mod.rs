pub(crate) mod archive; // tar.gz encoding of the snapshot directory
pub(crate) mod key; // storage key derivation
pub(crate) mod logic; // archive -> upload -> cleanup pipeline
pub(crate) mod publisher; // object storage boundary and the S3 adapter

use anyhow::{Context, Result};
use log::info;

use crate::config::AppConfig;
use crate::snapshot;
use archive::GzTarArchiver;
use logic::BucketBackup;
use publisher::{Locator, S3Publisher};

/// Public entry point for the backup process: takes the database snapshot
/// (unless disabled), then archives, uploads and removes it.
pub fn run_backup_flow(app_config: &AppConfig) -> Result<Locator> {
    let request = &app_config.request;

    if app_config.snapshot.enabled {
        snapshot::create_snapshot(&app_config.snapshot, &request.database).with_context(|| {
            format!("Failed to create snapshot for database {}", request.database)
        })?;
    } else {
        info!("Snapshot step disabled, using existing files in {}", request.source_dir.display());
    }

    let publisher = S3Publisher::connect(&app_config.storage)
        .with_context(|| format!("Failed to set up S3 client for bucket {}", request.bucket))?;
    let bb = BucketBackup::new(publisher, GzTarArchiver);

    let outcome = bb.back_up(&request.source_dir);
    if let Some(locator) = outcome.locator() {
        info!("Backup of {} stored at {}", request.database, locator);
    }
    let locator = outcome.into_result().with_context(|| {
        format!(
            "Backup of {} to bucket {} failed",
            request.source_dir.display(),
            request.bucket
        )
    })?;
    Ok(locator)
}
