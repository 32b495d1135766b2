// influxbackup/src/backup/logic.rs
use chrono::{DateTime, Local};
use log::{error, info};
use std::fs;
use std::path::{Path, PathBuf};

use super::archive::Archiver;
use super::publisher::{ARCHIVE_CONTENT_TYPE, Artifact, Locator, Publisher};
use crate::config::is_filesystem_root;
use crate::errors::{BackupError, Result};

// Fixed width and separator free, so archive names sort by creation time.
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// How a backup run ended. Only `Succeeded` carries a locator.
#[derive(Debug)]
pub enum BackupOutcome {
    Succeeded(Locator),
    /// Nothing was uploaded; the snapshot (and maybe a partial archive) is still on disk.
    FailedArchiving(BackupError),
    /// The archive is still on disk and can be uploaded by hand.
    FailedPublishing(BackupError),
}

impl BackupOutcome {
    pub fn locator(&self) -> Option<&Locator> {
        match self {
            BackupOutcome::Succeeded(locator) => Some(locator),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<Locator> {
        match self {
            BackupOutcome::Succeeded(locator) => Ok(locator),
            BackupOutcome::FailedArchiving(err) | BackupOutcome::FailedPublishing(err) => Err(err),
        }
    }
}

/// Archives a snapshot directory, uploads the archive and removes the
/// directory once the upload went through.
pub struct BucketBackup<P, A> {
    publisher: P,
    archiver: A,
}

impl<P: Publisher, A: Archiver> BucketBackup<P, A> {
    pub fn new(publisher: P, archiver: A) -> Self {
        Self {
            publisher,
            archiver,
        }
    }

    pub fn back_up(&self, source_dir: &Path) -> BackupOutcome {
        self.back_up_at(source_dir, Local::now())
    }

    fn back_up_at(&self, source_dir: &Path, now: DateTime<Local>) -> BackupOutcome {
        // Re-collecting the components drops trailing separators.
        let source_dir: PathBuf = source_dir.components().collect();

        info!("Archiving {}", source_dir.display());
        let archive_path = match self.archive(&source_dir, now) {
            Ok(path) => path,
            Err(err) => return BackupOutcome::FailedArchiving(err),
        };

        info!("Publishing {}", archive_path.display());
        let locator = match self.publish(&source_dir, &archive_path) {
            Ok(locator) => locator,
            Err(err) => return BackupOutcome::FailedPublishing(err),
        };

        info!("Cleaning up {}", source_dir.display());
        if let Err(err) = cleanup(&source_dir) {
            error!("{err}");
        }
        BackupOutcome::Succeeded(locator)
    }

    fn archive(&self, source_dir: &Path, now: DateTime<Local>) -> Result<PathBuf> {
        let archive_path = source_dir.join(archive_file_name(now));
        self.archiver
            .encode(&archive_path, source_dir)
            .map_err(|source| BackupError::ArchiveFailed {
                source: Box::new(source),
            })?;
        Ok(archive_path)
    }

    fn publish(&self, source_dir: &Path, archive_path: &Path) -> Result<Locator> {
        let key = archive_path
            .strip_prefix(source_dir)
            .map_err(|_| {
                BackupError::Configuration(format!(
                    "archive {} is not inside {}",
                    archive_path.display(),
                    source_dir.display()
                ))
            })?
            .to_string_lossy()
            .into_owned();

        let payload = fs::read(archive_path).map_err(|source| BackupError::ReadArchive {
            path: archive_path.to_path_buf(),
            source,
        })?;

        self.publisher.publish(Artifact {
            key,
            payload,
            content_type: ARCHIVE_CONTENT_TYPE.to_string(),
        })
    }
}

/// `dump_<YYYYMMDDHHMMSS>.tar.gz`. Two runs within the same second get the same name.
pub fn archive_file_name(now: DateTime<Local>) -> String {
    format!("dump_{}.tar.gz", now.format(TIMESTAMP_FORMAT))
}

/// Recursively removes `path`. Refuses to touch the filesystem root.
pub fn cleanup(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() || is_filesystem_root(path) {
        return Err(BackupError::Configuration(format!(
            "root path provided ({}), not going to cleanup",
            path.display()
        )));
    }
    fs::remove_dir_all(path).map_err(|source| BackupError::Cleanup {
        path: path.to_path_buf(),
        source,
    })
}
