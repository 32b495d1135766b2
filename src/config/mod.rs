// influxbackup/src/config/mod.rs
use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::BackupError;

pub const DEFAULT_DATABASE: &str = "myDbName";
pub const DEFAULT_MOUNTED_PATH: &str = "/var/lib/influxdb/backup";
pub const DEFAULT_CONTAINER_FILTER: &str = "influxdb";

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonS3StorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonSnapshotOptions {
    pub enabled: Option<bool>,
    pub container_filter: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub database: Option<String>,
    pub backup_path: Option<PathBuf>,
    pub mounted_path: Option<String>,
    pub s3_storage: Option<JsonS3StorageConfig>,
    pub snapshot: Option<JsonSnapshotOptions>,
}

// Application's internal configuration structs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub bucket_name: String,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    /// `None` means the SDK's default credential chain.
    pub credentials: Option<StaticCredentials>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotConfig {
    pub enabled: bool,
    pub container_filter: String,
    /// Where the database engine writes the snapshot, as seen inside its container.
    pub mounted_path: String,
}

/// Input of one backup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequest {
    pub database: String,
    /// Snapshot directory on the host. Removed after a successful upload.
    pub source_dir: PathBuf,
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub request: BackupRequest,
    pub storage: StorageConfig,
    pub snapshot: SnapshotConfig,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig =
            serde_json::from_str(&config_content).with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;
        Self::from_raw(raw_json_config)
    }

    pub fn from_raw(raw: RawJsonConfig) -> Result<Self> {
        let database = non_empty(raw.database).unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let source_dir = raw
            .backup_path
            .filter(|p| !p.as_os_str().is_empty())
            .context("backup_path must be set in config.json")?;
        if is_filesystem_root(&source_dir) {
            return Err(BackupError::Configuration(format!(
                "backup_path {} is the filesystem root, refusing to use it",
                source_dir.display()
            ))
            .into());
        }

        let storage = load_storage_config(raw.s3_storage.unwrap_or_default())?;

        let snapshot_opts = raw.snapshot.unwrap_or_default();
        let snapshot = SnapshotConfig {
            enabled: snapshot_opts.enabled.unwrap_or(true),
            container_filter: non_empty(snapshot_opts.container_filter)
                .unwrap_or_else(|| DEFAULT_CONTAINER_FILTER.to_string()),
            mounted_path: non_empty(raw.mounted_path)
                .unwrap_or_else(|| DEFAULT_MOUNTED_PATH.to_string()),
        };

        Ok(AppConfig {
            request: BackupRequest {
                database,
                source_dir,
                bucket: storage.bucket_name.clone(),
            },
            storage,
            snapshot,
        })
    }
}

fn load_storage_config(raw: JsonS3StorageConfig) -> Result<StorageConfig> {
    let bucket_name = non_empty(raw.bucket_name)
        .context("s3_storage.bucket_name must be set in config.json")?;

    let credentials = match (
        non_empty(raw.access_key_id),
        non_empty(raw.secret_access_key),
    ) {
        (Some(access_key_id), Some(secret_access_key)) => Some(StaticCredentials {
            access_key_id,
            secret_access_key,
        }),
        (None, None) => None,
        _ => {
            warn!(
                "Only one of s3_storage.access_key_id / secret_access_key is set; falling back to the default AWS credential chain."
            );
            None
        }
    };

    Ok(StorageConfig {
        bucket_name,
        region: non_empty(raw.region),
        endpoint_url: non_empty(raw.endpoint_url),
        credentials,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// True when `path` names `/` (or a drive root), possibly through `..` or symlinks.
pub fn is_filesystem_root(path: &Path) -> bool {
    let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    resolved.parent().is_none() && resolved.has_root()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<AppConfig> {
        AppConfig::from_raw(serde_json::from_value(value)?)
    }

    #[test]
    fn test_full_config() -> anyhow::Result<()> {
        let config = parse(json!({
            "database": "telemetry",
            "backup_path": "/home/ec2-user/influxdb/data/backup",
            "mounted_path": "/backup",
            "s3_storage": {
                "bucket_name": "my-bucket",
                "region": "eu-central-1",
                "endpoint_url": "https://nyc3.digitaloceanspaces.com",
                "access_key_id": "AKIA",
                "secret_access_key": "secret"
            },
            "snapshot": { "enabled": false, "container_filter": "influx-prod" }
        }))?;

        assert_eq!(
            config.request,
            BackupRequest {
                database: "telemetry".to_string(),
                source_dir: PathBuf::from("/home/ec2-user/influxdb/data/backup"),
                bucket: "my-bucket".to_string(),
            }
        );
        assert_eq!(config.storage.region.as_deref(), Some("eu-central-1"));
        assert_eq!(
            config.storage.endpoint_url.as_deref(),
            Some("https://nyc3.digitaloceanspaces.com")
        );
        assert_eq!(
            config.storage.credentials,
            Some(StaticCredentials {
                access_key_id: "AKIA".to_string(),
                secret_access_key: "secret".to_string(),
            })
        );
        assert!(!config.snapshot.enabled);
        assert_eq!(config.snapshot.container_filter, "influx-prod");
        assert_eq!(config.snapshot.mounted_path, "/backup");
        Ok(())
    }

    #[test]
    fn test_defaults() -> anyhow::Result<()> {
        let config = parse(json!({
            "backup_path": "/tmp/influx_snapshot",
            "s3_storage": { "bucket_name": "my-bucket", "region": "" }
        }))?;

        assert_eq!(config.request.database, DEFAULT_DATABASE);
        assert_eq!(config.storage.region, None);
        assert_eq!(config.storage.credentials, None);
        assert!(config.snapshot.enabled);
        assert_eq!(config.snapshot.container_filter, DEFAULT_CONTAINER_FILTER);
        assert_eq!(config.snapshot.mounted_path, DEFAULT_MOUNTED_PATH);
        Ok(())
    }

    #[test]
    fn test_partial_credentials_fall_back_to_default_chain() -> anyhow::Result<()> {
        let config = parse(json!({
            "backup_path": "/tmp/influx_snapshot",
            "s3_storage": { "bucket_name": "my-bucket", "access_key_id": "AKIA" }
        }))?;
        assert_eq!(config.storage.credentials, None);
        Ok(())
    }

    #[test]
    fn test_missing_backup_path() {
        let result = parse(json!({ "s3_storage": { "bucket_name": "my-bucket" } }));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_bucket() {
        let result = parse(json!({
            "backup_path": "/tmp/influx_snapshot",
            "s3_storage": { "bucket_name": "  " }
        }));
        assert!(result.is_err());

        let result = parse(json!({ "backup_path": "/tmp/influx_snapshot" }));
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_root_backup_path_is_rejected() {
        for root in ["/", "/tmp/.."] {
            let err = parse(json!({
                "backup_path": root,
                "s3_storage": { "bucket_name": "my-bucket" }
            }))
            .expect_err("root must be rejected");
            assert!(
                matches!(
                    err.downcast_ref::<BackupError>(),
                    Some(BackupError::Configuration(_))
                ),
                "unexpected error for {root}: {err}"
            );
        }
    }

    #[test]
    fn test_load_from_json_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config_path = dir.path().join("config.json");
        fs::write(
            &config_path,
            json!({
                "backup_path": dir.path(),
                "s3_storage": { "bucket_name": "my-bucket" }
            })
            .to_string(),
        )?;

        let config = AppConfig::load_from_json(&config_path)?;
        assert_eq!(config.request.source_dir, dir.path());
        Ok(())
    }

    #[test]
    fn test_load_from_invalid_json_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config_path = dir.path().join("config.json");
        fs::write(&config_path, "{ not json")?;

        assert!(AppConfig::load_from_json(&config_path).is_err());
        assert!(AppConfig::load_from_json(&dir.path().join("missing.json")).is_err());
        Ok(())
    }
}
