// influxbackup/src/snapshot.rs
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use which::which;

use crate::config::SnapshotConfig;
use crate::errors::{BackupError, Result};

// Helper function to find the docker executable
fn find_docker_executable() -> Result<PathBuf> {
    which("docker").map_err(|e| {
        BackupError::Configuration(format!(
            "docker executable not found in PATH ({e}). Please ensure docker is installed and in your PATH."
        ))
    })
}

/// Asks the InfluxDB running in a local docker container to write a portable
/// backup of `database` to `snapshot.mounted_path` (a path inside the
/// container that is expected to be mounted on the host).
pub fn create_snapshot(snapshot: &SnapshotConfig, database: &str) -> Result<()> {
    let docker = find_docker_executable()?;
    debug!("Found docker executable at: {}", docker.display());

    let container_id = find_container_id(&docker, &snapshot.container_filter)?;
    info!(
        "Creating snapshot of database {} in container {} at {}",
        database, container_id, snapshot.mounted_path
    );

    let args = backup_command_args(&container_id, database, &snapshot.mounted_path);
    let output = run(&docker, &args)?;
    debug!("command output: {}", String::from_utf8_lossy(&output.stdout));

    info!("✓ Snapshot of {} created", database);
    Ok(())
}

fn find_container_id(docker: &Path, filter: &str) -> Result<String> {
    let output = run(docker, &["ps".to_string()])?;
    let listing = String::from_utf8_lossy(&output.stdout);
    container_id_from_listing(&listing, filter).ok_or_else(|| BackupError::Snapshot {
        command: format!("{} ps", docker.display()),
        stdout: listing.to_string(),
        stderr: format!("no running container matches '{filter}'"),
    })
}

/// Picks the id of the first `docker ps` line mentioning `filter`.
fn container_id_from_listing(listing: &str, filter: &str) -> Option<String> {
    listing
        .lines()
        .skip(1) // header
        .find(|line| line.contains(filter))
        .and_then(|line| line.split_whitespace().next())
        .map(str::to_string)
}

fn backup_command_args(container_id: &str, database: &str, mounted_path: &str) -> Vec<String> {
    [
        "exec",
        container_id,
        "influxd",
        "backup",
        "-portable",
        "-database",
        database,
        mounted_path,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn run(program: &Path, args: &[String]) -> Result<Output> {
    let command = format!("{} {}", program.display(), args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| BackupError::Snapshot {
            command: command.clone(),
            stdout: String::new(),
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(BackupError::Snapshot {
            command,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(output)
}
