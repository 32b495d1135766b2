use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    // Archive encoding
    #[error("failed to create archive file {}: {source}", .path.display())]
    CreateArchive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open directory {}: {source}", .path.display())]
    OpenDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read directory {}: {source}", .path.display())]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read metadata of {}: {source}", .path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open file {}: {source}", .path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write header for {}: {source}", .path.display())]
    WriteHeader {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to copy contents of {} into archive: {source}", .path.display())]
    WriteBody {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to finish archive {}: {source}", .path.display())]
    FinishArchive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to archive files, however backup was created: {source}")]
    ArchiveFailed {
        #[source]
        source: Box<BackupError>,
    },

    // Publishing
    #[error("failed to read archive {}: {source}", .path.display())]
    ReadArchive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to upload empty payload for key {key}")]
    EmptyPayload { key: String },

    #[error("failed to upload item with key {key} to bucket {destination}: {message}")]
    Publish {
        key: String,
        destination: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("failed to cleanup files at {}, however backup was created and uploaded: {source}", .path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot command `{command}` failed: {stderr}")]
    Snapshot {
        command: String,
        stdout: String,
        stderr: String,
    },
}

pub type Result<T> = std::result::Result<T, BackupError>;
