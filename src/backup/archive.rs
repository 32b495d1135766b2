// influxbackup/src/backup/archive.rs
use flate2::Compression;
use flate2::write::GzEncoder;
use log::{debug, info};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};
use walkdir::WalkDir;

use crate::errors::{BackupError, Result};

/// Something that can pack a directory tree into a single archive file.
pub trait Archiver {
    /// Writes every directory and regular file below `input_dir` into a new
    /// archive at `output_path`. If `output_path` lies inside `input_dir` it is
    /// left out of the archive.
    fn encode(&self, output_path: &Path, input_dir: &Path) -> Result<()>;
}

/// Produces gzip compressed tar archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct GzTarArchiver;

impl Archiver for GzTarArchiver {
    fn encode(&self, output_path: &Path, input_dir: &Path) -> Result<()> {
        create_tar_gz_archive(input_dir, output_path).map(|_| ())
    }
}

/// Creates a GZipped TAR archive from a source directory.
///
/// Paths inside the archive are relative to `source_dir`, so the archive can
/// be extracted anywhere. The directory is walked depth-first, parents before
/// children; siblings come out in whatever order the filesystem lists them.
/// Symlinks and other special files are skipped.
///
/// On failure a partially written archive may be left behind at
/// `archive_dest_path`.
pub fn create_tar_gz_archive(source_dir: &Path, archive_dest_path: &Path) -> Result<PathBuf> {
    info!(
        "Creating tar.gz archive from {} to {}",
        source_dir.display(),
        archive_dest_path.display()
    );

    let archive_file =
        File::create(archive_dest_path).map_err(|source| BackupError::CreateArchive {
            path: archive_dest_path.to_path_buf(),
            source,
        })?;
    // Both sides are canonicalized so the self-exclusion check below compares
    // like with like, however the caller spelled the paths.
    let excluded =
        fs::canonicalize(archive_dest_path).map_err(|source| BackupError::CreateArchive {
            path: archive_dest_path.to_path_buf(),
            source,
        })?;
    let root = fs::canonicalize(source_dir).map_err(|source| BackupError::OpenDirectory {
        path: source_dir.to_path_buf(),
        source,
    })?;

    let enc = GzEncoder::new(archive_file, Compression::default());
    let mut tar_builder = Builder::new(enc);

    for entry in WalkDir::new(&root).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|err| walk_error(&root, err))?;
        let path = entry.path();
        let name = path.strip_prefix(&root).map_err(|_| {
            BackupError::Configuration(format!(
                "{} is not inside {}",
                path.display(),
                root.display()
            ))
        })?;
        let file_type = entry.file_type();

        if file_type.is_dir() {
            append_directory(&mut tar_builder, path, name)?;
        } else if file_type.is_file() {
            if path == excluded {
                debug!("skipping archive being written: {}", path.display());
                continue;
            }
            debug!("adding... {}", path.display());
            append_file(&mut tar_builder, path, name)?;
        } else {
            debug!("skipping special file {}", path.display());
        }
    }

    let encoder = tar_builder
        .into_inner()
        .map_err(|source| BackupError::FinishArchive {
            path: archive_dest_path.to_path_buf(),
            source,
        })?;
    let archive_file = encoder.finish().map_err(|source| BackupError::FinishArchive {
        path: archive_dest_path.to_path_buf(),
        source,
    })?;
    archive_file
        .sync_all()
        .map_err(|source| BackupError::FinishArchive {
            path: archive_dest_path.to_path_buf(),
            source,
        })?;

    info!(
        "✓ Tar.gz archive created successfully at {}",
        archive_dest_path.display()
    );
    Ok(archive_dest_path.to_path_buf())
}

/// The root failing is an open failure; anything deeper failed while listing.
fn walk_error(root: &Path, err: walkdir::Error) -> BackupError {
    let path = err.path().unwrap_or(root).to_path_buf();
    let depth = err.depth();
    let message = err.to_string();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::other(message));
    if depth == 0 {
        BackupError::OpenDirectory { path, source }
    } else {
        BackupError::ReadDirectory { path, source }
    }
}

fn append_directory<W: Write>(builder: &mut Builder<W>, path: &Path, name: &Path) -> Result<()> {
    let metadata = fs::metadata(path).map_err(|source| BackupError::Metadata {
        path: path.to_path_buf(),
        source,
    })?;

    let mut header = Header::new_gnu();
    header.set_metadata(&metadata);
    header.set_entry_type(EntryType::Directory);
    header.set_size(0);

    builder
        .append_data(&mut header, name, io::empty())
        .map_err(|source| BackupError::WriteHeader {
            path: path.to_path_buf(),
            source,
        })
}

fn append_file<W: Write>(builder: &mut Builder<W>, path: &Path, name: &Path) -> Result<()> {
    let file = File::open(path).map_err(|source| BackupError::OpenFile {
        path: path.to_path_buf(),
        source,
    })?;
    let metadata = file.metadata().map_err(|source| BackupError::Metadata {
        path: path.to_path_buf(),
        source,
    })?;

    let mut header = Header::new_gnu();
    header.set_metadata(&metadata);
    header.set_entry_type(EntryType::Regular);
    header.set_size(metadata.len());

    let mut body = BodyReader::new(file, metadata.len());
    builder
        .append_data(&mut header, name, &mut body)
        .map_err(|source| {
            if body.started {
                BackupError::WriteBody {
                    path: path.to_path_buf(),
                    source,
                }
            } else {
                BackupError::WriteHeader {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
}

/// Feeds exactly `len` bytes of an entry body to the tar writer. Remembers
/// whether the writer got as far as the body, so header failures can be told
/// apart from body failures, and fails if the source runs dry early.
struct BodyReader<R> {
    inner: io::Take<R>,
    remaining: u64,
    started: bool,
}

impl<R: Read> BodyReader<R> {
    fn new(inner: R, len: u64) -> Self {
        Self {
            inner: inner.take(len),
            remaining: len,
            started: false,
        }
    }
}

impl<R: Read> Read for BodyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.started = true;
        let n = self.inner.read(buf)?;
        if n == 0 && self.remaining > 0 && !buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file ended {} bytes short of its recorded size", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}
