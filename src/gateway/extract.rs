//! Archive unpacking
//!
//! Runs on a blocking thread. The archive is a tar stream, optionally gzip or
//! zstd compressed; the compression is recognised from its magic bytes.
//!
//! Only directories and regular files are materialised. Links, devices and
//! other entry types are skipped, so nothing under an unpacked tree can point
//! outside it.

use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use thiserror::Error;
use tracing::{debug, info};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];

/// Staging directories are hidden so they never collide with a version name
const STAGING_PREFIX: &str = ".staging-";

/// Mode of a published version root
#[cfg(unix)]
const VERSION_DIR_MODE: u32 = 0o755;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error while unpacking: {0}")]
    Io(#[from] io::Error),

    #[error("archive entry escapes the target directory: {0}")]
    UnsafePath(String),

    #[error("archive is empty")]
    Empty,

    #[error("unpacking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    pub fn from_magic_bytes(bytes: &[u8]) -> Self {
        if bytes.starts_with(GZIP_MAGIC) {
            Compression::Gzip
        } else if bytes.starts_with(ZSTD_MAGIC) {
            Compression::Zstd
        } else {
            Compression::None
        }
    }

    fn wrap_reader<'a, R: BufRead + 'a>(&self, reader: R) -> io::Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Compression::None => Box::new(reader),
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
            Compression::Zstd => Box::new(zstd::stream::read::Decoder::with_buffer(reader)?),
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UnpackStats {
    pub directories: usize,
    pub files: usize,
    pub skipped: usize,
}

/// Unpack `reader` into `dest`, which must already exist
pub fn unpack<R: Read>(reader: R, dest: &Path) -> Result<UnpackStats, ExtractError> {
    let mut reader = BufReader::new(reader);
    let head = reader.fill_buf()?;
    if head.is_empty() {
        return Err(ExtractError::Empty);
    }
    let compression = Compression::from_magic_bytes(head);
    debug!("Unpacking {:?} archive into {:?}", compression, dest);

    let mut archive = Archive::new(compression.wrap_reader(reader)?);
    let mut stats = UnpackStats::default();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        let target = dest.join(relative_path(&entry_path)?);

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target)?;
                stats.directories += 1;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mode = entry.header().mode()?;
                let mut file = create_file(&target, mode)?;
                io::copy(&mut entry, &mut file)?;
                stats.files += 1;
            }
            other => {
                debug!("Skipping {:?} entry {:?}", other, entry_path);
                stats.skipped += 1;
            }
        }
    }

    // a bare end-of-archive marker is as useless as no body at all
    if stats == UnpackStats::default() {
        return Err(ExtractError::Empty);
    }

    Ok(stats)
}

/// Unpack into a staging directory under `cache_root`, then move it to `target`
///
/// The target directory only ever appears fully populated. On failure the
/// staging directory is removed and `target` is left absent.
pub fn install<R: Read>(reader: R, cache_root: &Path, target: &Path) -> Result<UnpackStats, ExtractError> {
    fs::create_dir_all(cache_root)?;
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(cache_root)?;
    publishable(staging.path())?;

    let stats = unpack(reader, staging.path())?;

    if let Err(e) = fs::rename(staging.path(), target) {
        // another fill finished first; its copy is just as good
        if target.is_dir() {
            debug!("{:?} appeared while unpacking, discarding staged copy", target);
            return Ok(stats);
        }
        return Err(e.into());
    }
    // renamed away, nothing left to clean up
    let _ = staging.keep();

    info!(
        "Unpacked {} files and {} directories into {:?}",
        stats.files, stats.directories, target
    );
    Ok(stats)
}

/// Staging directories are created 0700, a published version root is not
#[cfg(unix)]
fn publishable(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(dir, fs::Permissions::from_mode(VERSION_DIR_MODE))
}

#[cfg(not(unix))]
fn publishable(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Delete staging directories left by fills that never finished
pub fn remove_stale_staging(cache_root: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(cache_root)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) && entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Normalise an entry path, refusing anything that leaves the archive root
fn relative_path(path: &Path) -> Result<PathBuf, ExtractError> {
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractError::UnsafePath(path.display().to_string()));
            }
        }
    }
    Ok(relative)
}

#[cfg(unix)]
fn create_file(path: &Path, mode: u32) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
}

#[cfg(not(unix))]
fn create_file(path: &Path, _mode: u32) -> io::Result<fs::File> {
    fs::File::create(path)
}
