//! Atomic streaming writes with file locking

use crate::checksum::{ContentDigest, DigestingReader};
use crate::{Error, Result};
use backoff::ExponentialBackoffBuilder;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tuning for lock acquisition and durability of writes.
#[derive(Debug, Clone, Copy)]
pub struct RobustnessConfig {
    /// How long to retry acquiring the advisory lock before giving up.
    pub lock_timeout: Duration,
    /// Whether to fsync the temp file before the rename.
    pub enable_fsync: bool,
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(10),
            enable_fsync: true,
        }
    }
}

/// Sidecar lock file guarding writes to `path`.
///
/// Hidden (dot-prefixed) so blob listings skip it.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.lock"))
}

/// Stream `content` into `path` atomically, hashing it on the way.
///
/// Bytes go to a hidden temp file in the target directory (same filesystem),
/// which is renamed over the target once fully written. An advisory lock on a
/// sidecar file serializes concurrent writers of the same path; acquisition is
/// retried with backoff until `config.lock_timeout` elapses.
pub fn write_stream_atomic(
    path: &Path,
    content: &mut dyn Read,
    config: RobustnessConfig,
) -> Result<ContentDigest> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let lock_path = lock_path_for(path);
    let lock_file = acquire_lock(&lock_path, path, config.lock_timeout)?;

    let temp_path = path.with_file_name(format!(
        ".{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        uuid::Uuid::new_v4().simple()
    ));

    let result = write_temp(&temp_path, content, config)
        .and_then(|digest| {
            fs::rename(&temp_path, path).map_err(|e| Error::io(path, e))?;
            Ok(digest)
        });

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    // Lock released when lock_file is dropped
    drop(lock_file);
    result
}

/// Write a byte slice atomically.
pub fn write_atomic(path: &Path, content: &[u8], config: RobustnessConfig) -> Result<()> {
    let mut reader = content;
    write_stream_atomic(path, &mut reader, config).map(|_| ())
}

/// Read a whole file as text.
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

fn write_temp(temp_path: &Path, content: &mut dyn Read, config: RobustnessConfig) -> Result<ContentDigest> {
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp_path)
        .map_err(|e| Error::io(temp_path, e))?;

    let mut digesting = DigestingReader::new(content);
    io::copy(&mut digesting, &mut temp_file).map_err(|e| Error::io(temp_path, e))?;
    temp_file.flush().map_err(|e| Error::io(temp_path, e))?;

    if config.enable_fsync {
        temp_file.sync_all().map_err(|e| Error::io(temp_path, e))?;
    }

    Ok(digesting.finish())
}

fn acquire_lock(lock_path: &Path, target: &Path, timeout: Duration) -> Result<File> {
    let lock_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|e| Error::io(lock_path, e))?;

    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(5))
        .with_max_interval(Duration::from_millis(200))
        .with_max_elapsed_time(Some(timeout))
        .build();

    backoff::retry(policy, || {
        lock_file
            .try_lock_exclusive()
            .map_err(backoff::Error::transient)
    })
    .map_err(|_| {
        tracing::warn!(path = %target.display(), "Timed out waiting for write lock");
        Error::LockFailed {
            path: target.to_path_buf(),
        }
    })?;

    Ok(lock_file)
}
