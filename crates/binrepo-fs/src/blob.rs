//! Byte-stream storage capability
//!
//! The repository core treats content as opaque: it only needs to stream
//! bytes in (hashing them as they are persisted), stream them back out, and
//! move or delete them. The staging area and write sidecars are reserved
//! (see [`is_reserved`]) and never appear in listings.

use crate::checksum::{ContentDigest, DigestingReader};
use crate::io::{self, RobustnessConfig};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;
use walkdir::WalkDir;

/// Prefix of the staging area inside every blob store.
pub const STAGING_DIR: &str = ".staging";

/// A fresh, unique staging location.
pub fn staging_path() -> String {
    format!("{}/{}", STAGING_DIR, uuid::Uuid::new_v4().simple())
}

/// Whether `path` belongs to the store itself rather than to content.
///
/// Reserved are the staging area and the write sidecars kept next to a
/// blob (`.<name>.lock`, `.<name>.<id>.tmp`). Other dot-prefixed names are
/// ordinary content.
pub fn is_reserved(path: &str) -> bool {
    let mut segments = path.split('/');
    if segments.next() == Some(STAGING_DIR) {
        return true;
    }
    let name = path.rsplit('/').next().unwrap_or(path);
    name.starts_with('.') && (name.ends_with(".lock") || name.ends_with(".tmp"))
}

/// Streaming read/write access to the bytes of one repository.
pub trait BlobStore: Send + Sync + fmt::Debug {
    /// Persist `content` at `path`, returning its size and checksums.
    fn write(&self, path: &str, content: &mut dyn Read) -> Result<ContentDigest>;

    /// Open the content at `path` for reading.
    fn read(&self, path: &str) -> Result<Box<dyn Read + Send>>;

    fn exists(&self, path: &str) -> bool;

    /// Move content from one path to another, replacing any existing target.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Delete the content at `path` and everything below it. Missing paths are ignored.
    fn delete(&self, path: &str) -> Result<()>;

    /// Relative paths of every stored blob, excluding reserved entries.
    fn list(&self) -> Result<Vec<String>>;

    /// Remove all content.
    fn clear(&self) -> Result<()>;
}

/// Blob store backed by a directory tree.
#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
    robustness: RobustnessConfig,
}

impl FsBlobStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_robustness(root, RobustnessConfig::default())
    }

    pub fn with_robustness(root: impl Into<PathBuf>, robustness: RobustnessConfig) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::io(&root, e))?;
        let root = dunce::canonicalize(&root).map_err(|e| Error::io(&root, e))?;
        Ok(Self { root, robustness })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn native(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }
}

impl BlobStore for FsBlobStore {
    fn write(&self, path: &str, content: &mut dyn Read) -> Result<ContentDigest> {
        io::write_stream_atomic(&self.native(path), content, self.robustness)
    }

    fn read(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let native = self.native(path);
        if !native.is_file() {
            return Err(Error::BlobNotFound {
                path: path.to_string(),
            });
        }
        let file = fs::File::open(&native).map_err(|e| Error::io(&native, e))?;
        Ok(Box::new(file))
    }

    fn exists(&self, path: &str) -> bool {
        self.native(path).exists()
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let source = self.native(from);
        let target = self.native(to);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::rename(&source, &target).map_err(|e| Error::io(&target, e))?;
        let _ = fs::remove_file(io::lock_path_for(&source));
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        let native = self.native(path);
        let result = if native.is_dir() {
            fs::remove_dir_all(&native)
        } else {
            fs::remove_file(&native)
        };
        match result {
            Ok(()) => {
                let _ = fs::remove_file(io::lock_path_for(&native));
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&native, e)),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry.map_err(|e| {
                let path = e.path().map(|p| p.to_path_buf()).unwrap_or_else(|| self.root.clone());
                Error::io(path, std::io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !is_reserved(&relative) {
                paths.push(relative);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(&self.root, e)),
        }
        fs::create_dir_all(&self.root).map_err(|e| Error::io(&self.root, e))
    }
}

/// Blob store held entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<BTreeMap<String, Arc<Vec<u8>>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().keys().filter(|k| !is_reserved(k)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn write(&self, path: &str, content: &mut dyn Read) -> Result<ContentDigest> {
        let mut digesting = DigestingReader::new(content);
        let mut buffer = Vec::new();
        digesting
            .read_to_end(&mut buffer)
            .map_err(|e| Error::io(path, e))?;
        self.blobs.write().insert(path.to_string(), Arc::new(buffer));
        Ok(digesting.finish())
    }

    fn read(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let blob = self
            .blobs
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::BlobNotFound {
                path: path.to_string(),
            })?;
        Ok(Box::new(Cursor::new(blob.as_ref().clone())))
    }

    fn exists(&self, path: &str) -> bool {
        let prefix = format!("{path}/");
        let blobs = self.blobs.read();
        blobs.contains_key(path) || blobs.keys().any(|k| k.starts_with(&prefix))
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut blobs = self.blobs.write();
        let blob = blobs.remove(from).ok_or_else(|| Error::BlobNotFound {
            path: from.to_string(),
        })?;
        blobs.insert(to.to_string(), blob);
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        let prefix = format!("{path}/");
        self.blobs
            .write()
            .retain(|k, _| k != path && !k.starts_with(&prefix));
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .blobs
            .read()
            .keys()
            .filter(|k| !is_reserved(k))
            .cloned()
            .collect())
    }

    fn clear(&self) -> Result<()> {
        self.blobs.write().clear();
        Ok(())
    }
}
