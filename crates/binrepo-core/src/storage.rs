//! Per-repository storage
//!
//! Each storing repository owns a [`RepoStorage`]: its blob store plus the
//! item index built over it. A [`StorageProvider`] opens storage by
//! repository key and keeps it across registry reloads, so a repository
//! that survives a reload keeps its index.

use crate::item::ItemIndex;
use crate::{Error, Result};
use binrepo_fs::{BlobStore, FsBlobStore, MemoryBlobStore, RobustnessConfig, validate_repo_key};
use dashmap::DashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Content and index of one repository.
#[derive(Debug)]
pub struct RepoStorage {
    blobs: Arc<dyn BlobStore>,
    index: ItemIndex,
    indexed: AtomicBool,
}

impl RepoStorage {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            index: ItemIndex::new(),
            indexed: AtomicBool::new(false),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBlobStore::new()))
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    pub fn index(&self) -> &ItemIndex {
        &self.index
    }

    /// Whether the index has been built from the blob store.
    pub fn is_indexed(&self) -> bool {
        self.indexed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_indexed(&self) {
        self.indexed.store(true, Ordering::Release);
    }

    /// Delete all content and metadata.
    pub fn wipe(&self) -> Result<()> {
        self.index.clear();
        self.blobs.clear()?;
        Ok(())
    }
}

/// Opens storage for repository keys.
pub trait StorageProvider: Send + Sync + fmt::Debug {
    fn open(&self, repo_key: &str) -> Result<Arc<RepoStorage>>;

    /// Forget the storage of a repository that is no longer configured.
    fn remove(&self, repo_key: &str);
}

/// One blob directory per repository below a common root.
pub struct FsStorageProvider {
    root: PathBuf,
    robustness: RobustnessConfig,
    opened: DashMap<String, Arc<RepoStorage>>,
}

impl fmt::Debug for FsStorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsStorageProvider")
            .field("root", &self.root)
            .field("opened", &self.opened.len())
            .finish()
    }
}

impl FsStorageProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_robustness(root, RobustnessConfig::default())
    }

    pub fn with_robustness(root: impl Into<PathBuf>, robustness: RobustnessConfig) -> Self {
        Self {
            root: root.into(),
            robustness,
            opened: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl StorageProvider for FsStorageProvider {
    fn open(&self, repo_key: &str) -> Result<Arc<RepoStorage>> {
        validate_repo_key(repo_key)?;
        if let Some(storage) = self.opened.get(repo_key) {
            return Ok(Arc::clone(storage.value()));
        }
        let dir = self.root.join(repo_key);
        let blobs = FsBlobStore::with_robustness(&dir, self.robustness).map_err(|e| {
            Error::configuration(format!(
                "cannot open storage for '{repo_key}' at {}: {e}",
                dir.display()
            ))
        })?;
        tracing::debug!(repo = repo_key, dir = %dir.display(), "opened filesystem storage");
        let storage = self
            .opened
            .entry(repo_key.to_string())
            .or_insert_with(|| Arc::new(RepoStorage::new(Arc::new(blobs))));
        Ok(Arc::clone(storage.value()))
    }

    fn remove(&self, repo_key: &str) {
        self.opened.remove(repo_key);
    }
}

/// Storage that lives only as long as the provider.
#[derive(Debug, Default)]
pub struct MemoryStorageProvider {
    opened: DashMap<String, Arc<RepoStorage>>,
}

impl MemoryStorageProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageProvider for MemoryStorageProvider {
    fn open(&self, repo_key: &str) -> Result<Arc<RepoStorage>> {
        validate_repo_key(repo_key)?;
        let storage = self
            .opened
            .entry(repo_key.to_string())
            .or_insert_with(|| Arc::new(RepoStorage::in_memory()));
        Ok(Arc::clone(storage.value()))
    }

    fn remove(&self, repo_key: &str) {
        self.opened.remove(repo_key);
    }
}
