//! Live set of repositories
//!
//! The registry builds every repository from a [`CentralConfig`] and swaps
//! the finished set in atomically. Readers take a snapshot
//! ([`Arc<Repositories>`]) and never observe a half-built registry.

use crate::config::CentralConfig;
use crate::derive::ChecksumSearch;
use crate::lock::LockManager;
use crate::repo::{LocalRepo, RemoteRepo, Repo, StoringRepoRef, VirtualRepo};
use crate::storage::{RepoStorage, StorageProvider};
use crate::{Error, Result};
use arc_swap::ArcSwap;
use binrepo_fs::{ChecksumPair, ChecksumType, RepoPath};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// One consistent generation of repository instances.
#[derive(Debug, Default)]
pub struct Repositories {
    /// Local and cache repositories
    locals: BTreeMap<String, Arc<LocalRepo>>,
    remotes: BTreeMap<String, Arc<RemoteRepo>>,
    virtuals: BTreeMap<String, Arc<VirtualRepo>>,
}

impl Repositories {
    pub fn local(&self, key: &str) -> Option<&Arc<LocalRepo>> {
        self.locals.get(key)
    }

    pub fn remote(&self, key: &str) -> Option<&Arc<RemoteRepo>> {
        self.remotes.get(key)
    }

    pub fn virtual_repo(&self, key: &str) -> Option<&Arc<VirtualRepo>> {
        self.virtuals.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.locals.contains_key(key)
            || self.remotes.contains_key(key)
            || self.virtuals.contains_key(key)
    }

    pub fn repo(&self, key: &str) -> Option<Repo> {
        if let Some(local) = self.locals.get(key) {
            return Some(if local.is_cache() {
                Repo::Cache(Arc::clone(local))
            } else {
                Repo::Local(Arc::clone(local))
            });
        }
        if let Some(remote) = self.remotes.get(key) {
            return Some(Repo::Remote(Arc::clone(remote)));
        }
        self.virtuals
            .get(key)
            .map(|v| Repo::Virtual(Arc::clone(v)))
    }

    /// Every key, sorted.
    pub fn keys(&self) -> BTreeSet<String> {
        self.locals
            .keys()
            .chain(self.remotes.keys())
            .chain(self.virtuals.keys())
            .cloned()
            .collect()
    }

    /// Every repository, sorted by key.
    pub fn all(&self) -> Vec<Repo> {
        self.keys().iter().filter_map(|k| self.repo(k)).collect()
    }

    pub fn locals(&self) -> impl Iterator<Item = &Arc<LocalRepo>> {
        self.locals.values()
    }

    pub fn remotes(&self) -> impl Iterator<Item = &Arc<RemoteRepo>> {
        self.remotes.values()
    }

    pub fn virtuals(&self) -> impl Iterator<Item = &Arc<VirtualRepo>> {
        self.virtuals.values()
    }

    pub fn blacked_out(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(Repo::is_blacked_out)
            .map(|r| r.key().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.locals.len() + self.remotes.len() + self.virtuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a rebuild changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub blacked_out: Vec<String>,
}

/// Holder of the current [`Repositories`] generation.
pub struct RepoRegistry {
    current: ArcSwap<Repositories>,
    storage: Arc<dyn StorageProvider>,
    locks: Arc<LockManager>,
    rebuild: Mutex<()>,
}

impl fmt::Debug for RepoRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoRegistry")
            .field("keys", &self.keys())
            .field("storage", &self.storage)
            .finish()
    }
}

impl RepoRegistry {
    /// An empty registry; call [`RepoRegistry::rebuild_repositories`] to populate it.
    pub fn new(storage: Arc<dyn StorageProvider>, locks: Arc<LockManager>) -> Self {
        Self {
            current: ArcSwap::from_pointee(Repositories::default()),
            storage,
            locks,
            rebuild: Mutex::new(()),
        }
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// The current generation.
    pub fn snapshot(&self) -> Arc<Repositories> {
        self.current.load_full()
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.current.load().keys()
    }

    pub fn repository_by_key(&self, key: &str) -> Option<Repo> {
        self.current.load().repo(key)
    }

    pub fn local_or_cached_repository_by_key(&self, key: &str) -> Option<Arc<LocalRepo>> {
        self.current.load().local(key).cloned()
    }

    pub fn remote_repository_by_key(&self, key: &str) -> Option<Arc<RemoteRepo>> {
        self.current.load().remote(key).cloned()
    }

    pub fn virtual_repository_by_key(&self, key: &str) -> Option<Arc<VirtualRepo>> {
        self.current.load().virtual_repo(key).cloned()
    }

    /// A repository that can answer path queries: local, cache or virtual.
    pub fn storing_repository_by_key(&self, key: &str) -> Option<StoringRepoRef> {
        let repos = self.snapshot();
        if let Some(local) = repos.local(key) {
            return Some(StoringRepoRef::Local(Arc::clone(local)));
        }
        let repo = Arc::clone(repos.virtual_repo(key)?);
        Some(StoringRepoRef::Virtual { repo, repos })
    }

    /// Build every repository from `config`, then swap them in at once.
    ///
    /// Initialization runs locals and caches first, then remotes, then
    /// virtuals (instantiated together, initialized in a second pass). A
    /// repository that fails to initialize is blacked out instead of
    /// dropped. Repositories absent from the new configuration are
    /// destroyed after the swap.
    pub fn rebuild_repositories(&self, config: &CentralConfig) -> Result<ReloadReport> {
        let _rebuild = self.rebuild.lock();
        config.validate()?;
        self.locks.set_timeout(config.storage.lock_timeout());

        let mut next = Repositories::default();

        for descriptor in config.locals() {
            let storage = self.open_storage(&descriptor.key);
            let repo = LocalRepo::local(descriptor, storage.0, Arc::clone(&self.locks));
            finish_init(&descriptor.key, storage.1, repo.init(), |r| repo.black_out(r));
            next.locals.insert(descriptor.key.clone(), Arc::new(repo));
        }

        for descriptor in config.remotes() {
            let cache_descriptor = descriptor.cache_descriptor();
            let storage = self.open_storage(&cache_descriptor.key);
            let cache = LocalRepo::cache(&cache_descriptor, storage.0, Arc::clone(&self.locks));
            finish_init(&cache_descriptor.key, storage.1, cache.init(), |r| cache.black_out(r));
            next.locals.insert(cache_descriptor.key.clone(), Arc::new(cache));

            let remote = RemoteRepo::new(descriptor);
            finish_init(&descriptor.key, None, remote.init(), |r| remote.black_out(r));
            next.remotes.insert(descriptor.key.clone(), Arc::new(remote));
        }

        for descriptor in config.virtuals() {
            next.virtuals
                .insert(descriptor.key.clone(), Arc::new(VirtualRepo::new(descriptor)));
        }
        for repo in next.virtuals.values() {
            finish_init(repo.key(), None, repo.init(&next), |r| repo.black_out(r));
        }

        let next = Arc::new(next);
        let previous = self.current.swap(Arc::clone(&next));

        let old_keys = previous.keys();
        let new_keys = next.keys();
        let report = ReloadReport {
            added: new_keys.difference(&old_keys).cloned().collect(),
            removed: old_keys.difference(&new_keys).cloned().collect(),
            blacked_out: next.blacked_out(),
        };

        for remote in previous.remotes() {
            remote.destroy();
        }
        for key in &report.removed {
            if let Some(local) = previous.local(key) {
                if let Err(e) = local.destroy() {
                    tracing::error!(repo = %key, error = %e, "failed to delete removed repository");
                }
                self.storage.remove(key);
            }
        }

        tracing::info!(
            repositories = next.len(),
            added = report.added.len(),
            removed = report.removed.len(),
            blacked_out = report.blacked_out.len(),
            "repositories rebuilt"
        );
        Ok(report)
    }

    fn open_storage(&self, key: &str) -> (Arc<RepoStorage>, Option<Error>) {
        match self.storage.open(key) {
            Ok(storage) => (storage, None),
            Err(e) => (Arc::new(RepoStorage::in_memory()), Some(e)),
        }
    }

    /// Stop background work of every repository.
    pub fn shutdown(&self) {
        for remote in self.current.load().remotes() {
            remote.destroy();
        }
    }
}

fn finish_init(key: &str, open_error: Option<Error>, init: Result<()>, black_out: impl FnOnce(&str)) {
    let failure = open_error.map(Err).unwrap_or(init);
    if let Err(e) = failure {
        tracing::error!(repo = %key, error = %e, "repository failed to initialize");
        black_out(&e.to_string());
    }
}

impl ChecksumSearch for RepoRegistry {
    fn find_by_checksum(&self, checksum_type: ChecksumType, value: &str) -> Result<Vec<RepoPath>> {
        let repos = self.snapshot();
        Ok(repos
            .locals()
            .flat_map(|repo| repo.find_by_checksum(checksum_type, value))
            .collect())
    }

    fn checksums_of(&self, path: &RepoPath) -> Result<Option<ChecksumPair>> {
        let Some(repo) = self.local_or_cached_repository_by_key(path.repo_key()) else {
            return Ok(None);
        };
        Ok(repo
            .item_info(path)
            .and_then(|info| info.file().and_then(|f| f.checksum_pair())))
    }
}
