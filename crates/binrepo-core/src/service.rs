//! Repository service facade
//!
//! [`RepositoryService`] is the entry point an outer layer (REST, CLI)
//! talks to. It owns the registry and the background workers and checks
//! permissions before delegating to the repositories. All collaborators
//! are injected through [`RepositoryServiceBuilder`].

use crate::cancel::StopSignal;
use crate::config::CentralConfig;
use crate::derive::{ChecksumDerivationCache, ChecksumSearch};
use crate::item::{FsItem, ItemInfo};
use crate::lock::LockManager;
use crate::mover::{MetadataCalculator, MetadataRecalculator, MoveOptions, Mover, MoverConfig, VersionIndexCalculator};
use crate::registry::{ReloadReport, RepoRegistry};
use crate::repo::{ChildItem, DeployRequest, LocalRepo, Repo, StoringRepoRef};
use crate::security::{AccessControl, Action, AllowAll, AuditSink, Authorizer, TracingAuditSink};
use crate::status::MultiStatus;
use crate::storage::{MemoryStorageProvider, StorageProvider};
use crate::{Error, Result};
use binrepo_fs::{ChecksumPair, ChecksumType, RepoPath};
use std::fmt;
use std::io::Read;
use std::sync::Arc;

/// Assembles a [`RepositoryService`].
///
/// Anything not supplied falls back to an in-memory, allow-all setup that
/// logs audit records through `tracing`.
pub struct RepositoryServiceBuilder {
    config: CentralConfig,
    storage: Option<Arc<dyn StorageProvider>>,
    access: Option<Arc<dyn AccessControl>>,
    audit: Option<Arc<dyn AuditSink>>,
    calculator: Option<Arc<dyn MetadataCalculator>>,
}

impl RepositoryServiceBuilder {
    pub fn new(config: CentralConfig) -> Self {
        Self {
            config,
            storage: None,
            access: None,
            audit: None,
            calculator: None,
        }
    }

    pub fn storage(mut self, storage: Arc<dyn StorageProvider>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn access_control(mut self, access: Arc<dyn AccessControl>) -> Self {
        self.access = Some(access);
        self
    }

    pub fn audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn metadata_calculator(mut self, calculator: Arc<dyn MetadataCalculator>) -> Self {
        self.calculator = Some(calculator);
        self
    }

    /// Build the registry from the configuration and start the workers.
    pub fn build(self) -> Result<RepositoryService> {
        let settings = &self.config.storage;
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorageProvider::new()));
        let locks = Arc::new(LockManager::new(settings.lock_timeout()));
        let registry = Arc::new(RepoRegistry::new(storage, locks));
        let report = registry.rebuild_repositories(&self.config)?;
        if !report.blacked_out.is_empty() {
            tracing::warn!(repos = ?report.blacked_out, "repositories blacked out at startup");
        }

        let search: Arc<dyn ChecksumSearch> = registry.clone();
        let derivations = ChecksumDerivationCache::new(
            search,
            settings.derivation_ttl(),
            settings.derivation_capacity,
            settings.worker_threads,
        );
        let calculator = self
            .calculator
            .unwrap_or_else(|| Arc::new(VersionIndexCalculator::new(Arc::clone(&registry))));
        let recalculator = Arc::new(MetadataRecalculator::new(calculator, settings.worker_threads));

        let authorizer = Authorizer::new(
            self.access.unwrap_or_else(|| Arc::new(AllowAll)),
            self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink)),
        );

        tracing::info!(repos = registry.keys().len(), "repository service started");
        Ok(RepositoryService {
            registry,
            authorizer,
            derivations,
            recalculator,
        })
    }
}

/// Permission-checked operations over every configured repository.
pub struct RepositoryService {
    registry: Arc<RepoRegistry>,
    authorizer: Authorizer,
    derivations: ChecksumDerivationCache,
    recalculator: Arc<MetadataRecalculator>,
}

impl fmt::Debug for RepositoryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryService")
            .field("registry", &self.registry)
            .field("authorizer", &self.authorizer)
            .finish_non_exhaustive()
    }
}

impl RepositoryService {
    pub fn builder(config: CentralConfig) -> RepositoryServiceBuilder {
        RepositoryServiceBuilder::new(config)
    }

    pub fn registry(&self) -> &Arc<RepoRegistry> {
        &self.registry
    }

    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    pub fn derivation_cache(&self) -> &ChecksumDerivationCache {
        &self.derivations
    }

    pub fn recalculator(&self) -> &MetadataRecalculator {
        &self.recalculator
    }

    /// The repository answering queries for `path`.
    pub fn resolve(&self, path: &RepoPath) -> Result<StoringRepoRef> {
        let repo = self
            .registry
            .storing_repository_by_key(path.repo_key())
            .ok_or_else(|| Error::not_found(format!("repository '{}'", path.repo_key())))?;
        repo.ensure_available()?;
        Ok(repo)
    }

    /// A repository that accepts writes: local or cache.
    fn writable(&self, path: &RepoPath) -> Result<Arc<LocalRepo>> {
        match self.registry.repository_by_key(path.repo_key()) {
            Some(Repo::Local(repo)) | Some(Repo::Cache(repo)) => {
                repo.ensure_available()?;
                Ok(repo)
            }
            Some(other) => Err(Error::invalid_path(
                path,
                format!("{} repository '{}' does not store content", other.kind(), other.key()),
            )),
            None => Err(Error::not_found(format!("repository '{}'", path.repo_key()))),
        }
    }

    pub fn with_read_lock<T>(&self, path: &RepoPath, f: impl FnOnce() -> T) -> Result<T> {
        self.registry.locks().with_read_lock(path, f)
    }

    pub fn with_write_lock<T>(&self, path: &RepoPath, f: impl FnOnce() -> T) -> Result<T> {
        self.registry.locks().with_write_lock(path, f)
    }

    /// Store content at `path` as the current user.
    ///
    /// Overwriting an existing file additionally requires delete permission.
    pub fn deploy(
        &self,
        path: &RepoPath,
        content: &mut dyn Read,
        request: DeployRequest,
    ) -> Result<Arc<ItemInfo>> {
        let repo = self.writable(path)?;
        self.authorizer.require(Action::Deploy, path)?;
        let request = DeployRequest {
            user: self.authorizer.user(),
            ..request
        };

        let _guards = self.registry.locks().write_many_with_ancestors([path])?;
        if repo.item_info(path).is_some_and(|info| info.is_file()) {
            self.authorizer.require(Action::Delete, path)?;
        }
        let info = repo.store_content_locked(path, content, &request)?;
        tracing::info!(path = %path, user = %request.user, "deployed");
        Ok(info)
    }

    pub fn read(&self, path: &RepoPath) -> Result<Box<dyn Read + Send>> {
        let repo = self.resolve(path)?;
        self.authorizer.require(Action::Read, path)?;
        repo.read(&self.authorizer, path)
    }

    /// Metadata of `path`; through a virtual, of the first copy the caller may see.
    pub fn item_info(&self, path: &RepoPath) -> Result<Arc<ItemInfo>> {
        let repo = self.resolve(path)?;
        let (_, info) = repo
            .resolve_visible(&self.authorizer, path)?
            .ok_or_else(|| Error::not_found(path))?;
        if info.is_folder() {
            if !self.authorizer.can_list(&path.with_folder(true)) {
                return Err(Error::not_found(path));
            }
        } else {
            self.authorizer.require(Action::Read, path)?;
        }
        Ok(info)
    }

    pub fn item_exists(&self, path: &RepoPath) -> bool {
        self.resolve(path).is_ok_and(|repo| repo.item_exists(path))
    }

    /// Children of a folder visible to the current user.
    pub fn list_children(&self, path: &RepoPath, include_parent: bool) -> Result<Vec<ChildItem>> {
        let repo = self.resolve(path)?;
        repo.children(&self.authorizer, path, include_parent)
    }

    /// Delete a file, or a folder with everything below it.
    pub fn undeploy(&self, path: &RepoPath) -> Result<Vec<Arc<ItemInfo>>> {
        let repo = self.writable(path)?;
        self.authorizer.require(Action::Delete, path)?;
        let removed = repo.undeploy(path)?;
        tracing::info!(path = %path, removed = removed.len(), "undeployed");
        Ok(removed)
    }

    pub fn set_property(&self, path: &RepoPath, name: &str, values: Vec<String>) -> Result<FsItem> {
        self.annotate(path, |item| item.set_property(name, values))
    }

    pub fn remove_property(&self, path: &RepoPath, name: &str) -> Result<FsItem> {
        self.annotate(path, |item| item.remove_property(name).map(|_| ()))
    }

    fn annotate(&self, path: &RepoPath, change: impl FnOnce(&mut FsItem) -> Result<()>) -> Result<FsItem> {
        let repo = self.writable(path)?;
        self.authorizer.require(Action::Annotate, path)?;
        let mut item = repo.get_mutable(path)?;
        change(&mut *item)?;
        item.set_modified_by(&self.authorizer.user())?;
        item.save()
    }

    fn mover(&self) -> Mover<'_> {
        Mover::new(&self.registry, &self.authorizer).with_recalculator(&self.recalculator)
    }

    pub fn move_or_copy(&self, config: &MoverConfig) -> MultiStatus {
        self.move_or_copy_with_stop(config, &StopSignal::new())
    }

    pub fn move_or_copy_with_stop(&self, config: &MoverConfig, stop: &StopSignal) -> MultiStatus {
        self.mover().move_or_copy(config, stop)
    }

    pub fn move_or_copy_set(&self, paths: &[RepoPath], target_repo: &str, options: MoveOptions) -> MultiStatus {
        self.move_or_copy_set_with_stop(paths, target_repo, options, &StopSignal::new())
    }

    pub fn move_or_copy_set_with_stop(
        &self,
        paths: &[RepoPath],
        target_repo: &str,
        options: MoveOptions,
        stop: &StopSignal,
    ) -> MultiStatus {
        self.mover().move_or_copy_set(paths, target_repo, options, stop)
    }

    pub fn derive_missing_checksum(
        &self,
        known_type: ChecksumType,
        known_value: &str,
    ) -> Result<Option<ChecksumPair>> {
        self.derivations.derive_missing(known_type, known_value)
    }

    /// Create `target` from already stored content with a known checksum.
    ///
    /// The first readable file carrying the checksum is copied, metadata
    /// included.
    pub fn deploy_by_checksum(
        &self,
        target: &RepoPath,
        checksum_type: ChecksumType,
        value: &str,
    ) -> Result<Arc<ItemInfo>> {
        if !checksum_type.is_valid(value) {
            return Err(Error::InvalidChecksum {
                checksum_type: checksum_type.to_string(),
                value: value.to_string(),
            });
        }
        let target = target.with_folder(false);
        let repo = self.writable(&target)?;
        self.authorizer.require(Action::Deploy, &target)?;

        let value = value.to_ascii_lowercase();
        let candidate = self
            .registry
            .find_by_checksum(checksum_type, &value)?
            .into_iter()
            .find(|p| self.authorizer.permits(Action::Read, p))
            .ok_or_else(|| Error::not_found(format!("content with {checksum_type} {value}")))?;
        let source = self
            .registry
            .local_or_cached_repository_by_key(candidate.repo_key())
            .ok_or_else(|| Error::not_found(&candidate))?;

        let _guards = self
            .registry
            .locks()
            .write_many_with_ancestors([&candidate, &target])?;
        let info = source
            .item_info(&candidate)
            .ok_or_else(|| Error::not_found(&candidate))?;
        if candidate == target {
            return Ok(info);
        }
        if repo.item_info(&target).is_some_and(|existing| existing.is_file()) {
            self.authorizer.require(Action::Delete, &target)?;
        }
        let mut content = source.read_content(&candidate)?;
        let stored = repo.import_locked(&info, &mut content, &target, &self.authorizer.user())?;
        tracing::info!(source = %candidate, target = %target, "deployed by checksum");
        Ok(stored)
    }

    /// Apply a new configuration.
    ///
    /// Derivation results are dropped since the content they point at may
    /// be gone.
    pub fn reload(&self, config: &CentralConfig) -> Result<ReloadReport> {
        let report = self.registry.rebuild_repositories(config)?;
        self.derivations.clear();
        tracing::info!(
            added = report.added.len(),
            removed = report.removed.len(),
            blacked_out = report.blacked_out.len(),
            "configuration reloaded"
        );
        Ok(report)
    }

    /// Wait for pending metadata work and stop background threads.
    pub fn shutdown(&self) {
        self.recalculator.wait_idle();
        self.registry.shutdown();
    }
}
