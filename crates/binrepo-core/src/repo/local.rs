//! Local and cache repositories
//!
//! Both flavours store content and share one implementation; a cache
//! additionally records the remote it backs.

use crate::config::{CacheRepoDescriptor, LocalRepoDescriptor, RepoKind};
use crate::item::{
    ChecksumPolicy, FileInfo, FsItem, ItemInfo, ItemKind, Listable, Properties, Readable,
    Writable, mime_type_for,
};
use crate::lock::{LockManager, WriteGuard};
use crate::storage::RepoStorage;
use crate::{Error, Result};
use binrepo_fs::{ChecksumInfo, ChecksumType, ContentDigest, RepoPath, is_reserved, staging_path};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const SYSTEM_USER: &str = "_system";

/// Caller-supplied metadata for a content write.
///
/// Size and actual checksums are never taken from here; they come from the
/// persisted stream.
#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
    pub user: String,
    pub mime_type: Option<String>,
    /// Declared checksums, checked against the stream by the policy
    pub originals: BTreeMap<ChecksumType, String>,
    pub properties: Properties,
}

impl DeployRequest {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Self::default()
        }
    }

    pub fn with_checksum(mut self, checksum_type: ChecksumType, value: impl Into<String>) -> Self {
        self.originals.insert(checksum_type, value.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_property(mut self, name: &str, value: &str) -> Self {
        self.properties
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    fn validate(&self) -> Result<()> {
        for (checksum_type, value) in &self.originals {
            if !checksum_type.is_valid(value) {
                return Err(Error::InvalidChecksum {
                    checksum_type: checksum_type.to_string(),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

/// A repository that durably stores items.
pub struct LocalRepo {
    key: String,
    kind: RepoKind,
    description: String,
    remote: Option<String>,
    storage: Arc<RepoStorage>,
    locks: Arc<LockManager>,
    policy: Arc<dyn ChecksumPolicy>,
    blacked_out: AtomicBool,
}

impl fmt::Debug for LocalRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRepo")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("policy", &self.policy.name())
            .field("blacked_out", &self.is_blacked_out())
            .finish()
    }
}

impl LocalRepo {
    pub fn local(
        descriptor: &LocalRepoDescriptor,
        storage: Arc<RepoStorage>,
        locks: Arc<LockManager>,
    ) -> Self {
        Self {
            key: descriptor.key.clone(),
            kind: RepoKind::Local,
            description: descriptor.description.clone(),
            remote: None,
            storage,
            locks,
            policy: descriptor.checksum_policy.build(),
            blacked_out: AtomicBool::new(descriptor.blacked_out),
        }
    }

    pub fn cache(
        descriptor: &CacheRepoDescriptor,
        storage: Arc<RepoStorage>,
        locks: Arc<LockManager>,
    ) -> Self {
        Self {
            key: descriptor.key.clone(),
            kind: RepoKind::Cache,
            description: format!("cache of {}", descriptor.remote),
            remote: Some(descriptor.remote.clone()),
            storage,
            locks,
            policy: descriptor.checksum_policy.build(),
            blacked_out: AtomicBool::new(false),
        }
    }

    /// Replace the checksum policy.
    pub fn with_policy(mut self, policy: Arc<dyn ChecksumPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> RepoKind {
        self.kind
    }

    pub fn is_cache(&self) -> bool {
        self.kind == RepoKind::Cache
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Key of the remote a cache repository backs.
    pub fn remote_key(&self) -> Option<&str> {
        self.remote.as_deref()
    }

    pub fn policy(&self) -> &dyn ChecksumPolicy {
        self.policy.as_ref()
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn storage(&self) -> &RepoStorage {
        &self.storage
    }

    pub fn is_blacked_out(&self) -> bool {
        self.blacked_out.load(Ordering::Acquire)
    }

    pub fn black_out(&self, reason: &str) {
        tracing::error!(repo = %self.key, reason, "repository blacked out");
        self.blacked_out.store(true, Ordering::Release);
    }

    /// Fail with `BlackedOut` when the repository rejects traffic.
    pub fn ensure_available(&self) -> Result<()> {
        if self.is_blacked_out() {
            Err(Error::BlackedOut {
                key: self.key.clone(),
            })
        } else {
            Ok(())
        }
    }

    /// Build the item index from stored content, once per storage.
    ///
    /// Only files are recovered; folders are recreated along their paths.
    pub fn init(&self) -> Result<()> {
        if self.storage.is_indexed() {
            return Ok(());
        }
        let blobs = self.storage.blobs();
        let mut recovered = 0usize;
        for path in blobs.list()? {
            let mut content = blobs.read(&path)?;
            let digest = binrepo_fs::checksum::compute_checksums(&mut content)?;
            let repo_path = RepoPath::file(self.key.clone(), &path);
            if let Some(parent) = repo_path.parent() {
                self.ensure_folders(&parent, SYSTEM_USER)?;
            }
            let file = FileInfo {
                size: digest.size,
                mime_type: mime_type_for(repo_path.name()).to_string(),
                checksums: checksums_from(&digest, &BTreeMap::new()),
            };
            self.storage
                .index()
                .insert(ItemInfo::new_file(repo_path, SYSTEM_USER, file));
            recovered += 1;
        }
        self.storage.mark_indexed();
        tracing::debug!(repo = %self.key, recovered, "repository indexed");
        Ok(())
    }

    fn check_key(&self, path: &RepoPath) -> Result<()> {
        if path.repo_key() == self.key {
            Ok(())
        } else {
            Err(Error::invalid_path(
                path,
                format!("does not belong to repository '{}'", self.key),
            ))
        }
    }

    /// Snapshot of an item's metadata. The root folder always exists.
    pub fn item_info(&self, path: &RepoPath) -> Option<Arc<ItemInfo>> {
        if path.repo_key() != self.key || self.is_blacked_out() {
            return None;
        }
        if path.is_root() {
            return Some(Arc::new(ItemInfo::new_folder(
                RepoPath::root(self.key.clone()),
                SYSTEM_USER,
            )));
        }
        self.storage.index().get(path.path())
    }

    /// Non-blocking immutable view.
    pub fn get_immutable(&self, path: &RepoPath) -> Option<FsItem> {
        self.item_info(path)
            .map(|info| FsItem::immutable(info.as_ref().clone()))
    }

    /// Immutable view with storage-backed capabilities.
    pub fn handle(&self, path: &RepoPath) -> Option<ItemHandle<'_>> {
        self.get_immutable(path)
            .map(|item| ItemHandle { repo: self, item })
    }

    /// Write-locked mutable view of an existing item.
    ///
    /// Blocks up to the lock timeout, then fails with `LockTimeout`.
    pub fn get_mutable(&self, path: &RepoPath) -> Result<LockedItem<'_>> {
        self.ensure_available()?;
        self.check_key(path)?;
        let guard = self.locks.write(path)?;
        let item = self
            .get_immutable(path)
            .ok_or_else(|| Error::not_found(path))?;
        Ok(LockedItem {
            repo: self,
            item: item.to_mutable(),
            _guard: guard,
        })
    }

    pub fn item_exists(&self, path: &RepoPath) -> bool {
        path.repo_key() == self.key
            && !self.is_blacked_out()
            && self.storage.index().contains(path.path())
    }

    /// Direct children of a folder.
    pub fn children(&self, path: &RepoPath) -> Vec<Arc<ItemInfo>> {
        if path.repo_key() != self.key || self.is_blacked_out() {
            return Vec::new();
        }
        self.storage.index().children(path.path())
    }

    /// Every file below `path`, in path order; `path` itself when it is a file.
    pub fn descendant_files(&self, path: &RepoPath) -> Vec<Arc<ItemInfo>> {
        match self.item_info(path) {
            Some(info) if info.is_file() => vec![info],
            Some(_) => self
                .storage
                .index()
                .descendants(path.path())
                .into_iter()
                .filter(|i| i.is_file())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Folders below `path` that have no children.
    pub fn empty_descendant_folders(&self, path: &RepoPath) -> Vec<Arc<ItemInfo>> {
        self.storage
            .index()
            .descendants(path.path())
            .into_iter()
            .filter(|i| i.is_folder() && self.storage.index().children(i.repo_path.path()).is_empty())
            .collect()
    }

    pub fn read_content(&self, path: &RepoPath) -> Result<Box<dyn Read + Send>> {
        self.ensure_available()?;
        match self.item_info(path) {
            Some(info) if info.is_file() => Ok(self.storage.blobs().read(path.path())?),
            Some(_) => Err(Error::invalid_path(path, "is a folder")),
            None => Err(Error::not_found(path)),
        }
    }

    /// Store content at `path` under its write lock.
    pub fn deploy(
        &self,
        path: &RepoPath,
        content: &mut dyn Read,
        request: &DeployRequest,
    ) -> Result<Arc<ItemInfo>> {
        self.ensure_available()?;
        self.check_key(path)?;
        let _guards = self.locks.write_many_with_ancestors([path])?;
        self.store_content_locked(path, content, request)
    }

    /// Store content; the caller holds the write lock on `path` and read
    /// locks on its ancestors.
    ///
    /// The stream is digested while it is staged. The checksum policy runs
    /// before the staged blob is published; a rejection removes the staged
    /// blob and leaves no item behind.
    pub fn store_content_locked(
        &self,
        path: &RepoPath,
        content: &mut dyn Read,
        request: &DeployRequest,
    ) -> Result<Arc<ItemInfo>> {
        self.check_file_target(path)?;
        request.validate()?;

        let (digest, checksums) = self.stage_and_publish(path, content, &request.originals)?;

        let existing = self.storage.index().get(path.path());
        self.ensure_parent_folders(path, &request.user)?;

        let mime_type = request
            .mime_type
            .clone()
            .unwrap_or_else(|| mime_type_for(path.name()).to_string());
        let file = FileInfo {
            size: digest.size,
            mime_type,
            checksums,
        };
        let mut info = ItemInfo::new_file(path.clone(), &request.user, file);
        if let Some(existing) = existing {
            info.created = existing.created;
            info.created_by = existing.created_by.clone();
            info.properties = existing.properties.clone();
        }
        for (name, values) in &request.properties {
            info.properties.insert(name.clone(), values.clone());
        }

        tracing::debug!(path = %path, size = digest.size, sha1 = %digest.checksums.sha1, "stored");
        Ok(self.storage.index().insert(info))
    }

    /// Copy an item from another repository, keeping its metadata.
    ///
    /// The caller holds the write lock on `target` and read locks on its
    /// ancestors. Declared checksums
    /// travel with the item and are checked again against the copied stream.
    pub fn import_locked(
        &self,
        source: &ItemInfo,
        content: &mut dyn Read,
        target: &RepoPath,
        user: &str,
    ) -> Result<Arc<ItemInfo>> {
        let target = target.with_folder(false);
        self.check_file_target(&target)?;
        let source_file = source
            .file()
            .ok_or_else(|| Error::invalid_path(&source.repo_path, "is a folder"))?;

        let originals: BTreeMap<ChecksumType, String> = source_file
            .checksums
            .values()
            .filter_map(|c| Some((c.checksum_type, c.original.clone()?)))
            .collect();
        let (digest, checksums) = self.stage_and_publish(&target, content, &originals)?;

        self.ensure_parent_folders(&target, user)?;

        let mut info = source.relocated(target.clone());
        info.kind = ItemKind::File(FileInfo {
            size: digest.size,
            mime_type: source_file.mime_type.clone(),
            checksums,
        });
        info.modified_by = user.to_string();
        info.last_updated = Utc::now();
        Ok(self.storage.index().insert(info))
    }

    /// Copy a folder's own metadata (not its children) to `target`.
    pub fn import_folder(&self, source: &ItemInfo, target: &RepoPath, user: &str) -> Result<()> {
        let target = target.with_folder(true);
        self.ensure_folders(&target, user)?;
        if !target.is_root() {
            let mut info = source.relocated(target.clone());
            if let Some(existing) = self.storage.index().get(target.path()) {
                info.created = existing.created;
                info.created_by = existing.created_by.clone();
            }
            info.last_updated = Utc::now();
            self.storage.index().insert(info);
        }
        Ok(())
    }

    fn check_file_target(&self, path: &RepoPath) -> Result<()> {
        self.check_key(path)?;
        if path.is_root() {
            return Err(Error::invalid_path(path, "the repository root is a folder"));
        }
        if is_reserved(path.path()) {
            return Err(Error::invalid_path(path, "the name is reserved for storage bookkeeping"));
        }
        if self
            .storage
            .index()
            .get(path.path())
            .is_some_and(|i| i.is_folder())
        {
            return Err(Error::invalid_path(path, "a folder exists at this path"));
        }
        let index = self.storage.index();
        if let Some(ancestor) = path
            .ancestors()
            .filter(|a| !a.is_root())
            .find(|a| index.get(a.path()).is_some_and(|i| i.is_file()))
        {
            return Err(Error::invalid_path(&ancestor, "a file exists at this path"));
        }
        Ok(())
    }

    /// Create the folders above a just-published blob, unpublishing it on failure.
    fn ensure_parent_folders(&self, path: &RepoPath, user: &str) -> Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        self.ensure_folders(&parent, user).inspect_err(|_| {
            if let Err(e) = self.storage.blobs().delete(path.path()) {
                tracing::warn!(path = %path, error = %e, "could not remove orphaned blob");
            }
        })
    }

    fn stage_and_publish(
        &self,
        path: &RepoPath,
        content: &mut dyn Read,
        originals: &BTreeMap<ChecksumType, String>,
    ) -> Result<(ContentDigest, BTreeMap<ChecksumType, ChecksumInfo>)> {
        let blobs = self.storage.blobs();
        let staged = staging_path();
        let digest = match blobs.write(&staged, content) {
            Ok(digest) => digest,
            Err(e) => {
                let _ = blobs.delete(&staged);
                return Err(e.into());
            }
        };

        let mut checksums = checksums_from(&digest, originals);
        if let Err(message) = self.policy.process(path, &mut checksums) {
            blobs.delete(&staged)?;
            tracing::warn!(path = %path, policy = self.policy.name(), %message, "write rejected");
            return Err(Error::ChecksumPolicyViolation {
                path: path.to_string(),
                policy: self.policy.name().to_string(),
                message,
            });
        }

        if let Err(e) = blobs.rename(&staged, path.path()) {
            let _ = blobs.delete(&staged);
            return Err(e.into());
        }
        Ok((digest, checksums))
    }

    /// Create every missing folder from the root down to `folder`.
    pub fn ensure_folders(&self, folder: &RepoPath, user: &str) -> Result<()> {
        let mut chain: Vec<RepoPath> = folder.ancestors().collect();
        chain.reverse();
        chain.push(folder.with_folder(true));

        let index = self.storage.index();
        for path in chain.into_iter().filter(|p| !p.is_root()) {
            match index.get(path.path()) {
                Some(existing) if existing.is_file() => {
                    return Err(Error::invalid_path(&path, "a file exists at this path"));
                }
                Some(_) => {}
                None => {
                    index.insert(ItemInfo::new_folder(path, user));
                }
            }
        }
        Ok(())
    }

    /// Remove an item and, for folders, everything below it.
    pub fn undeploy(&self, path: &RepoPath) -> Result<Vec<Arc<ItemInfo>>> {
        self.ensure_available()?;
        self.check_key(path)?;
        let _guard = self.locks.write(path)?;
        if !self.item_exists(path) {
            return Err(Error::not_found(path));
        }
        self.delete_locked(path)
    }

    /// Delete under a lock the caller holds.
    pub fn delete_locked(&self, path: &RepoPath) -> Result<Vec<Arc<ItemInfo>>> {
        if path.is_root() {
            return Err(Error::invalid_path(path, "the repository root cannot be deleted"));
        }
        self.storage.blobs().delete(path.path())?;
        let removed = self.storage.index().remove_subtree(path.path());
        tracing::debug!(path = %path, removed = removed.len(), "deleted");
        Ok(removed)
    }

    /// Commit metadata; the caller holds the write lock.
    pub fn save_info(&self, info: ItemInfo) -> Arc<ItemInfo> {
        self.storage.index().insert(info)
    }

    /// Files whose computed checksum matches.
    pub fn find_by_checksum(&self, checksum_type: ChecksumType, value: &str) -> Vec<RepoPath> {
        if self.is_blacked_out() {
            return Vec::new();
        }
        self.storage.index().find_by_checksum(checksum_type, value)
    }

    /// Delete all content and metadata of this repository.
    pub fn destroy(&self) -> Result<()> {
        tracing::info!(repo = %self.key, "destroying repository content");
        self.storage.wipe()
    }
}

fn checksums_from(
    digest: &ContentDigest,
    originals: &BTreeMap<ChecksumType, String>,
) -> BTreeMap<ChecksumType, ChecksumInfo> {
    ChecksumType::ALL
        .iter()
        .map(|&checksum_type| {
            let info = ChecksumInfo::new(
                checksum_type,
                originals.get(&checksum_type).cloned(),
                Some(digest.checksums.get(checksum_type).to_string()),
            );
            (checksum_type, info)
        })
        .collect()
}

/// Immutable item view bound to its repository.
#[derive(Debug)]
pub struct ItemHandle<'a> {
    repo: &'a LocalRepo,
    item: FsItem,
}

impl Deref for ItemHandle<'_> {
    type Target = FsItem;

    fn deref(&self) -> &FsItem {
        &self.item
    }
}

impl Readable for ItemHandle<'_> {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        self.repo.read_content(self.item.repo_path())
    }
}

impl Listable for ItemHandle<'_> {
    fn list_children(&self) -> Result<Vec<Arc<ItemInfo>>> {
        Ok(self.repo.children(self.item.repo_path()))
    }
}

/// A mutable item holding its path's write lock.
///
/// Changes stay private until [`LockedItem::save`]; dropping the value
/// discards them and releases the lock.
pub struct LockedItem<'a> {
    repo: &'a LocalRepo,
    item: FsItem,
    _guard: WriteGuard<'a>,
}

impl fmt::Debug for LockedItem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedItem")
            .field("item", &self.item)
            .finish_non_exhaustive()
    }
}

impl Deref for LockedItem<'_> {
    type Target = FsItem;

    fn deref(&self) -> &FsItem {
        &self.item
    }
}

impl DerefMut for LockedItem<'_> {
    fn deref_mut(&mut self) -> &mut FsItem {
        &mut self.item
    }
}

impl LockedItem<'_> {
    /// Commit the mutable copy and return a fresh immutable view.
    pub fn save(mut self) -> Result<FsItem> {
        let path = self.item.repo_path().clone();
        if path.is_root() {
            return Err(Error::invalid_path(&path, "the repository root carries no metadata"));
        }
        if self.item.is_deleted() || !self.repo.item_exists(&path) {
            return Err(Error::ItemDeleted {
                path: path.to_string(),
            });
        }
        self.item.touch()?;
        let saved = self.repo.save_info(self.item.clone().into_info());
        tracing::debug!(path = %path, "item saved");
        Ok(FsItem::immutable(saved.as_ref().clone()))
    }

    /// Delete the item (and its subtree) while keeping the lock.
    pub fn delete(&mut self) -> Result<()> {
        if self.item.is_deleted() {
            return Ok(());
        }
        self.repo.delete_locked(self.item.repo_path())?;
        self.item.mark_deleted();
        Ok(())
    }

    /// Drop pending changes and release the lock.
    pub fn discard(self) {}
}

impl Readable for LockedItem<'_> {
    fn open(&self) -> Result<Box<dyn Read + Send>> {
        if self.item.is_deleted() {
            return Err(Error::ItemDeleted {
                path: self.item.repo_path().to_string(),
            });
        }
        self.repo.read_content(self.item.repo_path())
    }
}

impl Writable for LockedItem<'_> {
    fn write_content(&mut self, content: &mut dyn Read) -> Result<ItemInfo> {
        if self.item.is_deleted() {
            return Err(Error::ItemDeleted {
                path: self.item.repo_path().to_string(),
            });
        }
        let request = DeployRequest {
            user: self.item.info().modified_by.clone(),
            mime_type: self.item.file_info().map(|f| f.mime_type.clone()),
            originals: BTreeMap::new(),
            properties: Properties::new(),
        };
        let stored = self
            .repo
            .store_content_locked(self.item.repo_path(), content, &request)?;
        self.item = FsItem::immutable(stored.as_ref().clone()).to_mutable();
        Ok(stored.as_ref().clone())
    }
}

impl Listable for LockedItem<'_> {
    fn list_children(&self) -> Result<Vec<Arc<ItemInfo>>> {
        Ok(self.repo.children(self.item.repo_path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{FailOnMismatch, IgnoreAndGenerate};
    use std::time::Duration;

    const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";
    const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

    fn repo() -> LocalRepo {
        LocalRepo::local(
            &LocalRepoDescriptor::new("libs"),
            Arc::new(RepoStorage::in_memory()),
            Arc::new(LockManager::new(Duration::from_millis(100))),
        )
    }

    fn deploy(repo: &LocalRepo, path: &str, request: &DeployRequest) -> Result<Arc<ItemInfo>> {
        repo.deploy(
            &RepoPath::file("libs", path),
            &mut "hello world".as_bytes(),
            request,
        )
    }

    #[test]
    fn deploy_computes_size_and_checksums_and_creates_parents() {
        let repo = repo();
        let info = deploy(&repo, "com/x/1.0/x.jar", &DeployRequest::new("alice")).unwrap();
        let file = info.file().unwrap();
        assert_eq!(file.size, 11);
        assert_eq!(file.sha1(), Some(HELLO_SHA1));
        assert_eq!(file.md5(), Some(HELLO_MD5));
        assert_eq!(file.mime_type, "application/java-archive");
        assert!(repo.item_exists(&RepoPath::folder("libs", "com/x/1.0")));
        assert!(repo.item_exists(&RepoPath::folder("libs", "com")));
    }

    #[test]
    fn rejected_write_leaves_nothing_behind() {
        let repo = repo().with_policy(Arc::new(FailOnMismatch));
        let request = DeployRequest::new("alice").with_checksum(ChecksumType::Sha1, "0".repeat(40));
        let err = deploy(&repo, "a/b.jar", &request).unwrap_err();

        assert_eq!(err.status_code(), 409);
        assert!(!repo.item_exists(&RepoPath::file("libs", "a/b.jar")));
        assert!(!repo.item_exists(&RepoPath::folder("libs", "a")));
        assert!(repo.storage().blobs().list().unwrap().is_empty());
    }

    #[test]
    fn ignore_and_generate_overwrites_declared_value() {
        let repo = repo().with_policy(Arc::new(IgnoreAndGenerate));
        let request = DeployRequest::new("alice").with_checksum(ChecksumType::Md5, "0".repeat(32));
        let info = deploy(&repo, "b.jar", &request).unwrap();
        let md5 = info.file().unwrap().checksum(ChecksumType::Md5).unwrap();
        assert_eq!(md5.original.as_deref(), Some(HELLO_MD5));
    }

    #[test]
    fn overwrite_keeps_creation_metadata() {
        let repo = repo();
        let first = deploy(&repo, "b.jar", &DeployRequest::new("alice")).unwrap();
        let second = deploy(&repo, "b.jar", &DeployRequest::new("bob")).unwrap();
        assert_eq!(second.created, first.created);
        assert_eq!(second.created_by, "alice");
        assert_eq!(second.modified_by, "bob");
    }

    #[test]
    fn file_cannot_be_written_below_a_file() {
        let repo = repo();
        deploy(&repo, "a", &DeployRequest::new("alice")).unwrap();
        let blobs_before = repo.storage().blobs().list().unwrap();

        let err = deploy(&repo, "a/b.jar", &DeployRequest::new("alice")).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("libs:a"));
        assert_eq!(repo.storage().blobs().list().unwrap(), blobs_before);
        assert!(!repo.item_exists(&RepoPath::file("libs", "a/b.jar")));
    }

    #[test]
    fn import_below_a_file_publishes_nothing() {
        let repo = repo();
        deploy(&repo, "a", &DeployRequest::new("alice")).unwrap();
        let source = deploy(&repo, "b.jar", &DeployRequest::new("alice")).unwrap();
        let blobs_before = repo.storage().blobs().list().unwrap();

        let target = RepoPath::file("libs", "a/c.jar");
        let err = repo
            .import_locked(&source, &mut "hello world".as_bytes(), &target, "bob")
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(repo.storage().blobs().list().unwrap(), blobs_before);
        assert!(!repo.item_exists(&target));
    }

    #[test]
    fn save_commits_and_discard_drops_changes() {
        let repo = repo();
        let path = RepoPath::file("libs", "b.jar");
        deploy(&repo, "b.jar", &DeployRequest::new("alice")).unwrap();

        let mut locked = repo.get_mutable(&path).unwrap();
        locked.set_property("build", vec!["42".into()]).unwrap();
        locked.discard();
        assert!(repo.item_info(&path).unwrap().properties.is_empty());

        let mut locked = repo.get_mutable(&path).unwrap();
        locked.set_property("build", vec!["42".into()]).unwrap();
        let saved = locked.save().unwrap();
        assert!(!saved.is_mutable());
        assert_eq!(
            repo.item_info(&path).unwrap().property("build"),
            Some(&["42".to_string()][..])
        );
        assert!(!repo.locks().is_write_locked(&path));
    }

    #[test]
    fn saving_a_deleted_item_fails() {
        let repo = repo();
        let path = RepoPath::file("libs", "b.jar");
        deploy(&repo, "b.jar", &DeployRequest::new("alice")).unwrap();

        let mut locked = repo.get_mutable(&path).unwrap();
        locked.delete().unwrap();
        let err = locked.save().unwrap_err();
        assert!(matches!(err, Error::ItemDeleted { .. }));
        assert!(!repo.item_exists(&path));
    }

    #[test]
    fn init_rebuilds_index_from_blobs() {
        let storage = Arc::new(RepoStorage::in_memory());
        storage
            .blobs()
            .write("org/y/y.pom", &mut "hello world".as_bytes())
            .unwrap();
        let repo = LocalRepo::local(
            &LocalRepoDescriptor::new("libs"),
            storage,
            Arc::new(LockManager::default()),
        );
        repo.init().unwrap();

        let info = repo.item_info(&RepoPath::file("libs", "org/y/y.pom")).unwrap();
        assert_eq!(info.file().unwrap().sha1(), Some(HELLO_SHA1));
        assert!(repo.item_exists(&RepoPath::folder("libs", "org/y")));
    }

    #[test]
    fn blacked_out_repository_rejects_traffic() {
        let repo = repo();
        repo.black_out("test");
        let err = deploy(&repo, "b.jar", &DeployRequest::new("alice")).unwrap_err();
        assert_eq!(err.status_code(), 503);
    }
}
