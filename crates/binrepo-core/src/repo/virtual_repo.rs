//! Virtual repositories
//!
//! A virtual repository presents an ordered union of other repositories as
//! one namespace. Members are expanded to storing repositories at query
//! time: remotes through their cache, nested virtuals recursively.

use super::ChildItem;
use crate::config::VirtualRepoDescriptor;
use crate::item::ItemInfo;
use crate::registry::Repositories;
use crate::repo::LocalRepo;
use crate::security::{Action, Authorizer};
use crate::{Error, Result};
use binrepo_fs::RepoPath;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub struct VirtualRepo {
    descriptor: VirtualRepoDescriptor,
    members: RwLock<Vec<String>>,
    blacked_out: AtomicBool,
}

impl VirtualRepo {
    pub fn new(descriptor: &VirtualRepoDescriptor) -> Self {
        Self {
            descriptor: descriptor.clone(),
            members: RwLock::new(Vec::new()),
            blacked_out: AtomicBool::new(descriptor.blacked_out),
        }
    }

    pub fn key(&self) -> &str {
        &self.descriptor.key
    }

    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    pub fn is_blacked_out(&self) -> bool {
        self.blacked_out.load(Ordering::Acquire)
    }

    pub fn black_out(&self, reason: &str) {
        tracing::error!(repo = %self.descriptor.key, reason, "repository blacked out");
        self.blacked_out.store(true, Ordering::Release);
    }

    pub fn ensure_available(&self) -> Result<()> {
        if self.is_blacked_out() {
            Err(Error::BlackedOut {
                key: self.descriptor.key.clone(),
            })
        } else {
            Ok(())
        }
    }

    /// Member keys that resolved at initialization, in declared order.
    pub fn members(&self) -> Vec<String> {
        self.members.read().clone()
    }

    /// Bind the declared members against the registry being built.
    ///
    /// Unknown members are skipped with a warning.
    pub fn init(&self, repos: &Repositories) -> Result<()> {
        let mut members = Vec::with_capacity(self.descriptor.repositories.len());
        for key in &self.descriptor.repositories {
            if repos.contains(key) {
                members.push(key.clone());
            } else {
                tracing::warn!(
                    repo = %self.descriptor.key,
                    member = %key,
                    "virtual repository member does not exist; skipping"
                );
            }
        }
        *self.members.write() = members;
        Ok(())
    }

    /// Storing repositories behind this virtual, deduplicated, first wins.
    ///
    /// A membership cycle resolves to nothing.
    pub fn resolved_repositories(&self, repos: &Repositories) -> Vec<Arc<LocalRepo>> {
        let mut resolved = Vec::new();
        let mut seen = HashSet::new();
        let mut chain = vec![self.descriptor.key.clone()];
        if expand(repos, &self.members(), &mut chain, &mut seen, &mut resolved) {
            resolved
        } else {
            Vec::new()
        }
    }

    /// First member holding `path`.
    pub fn resolve_item(
        &self,
        repos: &Repositories,
        path: &RepoPath,
    ) -> Option<(Arc<LocalRepo>, Arc<ItemInfo>)> {
        if self.is_blacked_out() {
            return None;
        }
        self.resolved_repositories(repos).into_iter().find_map(|repo| {
            let info = repo.item_info(&path.with_repo(repo.key()))?;
            Some((repo, info))
        })
    }

    /// First member holding `path` whose copy the caller may see.
    ///
    /// Members whose copy is hidden from the caller are passed over. When
    /// only hidden copies exist, a file is refused with an audited denial
    /// and a folder resolves to nothing.
    pub fn resolve_visible(
        &self,
        repos: &Repositories,
        authorizer: &Authorizer,
        path: &RepoPath,
    ) -> Result<Option<(Arc<LocalRepo>, Arc<ItemInfo>)>> {
        self.ensure_available()?;
        let mut hidden = None;
        for repo in self.resolved_repositories(repos) {
            let Some(info) = repo.item_info(&path.with_repo(repo.key())) else {
                continue;
            };
            if authorizer.can_list(&info.repo_path) {
                return Ok(Some((repo, info)));
            }
            hidden.get_or_insert((repo, info));
        }
        match hidden {
            Some((repo, info)) if info.is_file() => {
                authorizer.require(Action::Read, &info.repo_path)?;
                Ok(Some((repo, info)))
            }
            _ => Ok(None),
        }
    }

    pub fn item_exists(&self, repos: &Repositories, path: &RepoPath) -> bool {
        (path.is_root() && !self.is_blacked_out()) || self.resolve_item(repos, path).is_some()
    }

    /// Open the content of the first member holding a readable copy of `path`.
    pub fn read(
        &self,
        repos: &Repositories,
        authorizer: &Authorizer,
        path: &RepoPath,
    ) -> Result<Box<dyn Read + Send>> {
        let (repo, info) = self
            .resolve_visible(repos, authorizer, path)?
            .ok_or_else(|| Error::not_found(path))?;
        repo.read_content(&info.repo_path)
    }

    /// Union of the children of `path` across all members.
    ///
    /// Entries the caller may not see are left out, then names are
    /// deduplicated with the first-listed member winning. With `include_parent`, a `..`
    /// entry leads a non-root listing.
    pub fn get_children(
        &self,
        repos: &Repositories,
        authorizer: &Authorizer,
        path: &RepoPath,
        include_parent: bool,
    ) -> Result<Vec<ChildItem>> {
        self.ensure_available()?;
        let folder = path.with_folder(true);
        let members = self.resolved_repositories(repos);

        let mut found = path.is_root();
        let mut names = HashSet::new();
        let mut children = Vec::new();
        for repo in &members {
            let backing = folder.with_repo(repo.key());
            match repo.item_info(&backing) {
                Some(info) if info.is_folder() => found = true,
                _ => continue,
            }
            for child in repo.children(&backing) {
                if !authorizer.can_list(&child.repo_path) {
                    continue;
                }
                if !names.insert(child.name().to_string()) {
                    continue;
                }
                children.push(ChildItem::of(&folder, child));
            }
        }
        if !found {
            return Err(Error::not_found(path));
        }

        children.sort_by(|a, b| a.name.cmp(&b.name));
        if include_parent && !folder.is_root() {
            if let Some(parent) = folder.parent() {
                children.insert(0, ChildItem::parent_link(parent));
            }
        }
        Ok(children)
    }
}

fn expand(
    repos: &Repositories,
    members: &[String],
    chain: &mut Vec<String>,
    seen: &mut HashSet<String>,
    resolved: &mut Vec<Arc<LocalRepo>>,
) -> bool {
    for key in members {
        if chain.contains(key) {
            tracing::warn!(chain = ?chain, member = %key, "virtual repository cycle detected");
            return false;
        }
        if let Some(nested) = repos.virtual_repo(key) {
            if nested.is_blacked_out() {
                continue;
            }
            chain.push(key.clone());
            let ok = expand(repos, &nested.members(), chain, seen, resolved);
            chain.pop();
            if !ok {
                return false;
            }
            continue;
        }

        let storing_key = match repos.remote(key) {
            Some(remote) => remote.cache_key(),
            None => key.clone(),
        };
        if let Some(local) = repos.local(&storing_key) {
            if !local.is_blacked_out() && seen.insert(storing_key) {
                resolved.push(Arc::clone(local));
            }
        }
    }
    true
}
