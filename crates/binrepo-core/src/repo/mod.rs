//! Repository instances
//!
//! [`Repo`] is the tagged handle the registry hands out. Path queries go
//! through [`StoringRepoRef`], which answers them for a local or cache
//! repository directly and for a virtual repository through its members.

mod local;
mod remote;
mod virtual_repo;

pub use local::{DeployRequest, ItemHandle, LocalRepo, LockedItem};
pub use remote::RemoteRepo;
pub use virtual_repo::VirtualRepo;

pub use crate::config::RepoKind;

use crate::item::ItemInfo;
use crate::registry::Repositories;
use crate::security::Authorizer;
use crate::{Error, Result};
use binrepo_fs::RepoPath;
use std::io::Read;
use std::sync::Arc;

/// A registered repository of any kind.
#[derive(Debug, Clone)]
pub enum Repo {
    Local(Arc<LocalRepo>),
    Cache(Arc<LocalRepo>),
    Remote(Arc<RemoteRepo>),
    Virtual(Arc<VirtualRepo>),
}

impl Repo {
    pub fn key(&self) -> &str {
        match self {
            Self::Local(r) | Self::Cache(r) => r.key(),
            Self::Remote(r) => r.key(),
            Self::Virtual(r) => r.key(),
        }
    }

    pub fn kind(&self) -> RepoKind {
        match self {
            Self::Local(_) => RepoKind::Local,
            Self::Cache(_) => RepoKind::Cache,
            Self::Remote(_) => RepoKind::Remote,
            Self::Virtual(_) => RepoKind::Virtual,
        }
    }

    pub fn is_blacked_out(&self) -> bool {
        match self {
            Self::Local(r) | Self::Cache(r) => r.is_blacked_out(),
            Self::Remote(r) => r.is_blacked_out(),
            Self::Virtual(r) => r.is_blacked_out(),
        }
    }

    /// The storing repository, for local and cache repositories.
    pub fn as_local(&self) -> Option<&Arc<LocalRepo>> {
        match self {
            Self::Local(r) | Self::Cache(r) => Some(r),
            _ => None,
        }
    }
}

/// One entry of a folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildItem {
    pub name: String,
    /// Address in the listed repository
    pub repo_path: RepoPath,
    /// Address in the repository that stores the item
    pub backing_path: RepoPath,
    pub is_folder: bool,
    /// Absent for the synthetic `..` entry
    pub info: Option<Arc<ItemInfo>>,
}

impl ChildItem {
    pub const PARENT_NAME: &'static str = "..";

    fn of(listed: &RepoPath, info: Arc<ItemInfo>) -> Self {
        Self {
            name: info.name().to_string(),
            repo_path: listed.child(info.name(), info.is_folder()),
            backing_path: info.repo_path.clone(),
            is_folder: info.is_folder(),
            info: Some(info),
        }
    }

    fn parent_link(parent: RepoPath) -> Self {
        Self {
            name: Self::PARENT_NAME.to_string(),
            repo_path: parent.clone(),
            backing_path: parent,
            is_folder: true,
            info: None,
        }
    }

    pub fn is_parent_link(&self) -> bool {
        self.info.is_none() && self.name == Self::PARENT_NAME
    }
}

/// A repository that can answer path queries.
#[derive(Debug, Clone)]
pub enum StoringRepoRef {
    Local(Arc<LocalRepo>),
    Virtual {
        repo: Arc<VirtualRepo>,
        repos: Arc<Repositories>,
    },
}

impl StoringRepoRef {
    pub fn key(&self) -> &str {
        match self {
            Self::Local(r) => r.key(),
            Self::Virtual { repo, .. } => repo.key(),
        }
    }

    pub fn kind(&self) -> RepoKind {
        match self {
            Self::Local(r) => r.kind(),
            Self::Virtual { .. } => RepoKind::Virtual,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual { .. })
    }

    pub fn ensure_available(&self) -> Result<()> {
        match self {
            Self::Local(r) => r.ensure_available(),
            Self::Virtual { repo, .. } => repo.ensure_available(),
        }
    }

    pub fn item_exists(&self, path: &RepoPath) -> bool {
        match self {
            Self::Local(r) => r.item_exists(path),
            Self::Virtual { repo, repos } => repo.item_exists(repos, path),
        }
    }

    /// The storing repository holding a copy of `path` the caller may see.
    pub fn resolve_visible(
        &self,
        authorizer: &Authorizer,
        path: &RepoPath,
    ) -> Result<Option<(Arc<LocalRepo>, Arc<ItemInfo>)>> {
        match self {
            Self::Local(r) => Ok(r.item_info(path).map(|info| (Arc::clone(r), info))),
            Self::Virtual { repo, repos } => repo.resolve_visible(repos, authorizer, path),
        }
    }

    pub fn read(&self, authorizer: &Authorizer, path: &RepoPath) -> Result<Box<dyn Read + Send>> {
        match self {
            Self::Local(r) => r.read_content(path),
            Self::Virtual { repo, repos } => repo.read(repos, authorizer, path),
        }
    }

    /// Children of the folder at `path` the caller may see.
    pub fn children(
        &self,
        authorizer: &Authorizer,
        path: &RepoPath,
        include_parent: bool,
    ) -> Result<Vec<ChildItem>> {
        match self {
            Self::Virtual { repo, repos } => {
                repo.get_children(repos, authorizer, path, include_parent)
            }
            Self::Local(repo) => {
                repo.ensure_available()?;
                let folder = path.with_folder(true);
                match repo.item_info(&folder) {
                    Some(info) if info.is_folder() => {}
                    Some(_) => return Err(Error::invalid_path(path, "is not a folder")),
                    None => return Err(Error::not_found(path)),
                }
                let mut children: Vec<ChildItem> = repo
                    .children(&folder)
                    .into_iter()
                    .filter(|c| authorizer.can_list(&c.repo_path))
                    .map(|c| ChildItem::of(&folder, c))
                    .collect();
                if include_parent {
                    if let Some(parent) = folder.parent() {
                        children.insert(0, ChildItem::parent_link(parent));
                    }
                }
                Ok(children)
            }
        }
    }
}
