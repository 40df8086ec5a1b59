//! Service setup for a single CLI invocation
//!
//! Every invocation loads the configuration, opens the on-disk storage and
//! rebuilds the item index from it.

use binrepo_core::{AccessControl, CentralConfig, FsStorageProvider, RepositoryService};
use binrepo_fs::RepoPath;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::Cli;
use crate::error::{CliError, Result};

/// The local operator: allowed everything, named for audit and metadata.
#[derive(Debug, Clone)]
pub struct LocalOperator {
    name: String,
}

impl LocalOperator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl AccessControl for LocalOperator {
    fn can_read(&self, _path: &RepoPath) -> bool {
        true
    }

    fn can_deploy(&self, _path: &RepoPath) -> bool {
        true
    }

    fn can_delete(&self, _path: &RepoPath) -> bool {
        true
    }

    fn can_annotate(&self, _path: &RepoPath) -> bool {
        true
    }

    fn current_user(&self) -> String {
        self.name.clone()
    }
}

/// Per-user data directory used when `--storage` is not given.
fn default_storage_dir() -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|dir| dir.join("binrepo"))
        .ok_or_else(|| CliError::user("no data directory on this system; pass --storage"))
}

/// A ready service for one invocation.
pub struct CliContext {
    service: RepositoryService,
}

impl CliContext {
    /// Load the configuration and open storage as the global arguments say.
    pub fn open(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.as_deref().ok_or_else(|| {
            CliError::user("no repository configuration; pass --config or set BINREPO_CONFIG")
        })?;
        let storage = match &cli.storage {
            Some(dir) => dir.clone(),
            None => default_storage_dir()?,
        };
        Self::open_with(config_path, &storage, &cli.user)
    }

    pub fn open_with(config_path: &Path, storage: &Path, user: &str) -> Result<Self> {
        if !config_path.is_file() {
            return Err(CliError::user(format!(
                "configuration file not found: {}",
                config_path.display()
            )));
        }
        let config = CentralConfig::load(config_path)?;
        tracing::debug!(
            config = %config_path.display(),
            storage = %storage.display(),
            repositories = config.repositories.len(),
            "opening repositories"
        );

        let service = RepositoryService::builder(config)
            .storage(Arc::new(FsStorageProvider::new(storage)))
            .access_control(Arc::new(LocalOperator::new(user)))
            .build()?;
        Ok(Self { service })
    }

    pub fn service(&self) -> &RepositoryService {
        &self.service
    }

    /// Address an existing item, picking the folder flag from the index.
    ///
    /// A trailing `/` or an empty path always names a folder. Unknown
    /// paths are treated as files.
    pub fn locate(&self, repo: &str, path: &str) -> RepoPath {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return RepoPath::root(repo);
        }
        if path.ends_with('/') {
            return RepoPath::folder(repo, trimmed);
        }
        let candidate = RepoPath::file(repo, trimmed);
        match self.service.item_info(&candidate) {
            Ok(info) => info.repo_path.clone(),
            Err(_) => candidate,
        }
    }

    /// Wait for background work before the process exits.
    pub fn close(self) {
        self.service.shutdown();
    }
}
