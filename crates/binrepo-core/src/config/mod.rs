//! Central configuration
//!
//! The central configuration lists every repository and the storage-wide
//! tuning knobs. It is loaded through [`binrepo_fs::ConfigStore`], so TOML,
//! JSON and YAML files are all accepted:
//!
//! ```toml
//! [storage]
//! lock_timeout_ms = 5000
//!
//! [[repositories]]
//! type = "local"
//! key = "libs-release"
//!
//! [[repositories]]
//! type = "remote"
//! key = "maven-central"
//! url = "https://repo1.maven.org/maven2"
//!
//! [[repositories]]
//! type = "virtual"
//! key = "libs"
//! repositories = ["libs-release", "maven-central"]
//! ```

mod descriptor;

pub use descriptor::{
    CacheRepoDescriptor, LocalRepoDescriptor, RemoteRepoDescriptor, RepoDescriptor, RepoKind,
    VirtualRepoDescriptor,
};

use crate::{Error, Result};
use binrepo_fs::{ConfigStore, validate_repo_key};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

fn default_lock_timeout_ms() -> u64 {
    10_000
}

fn default_derivation_ttl_secs() -> u64 {
    600
}

fn default_derivation_capacity() -> usize {
    10_000
}

fn default_worker_threads() -> usize {
    4
}

/// Storage-wide tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Budget for acquiring a lock before failing with `LockTimeout`
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Lifetime of a completed checksum derivation
    #[serde(default = "default_derivation_ttl_secs")]
    pub derivation_ttl_secs: u64,
    /// Entries kept per derivation map before the oldest are evicted
    #[serde(default = "default_derivation_capacity")]
    pub derivation_capacity: usize,
    /// Threads for checksum derivation and metadata recalculation
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            derivation_ttl_secs: default_derivation_ttl_secs(),
            derivation_capacity: default_derivation_capacity(),
            worker_threads: default_worker_threads(),
        }
    }
}

impl StorageSettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn derivation_ttl(&self) -> Duration {
        Duration::from_secs(self.derivation_ttl_secs)
    }
}

/// The whole repository configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CentralConfig {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub repositories: Vec<RepoDescriptor>,
}

impl CentralConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = ConfigStore::new().load(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        ConfigStore::new().save(path, self)?;
        Ok(())
    }

    pub fn with_local(mut self, key: &str) -> Self {
        self.repositories
            .push(RepoDescriptor::Local(LocalRepoDescriptor::new(key)));
        self
    }

    pub fn with_remote(mut self, key: &str, url: &str) -> Self {
        self.repositories
            .push(RepoDescriptor::Remote(RemoteRepoDescriptor::new(key, url)));
        self
    }

    pub fn with_virtual(mut self, key: &str, members: &[&str]) -> Self {
        self.repositories
            .push(RepoDescriptor::Virtual(VirtualRepoDescriptor::new(key, members)));
        self
    }

    pub fn with_repository(mut self, descriptor: RepoDescriptor) -> Self {
        self.repositories.push(descriptor);
        self
    }

    pub fn locals(&self) -> impl Iterator<Item = &LocalRepoDescriptor> {
        self.repositories.iter().filter_map(|r| match r {
            RepoDescriptor::Local(d) => Some(d),
            _ => None,
        })
    }

    pub fn remotes(&self) -> impl Iterator<Item = &RemoteRepoDescriptor> {
        self.repositories.iter().filter_map(|r| match r {
            RepoDescriptor::Remote(d) => Some(d),
            _ => None,
        })
    }

    pub fn virtuals(&self) -> impl Iterator<Item = &VirtualRepoDescriptor> {
        self.repositories.iter().filter_map(|r| match r {
            RepoDescriptor::Virtual(d) => Some(d),
            _ => None,
        })
    }

    /// Every key the configuration produces, generated cache keys included.
    pub fn all_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for repo in &self.repositories {
            keys.push(repo.key().to_string());
            if let RepoDescriptor::Remote(remote) = repo {
                keys.push(remote.cache_key());
            }
        }
        keys
    }

    /// Reject configurations that cannot produce a consistent registry.
    ///
    /// Unknown virtual members are not an error here; the registry skips
    /// them with a warning when it initializes the virtual repository.
    pub fn validate(&self) -> Result<()> {
        if self
            .repositories
            .iter()
            .any(|r| matches!(r, RepoDescriptor::Cache(_)))
        {
            return Err(Error::configuration(
                "cache repositories are derived from remotes and cannot be declared",
            ));
        }

        let mut seen = HashSet::new();
        for key in self.all_keys() {
            validate_repo_key(&key).map_err(|e| Error::configuration(e.to_string()))?;
            if !seen.insert(key.clone()) {
                return Err(Error::configuration(format!(
                    "duplicate repository key '{key}'"
                )));
            }
        }

        for remote in self.remotes() {
            if remote.url.trim().is_empty() {
                return Err(Error::configuration(format!(
                    "remote repository '{}' has no url",
                    remote.key
                )));
            }
        }

        if self.storage.worker_threads == 0 {
            return Err(Error::configuration("worker_threads must be at least 1"));
        }

        Ok(())
    }
}
