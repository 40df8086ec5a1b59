//! Repository descriptors
//!
//! Descriptors are the declarative form of a repository. Local, remote and
//! virtual repositories are declared in the central configuration; cache
//! descriptors are derived, one per remote.

use crate::item::ChecksumPolicyType;
use serde::{Deserialize, Serialize};
use std::fmt;

fn default_assumed_offline_secs() -> u64 {
    300
}

/// Tagged repository descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RepoDescriptor {
    Local(LocalRepoDescriptor),
    Remote(RemoteRepoDescriptor),
    Virtual(VirtualRepoDescriptor),
    /// Never declared; generated for every remote
    #[serde(skip)]
    Cache(CacheRepoDescriptor),
}

impl RepoDescriptor {
    pub fn key(&self) -> &str {
        match self {
            Self::Local(d) => &d.key,
            Self::Remote(d) => &d.key,
            Self::Virtual(d) => &d.key,
            Self::Cache(d) => &d.key,
        }
    }

    pub fn kind(&self) -> RepoKind {
        match self {
            Self::Local(_) => RepoKind::Local,
            Self::Remote(_) => RepoKind::Remote,
            Self::Virtual(_) => RepoKind::Virtual,
            Self::Cache(_) => RepoKind::Cache,
        }
    }
}

/// The four repository flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepoKind {
    Local,
    Cache,
    Remote,
    Virtual,
}

impl RepoKind {
    /// Whether repositories of this kind durably store items.
    pub fn is_storing(&self) -> bool {
        matches!(self, Self::Local | Self::Cache)
    }
}

impl fmt::Display for RepoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "local",
            Self::Cache => "cache",
            Self::Remote => "remote",
            Self::Virtual => "virtual",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRepoDescriptor {
    pub key: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub checksum_policy: ChecksumPolicyType,
    /// Start blacked out regardless of initialization outcome
    #[serde(default)]
    pub blacked_out: bool,
}

impl LocalRepoDescriptor {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
            checksum_policy: ChecksumPolicyType::default(),
            blacked_out: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepoDescriptor {
    pub key: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    /// Policy applied to content stored in the cache repository
    #[serde(default)]
    pub checksum_policy: ChecksumPolicyType,
    /// Never contact the remote; serve only what is cached
    #[serde(default)]
    pub offline: bool,
    /// How long a failing remote stays offline before it is retried
    #[serde(default = "default_assumed_offline_secs")]
    pub assumed_offline_secs: u64,
    #[serde(default)]
    pub blacked_out: bool,
}

impl RemoteRepoDescriptor {
    pub fn new(key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            url: url.into(),
            description: String::new(),
            checksum_policy: ChecksumPolicyType::default(),
            offline: false,
            assumed_offline_secs: default_assumed_offline_secs(),
            blacked_out: false,
        }
    }

    /// Key of the cache repository backing this remote.
    pub fn cache_key(&self) -> String {
        format!("{}-cache", self.key)
    }

    pub fn cache_descriptor(&self) -> CacheRepoDescriptor {
        CacheRepoDescriptor {
            key: self.cache_key(),
            remote: self.key.clone(),
            checksum_policy: self.checksum_policy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualRepoDescriptor {
    pub key: String,
    #[serde(default)]
    pub description: String,
    /// Ordered member keys; earlier members win name collisions
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default)]
    pub blacked_out: bool,
}

impl VirtualRepoDescriptor {
    pub fn new(key: impl Into<String>, repositories: &[&str]) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
            repositories: repositories.iter().map(|r| r.to_string()).collect(),
            blacked_out: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRepoDescriptor {
    pub key: String,
    pub remote: String,
    pub checksum_policy: ChecksumPolicyType,
}
