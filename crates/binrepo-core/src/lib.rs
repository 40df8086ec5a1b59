//! Core layer of the binaries repository manager
//!
//! This crate builds on `binrepo-fs` and implements:
//!
//! - **Registry**: local, cache, remote and virtual repositories, swapped
//!   atomically on reload
//! - **Item store**: file/folder metadata with immutable snapshots and
//!   write-locked mutable copies
//! - **Locking**: per-path read/write locks with a timeout
//! - **Virtual resolution**: first-match lookup and deduplicated listings
//!   over member repositories
//! - **Checksum derivation**: single-flight lookup of a missing checksum
//! - **Mover**: move/copy with dry run and deferred metadata recalculation
//!
//! # Architecture
//!
//! ```text
//!                  CLI / REST
//!                      |
//!              RepositoryService
//!                      |
//!     +--------+-------+-------+---------+
//!     |        |       |       |         |
//!  registry  mover  derive  security  status
//!     |        |
//!   repo --- lock
//!     |
//!  item / storage
//!     |
//!  binrepo-fs
//! ```
//!
//! # Example
//!
//! ```
//! use binrepo_core::{CentralConfig, DeployRequest, RepositoryService};
//! use binrepo_fs::RepoPath;
//!
//! fn example() -> binrepo_core::Result<()> {
//!     let config = CentralConfig::default().with_local("libs-release");
//!     let service = RepositoryService::builder(config).build()?;
//!
//!     let path = RepoPath::file("libs-release", "org/acme/1.0/acme.jar");
//!     service.deploy(&path, &mut "bytes".as_bytes(), DeployRequest::default())?;
//!     assert!(service.item_exists(&path));
//!     Ok(())
//! }
//! # example().unwrap();
//! ```

pub mod cancel;
pub mod config;
pub mod derive;
pub mod error;
pub mod item;
pub mod lock;
pub mod mover;
pub mod registry;
pub mod repo;
pub mod security;
pub mod service;
pub mod status;
pub mod storage;

pub use cancel::StopSignal;
pub use config::{
    CacheRepoDescriptor, CentralConfig, LocalRepoDescriptor, RemoteRepoDescriptor, RepoDescriptor,
    RepoKind, StorageSettings, VirtualRepoDescriptor,
};
pub use derive::{ChecksumDerivationCache, ChecksumSearch};
pub use error::{Error, Result};
pub use item::{
    ChecksumPolicy, ChecksumPolicyType, FileInfo, FsItem, ItemInfo, ItemKind, Listable, Properties,
    Readable, Writable,
};
pub use lock::{LockEntry, LockManager, LockMode};
pub use mover::{
    MetadataCalculator, MetadataRecalculator, MoveOptions, MoveTarget, Mover, MoverConfig,
    VersionIndexCalculator,
};
pub use registry::{ReloadReport, RepoRegistry, Repositories};
pub use repo::{ChildItem, DeployRequest, LocalRepo, LockedItem, RemoteRepo, Repo, StoringRepoRef, VirtualRepo};
pub use security::{AccessControl, Action, AllowAll, AuditRecord, AuditSink, Authorizer, PermissionMatrix};
pub use service::{RepositoryService, RepositoryServiceBuilder};
pub use status::{MultiStatus, StatusEntry, StatusLevel};
pub use storage::{FsStorageProvider, MemoryStorageProvider, RepoStorage, StorageProvider};
