//! Storage addressing for the binaries repository manager
//!
//! Provides the `RepoPath` address type, SHA-1/MD5 checksum handling with
//! single-pass streaming digests, the `BlobStore` byte-stream capability with
//! filesystem and in-memory backends, and format-agnostic config loading.

pub mod blob;
pub mod checksum;
pub mod config;
pub mod error;
pub mod io;
pub mod path;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore, is_reserved, staging_path};
pub use checksum::{ChecksumInfo, ChecksumPair, ChecksumType, ContentDigest, DigestingReader};
pub use config::ConfigStore;
pub use error::{Error, Result};
pub use io::RobustnessConfig;
pub use path::{RepoPath, validate_repo_key};
