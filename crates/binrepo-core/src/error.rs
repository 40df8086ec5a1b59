//! Error types for binrepo-core

use std::time::Duration;

/// Result type for binrepo-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in binrepo-core operations
///
/// Every variant maps to an HTTP-analogous status through
/// [`Error::status_code`] so a REST layer can surface it directly.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Path or repository does not resolve
    #[error("Not found: {0}")]
    NotFound(String),

    /// Permission predicate failed (already recorded in the audit sink)
    #[error("Access denied: {user} may not {action} {path}")]
    AccessDenied {
        user: String,
        action: String,
        path: String,
    },

    /// Persisted content failed the repository's checksum policy
    #[error("Checksum policy '{policy}' rejected {path}: {message}")]
    ChecksumPolicyViolation {
        path: String,
        policy: String,
        message: String,
    },

    /// Write lock not acquired within the configured budget
    #[error("Timed out after {timeout:?} waiting for a lock on {path}")]
    LockTimeout { path: String, timeout: Duration },

    /// Invalid configuration or a repository that failed to initialize
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Invalid target or top-level permission failure of a move/copy
    #[error("Move/copy aborted: {message}")]
    StructuralMove { message: String, status: u16 },

    /// Repository is blacked out and rejects all traffic
    #[error("Repository '{key}' is blacked out")]
    BlackedOut { key: String },

    /// A mutator was called on an immutable item view
    #[error("Cannot modify immutable item {path}")]
    ImmutableItem { path: String },

    /// The mutable item was deleted and cannot be saved
    #[error("Item {path} has been deleted")]
    ItemDeleted { path: String },

    /// Operation stopped through its stop signal
    #[error("Operation cancelled")]
    Cancelled,

    /// Path cannot hold the requested item
    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Checksum derivation failed; nothing was cached
    #[error("Failed to derive checksums for {checksum_type} {value}: {message}")]
    DerivationFailed {
        checksum_type: String,
        value: String,
        message: String,
    },

    /// Malformed checksum value
    #[error("Invalid {checksum_type} checksum '{value}'")]
    InvalidChecksum { checksum_type: String, value: String },

    // Transparent wrappers for underlying crate errors
    /// Storage error from binrepo-fs
    #[error(transparent)]
    Fs(#[from] binrepo_fs::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn invalid_path(path: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Fs(e) => e.is_not_found(),
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// HTTP-analogous status code.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::AccessDenied { .. } => 403,
            Self::ChecksumPolicyViolation { .. } => 409,
            Self::LockTimeout { .. } => 423,
            Self::Configuration { .. } | Self::DerivationFailed { .. } => 500,
            Self::StructuralMove { status, .. } => *status,
            Self::BlackedOut { .. } => 503,
            Self::ImmutableItem { .. } | Self::ItemDeleted { .. } => 409,
            Self::Cancelled => 499,
            Self::InvalidPath { .. } | Self::InvalidChecksum { .. } => 400,
            Self::Fs(e) if e.is_not_found() => 404,
            Self::Fs(binrepo_fs::Error::LockFailed { .. }) => 423,
            Self::Fs(_) | Self::Io(_) => 500,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. } | Self::Fs(binrepo_fs::Error::LockFailed { .. })
        )
    }
}
