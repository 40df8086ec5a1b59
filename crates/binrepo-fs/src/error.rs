//! Error types for binrepo-fs

use std::path::PathBuf;

/// Result type for binrepo-fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in binrepo-fs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config at {path}: {message}")]
    ConfigParse {
        path: PathBuf,
        format: String,
        message: String,
    },

    #[error("Failed to serialize {format} config for {path}: {message}")]
    ConfigSerialize {
        path: PathBuf,
        format: String,
        message: String,
    },

    #[error("Unsupported config format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Lock acquisition failed for {path}")]
    LockFailed { path: PathBuf },

    #[error("Invalid repository path '{value}': expected <repo-key>:<path>")]
    InvalidRepoPath { value: String },

    #[error("Invalid repository key '{key}'")]
    InvalidRepoKey { key: String },

    #[error("Blob not found: {path}")]
    BlobNotFound { path: String },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the addressed content does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::BlobNotFound { .. } => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
