//! Error types for binrepo-cli

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that can occur in CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Error from binrepo-core
    #[error(transparent)]
    Core(#[from] binrepo_core::Error),

    /// Error from binrepo-fs
    #[error(transparent)]
    Fs(#[from] binrepo_fs::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON output failed
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A batch operation finished with errors
    #[error("{message} (status {status})")]
    Batch { status: u16, message: String },

    /// User-facing error with a message
    #[error("{message}")]
    User { message: String },
}

impl CliError {
    /// Create a new user error with the given message
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    ///
    /// Usage problems exit with 2, everything else with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::User { .. } => 2,
            _ => 1,
        }
    }
}
