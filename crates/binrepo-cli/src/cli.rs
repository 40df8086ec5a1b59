//! CLI argument parsing using clap derive

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// binrepo - Store, browse and move binary artifacts
#[derive(Parser, Debug)]
#[command(name = "binrepo")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Repository configuration (.toml, .json, .yaml)
    #[arg(short, long, global = true, env = "BINREPO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding repository content [default: <data dir>/binrepo]
    #[arg(short, long, global = true, env = "BINREPO_STORAGE")]
    pub storage: Option<PathBuf>,

    /// User recorded as creator/modifier of items
    #[arg(short, long, global = true, env = "BINREPO_USER", default_value = "anonymous")]
    pub user: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List configured repositories
    Repos {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// List the children of a folder
    ///
    /// Examples:
    ///   binrepo list libs-release              # repository root
    ///   binrepo list libs org/acme             # a folder of a virtual repo
    List {
        repo: String,

        /// Folder path inside the repository
        #[arg(default_value = "")]
        path: String,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Deploy a file, or copy existing content by checksum
    ///
    /// With a file, the given checksums are declared and checked against
    /// the content. Without one, content already stored anywhere with the
    /// given checksum is copied to the path.
    ///
    /// Examples:
    ///   binrepo deploy libs-release org/acme/1.0/acme.jar ./acme.jar
    ///   binrepo deploy libs-release org/acme/1.0/acme.jar --sha1 2aae6c...
    Deploy {
        repo: String,
        path: String,

        /// Local file to upload
        file: Option<PathBuf>,

        #[command(flatten)]
        checksums: ChecksumArgs,
    },

    /// Show the metadata of an item
    Info {
        repo: String,
        path: String,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Move an item to another repository or path
    Move {
        #[command(flatten)]
        relocation: RelocationArgs,

        /// Delete source folders left empty by the move
        #[arg(long)]
        prune: bool,
    },

    /// Copy an item to another repository or path
    Copy {
        #[command(flatten)]
        relocation: RelocationArgs,
    },

    /// Delete an item; folders are deleted with their content
    Delete { repo: String, path: String },

    /// Look up the missing checksum of stored content
    Derive {
        #[command(flatten)]
        checksums: ChecksumArgs,
    },
}

/// Checksums given on the command line.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumArgs {
    /// SHA-1 checksum (40 hex characters)
    #[arg(long)]
    pub sha1: Option<String>,

    /// MD5 checksum (32 hex characters)
    #[arg(long)]
    pub md5: Option<String>,
}

/// Source and destination of a move or copy.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct RelocationArgs {
    /// Source repository
    pub repo: String,

    /// Source path
    pub path: String,

    /// Destination repository
    pub target_repo: String,

    /// Destination path; defaults to the source path
    #[arg(long = "to")]
    pub target_path: Option<String>,

    /// Report what would change without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Stop at the first failing item
    #[arg(long)]
    pub fail_fast: bool,

    /// Regenerate artifact metadata of touched folders
    #[arg(long)]
    pub recalc: bool,
}
