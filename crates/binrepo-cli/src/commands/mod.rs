//! Command implementations for binrepo-cli

pub mod browse;
pub mod derive;
pub mod repos;
pub mod relocate;
pub mod store;

pub use browse::{run_info, run_list};
pub use derive::run_derive;
pub use relocate::run_relocate;
pub use repos::run_repos;
pub use store::{run_delete, run_deploy};

use binrepo_fs::ChecksumType;

use crate::cli::ChecksumArgs;
use crate::error::{CliError, Result};

/// The single checksum a command needs, SHA-1 preferred.
fn single_checksum(args: &ChecksumArgs) -> Result<(ChecksumType, &str)> {
    match (&args.sha1, &args.md5) {
        (Some(sha1), _) => Ok((ChecksumType::Sha1, sha1)),
        (None, Some(md5)) => Ok((ChecksumType::Md5, md5)),
        (None, None) => Err(CliError::user("a checksum is required: pass --sha1 or --md5")),
    }
}

/// Human-readable byte count.
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
