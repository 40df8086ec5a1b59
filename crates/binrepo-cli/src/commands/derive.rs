//! The derive command

use colored::Colorize;

use super::single_checksum;
use crate::cli::ChecksumArgs;
use crate::context::CliContext;
use crate::error::{CliError, Result};

/// Run the derive command
pub fn run_derive(ctx: &CliContext, checksums: &ChecksumArgs) -> Result<()> {
    let (known_type, value) = single_checksum(checksums)?;
    let pair = ctx
        .service()
        .derive_missing_checksum(known_type, value)?
        .ok_or_else(|| {
            CliError::user(format!("no stored content has {known_type} {value}"))
        })?;

    let wanted = known_type.other();
    println!("{} {}", format!("{wanted}:").dimmed(), pair.get(wanted).green());
    Ok(())
}
