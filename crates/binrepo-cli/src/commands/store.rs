//! Commands that create or remove content: deploy and delete

use binrepo_core::{DeployRequest, ItemInfo};
use binrepo_fs::{ChecksumType, RepoPath};
use colored::Colorize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::{format_size, single_checksum};
use crate::cli::ChecksumArgs;
use crate::context::CliContext;
use crate::error::{CliError, Result};

/// Run the deploy command
///
/// With a file the content is uploaded; without one it is copied from
/// stored content carrying the given checksum.
pub fn run_deploy(
    ctx: &CliContext,
    repo: &str,
    path: &str,
    file: Option<&Path>,
    checksums: &ChecksumArgs,
) -> Result<()> {
    let target = RepoPath::file(repo, path.trim_matches('/'));
    let info = match file {
        Some(file) => upload(ctx, &target, file, checksums)?,
        None => {
            let (checksum_type, value) = single_checksum(checksums)?;
            ctx.service().deploy_by_checksum(&target, checksum_type, value)?
        }
    };

    let size = info.file().map(|f| format_size(f.size)).unwrap_or_default();
    println!("{} {} ({})", "Deployed".green().bold(), info.repo_path, size);
    if let Some(sha1) = info.file().and_then(|f| f.sha1()) {
        println!("  {:<6} {}", "sha1:".dimmed(), sha1);
    }
    Ok(())
}

fn upload(
    ctx: &CliContext,
    target: &RepoPath,
    file: &Path,
    checksums: &ChecksumArgs,
) -> Result<std::sync::Arc<ItemInfo>> {
    let handle = File::open(file).map_err(|e| {
        CliError::user(format!("cannot open {}: {e}", file.display()))
    })?;
    let mut request = DeployRequest::default();
    if let Some(sha1) = &checksums.sha1 {
        request = request.with_checksum(ChecksumType::Sha1, sha1);
    }
    if let Some(md5) = &checksums.md5 {
        request = request.with_checksum(ChecksumType::Md5, md5);
    }
    tracing::debug!(file = %file.display(), target = %target, "uploading");
    Ok(ctx
        .service()
        .deploy(target, &mut BufReader::new(handle), request)?)
}

/// Run the delete command
pub fn run_delete(ctx: &CliContext, repo: &str, path: &str) -> Result<()> {
    let repo_path = ctx.locate(repo, path);
    let removed = ctx.service().undeploy(&repo_path)?;
    println!(
        "{} {} ({} items)",
        "Deleted".green().bold(),
        repo_path,
        removed.len()
    );
    Ok(())
}
