//! The move and copy commands

use binrepo_core::{MoveOptions, MoveTarget, MoverConfig, MultiStatus, StatusLevel};
use binrepo_fs::RepoPath;
use colored::Colorize;

use crate::cli::RelocationArgs;
use crate::context::CliContext;
use crate::error::{CliError, Result};

/// Run a move (`copy == false`) or a copy
pub fn run_relocate(ctx: &CliContext, args: &RelocationArgs, copy: bool, prune: bool) -> Result<()> {
    let from = ctx.locate(&args.repo, &args.path);
    let options = if copy {
        MoveOptions::copying()
    } else {
        MoveOptions::moving().prune_empty_folders(prune)
    }
    .dry_run(args.dry_run)
    .fail_fast(args.fail_fast)
    .recalc_maven_metadata(args.recalc);

    let target = match &args.target_path {
        Some(path) => MoveTarget::Path(RepoPath::new(
            args.target_repo.clone(),
            path.trim_matches('/'),
            from.is_folder(),
        )),
        None => MoveTarget::Repo(args.target_repo.clone()),
    };
    let config = MoverConfig::new(from, target, options);
    let status = ctx.service().move_or_copy(&config);
    report(&status, options)
}

fn report(status: &MultiStatus, options: MoveOptions) -> Result<()> {
    let prefix = if status.is_dry_run() {
        "[dry run] ".yellow().to_string()
    } else {
        String::new()
    };
    for (from, to) in status.moved() {
        println!("{prefix}{} {} -> {}", options.verb(), from, to);
    }
    for entry in status.entries() {
        let code = entry.status_code.map(|c| format!(" [{c}]")).unwrap_or_default();
        match entry.level {
            StatusLevel::Warning => {
                eprintln!("{}{} {}", "warning".yellow().bold(), code, entry.message)
            }
            StatusLevel::Error => eprintln!("{}{} {}", "failed".red().bold(), code, entry.message),
        }
    }

    if status.is_error() {
        let message = status
            .last_error()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| format!("{} failed", options.verb()));
        return Err(CliError::Batch {
            status: status.status_code(),
            message,
        });
    }
    println!(
        "{}{} {} items",
        prefix,
        "Done:".green().bold(),
        status.moved_count()
    );
    Ok(())
}
