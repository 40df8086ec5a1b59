//! The repos command

use binrepo_core::Repo;
use colored::Colorize;
use serde::Serialize;

use crate::context::CliContext;
use crate::error::Result;

#[derive(Debug, Serialize)]
struct RepoSummary {
    key: String,
    kind: String,
    blacked_out: bool,
    /// Remote URL or virtual members
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

fn summarize(repo: &Repo) -> RepoSummary {
    let detail = match repo {
        Repo::Remote(remote) => Some(remote.url().to_string()),
        Repo::Virtual(virtual_repo) => Some(virtual_repo.members().join(", ")),
        Repo::Local(_) | Repo::Cache(_) => None,
    };
    RepoSummary {
        key: repo.key().to_string(),
        kind: repo.kind().to_string(),
        blacked_out: repo.is_blacked_out(),
        detail,
    }
}

/// Run the repos command
pub fn run_repos(ctx: &CliContext, json: bool) -> Result<()> {
    let summaries: Vec<RepoSummary> = ctx
        .service()
        .registry()
        .snapshot()
        .all()
        .iter()
        .map(summarize)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    println!("{}", "Repositories".bold());
    println!();
    for summary in &summaries {
        let state = if summary.blacked_out {
            " [blacked out]".red().to_string()
        } else {
            String::new()
        };
        let detail = summary
            .detail
            .as_deref()
            .map(|d| format!(" ({})", d.dimmed()))
            .unwrap_or_default();
        println!(
            "  {:<24} {:<8}{}{}",
            summary.key.green(),
            summary.kind.cyan(),
            detail,
            state
        );
    }
    println!();
    println!("{} {} repositories", "Total:".dimmed(), summaries.len());
    Ok(())
}
