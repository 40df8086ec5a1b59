//! Read-only commands: list and info

use binrepo_core::{ChildItem, ItemKind};
use binrepo_fs::RepoPath;
use colored::Colorize;
use serde::Serialize;

use super::format_size;
use crate::context::CliContext;
use crate::error::Result;

#[derive(Debug, Serialize)]
struct ListedChild<'a> {
    name: &'a str,
    folder: bool,
    backing: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
}

fn file_size(child: &ChildItem) -> Option<u64> {
    child.info.as_ref().and_then(|info| info.file()).map(|f| f.size)
}

/// Run the list command
pub fn run_list(ctx: &CliContext, repo: &str, path: &str, json: bool) -> Result<()> {
    let folder = RepoPath::folder(repo, path.trim_matches('/'));
    let children = ctx.service().list_children(&folder, false)?;

    if json {
        let listed: Vec<ListedChild<'_>> = children
            .iter()
            .map(|c| ListedChild {
                name: &c.name,
                folder: c.is_folder,
                backing: c.backing_path.to_string(),
                size: file_size(c),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listed)?);
        return Ok(());
    }

    println!("{}", folder.to_string().bold());
    for child in &children {
        if child.is_folder {
            println!("  {}/", child.name.cyan());
        } else {
            let size = file_size(child).map(format_size).unwrap_or_default();
            println!("  {:<40} {}", child.name, size.dimmed());
        }
    }
    if children.is_empty() {
        println!("  {}", "(empty)".dimmed());
    }
    Ok(())
}

/// Run the info command
pub fn run_info(ctx: &CliContext, repo: &str, path: &str, json: bool) -> Result<()> {
    let repo_path = ctx.locate(repo, path);
    let info = ctx.service().item_info(&repo_path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&*info)?);
        return Ok(());
    }

    println!("{}", info.repo_path.to_string().bold());
    let kind = if info.is_folder() { "folder" } else { "file" };
    println!("  {:<14} {}", "Type:".dimmed(), kind);
    println!(
        "  {:<14} {} by {}",
        "Created:".dimmed(),
        info.created.to_rfc3339(),
        info.created_by
    );
    println!(
        "  {:<14} {} by {}",
        "Modified:".dimmed(),
        info.last_modified.to_rfc3339(),
        info.modified_by
    );
    if let ItemKind::File(file) = &info.kind {
        println!("  {:<14} {}", "Size:".dimmed(), format_size(file.size));
        println!("  {:<14} {}", "Mime type:".dimmed(), file.mime_type);
        for checksum in file.checksums.values() {
            let label = format!("{}:", checksum.checksum_type);
            let actual = checksum.actual.as_deref().unwrap_or("-");
            let mut line = format!("  {:<14} {}", label.dimmed(), actual);
            if let (false, Some(original)) = (checksum.checksums_match(), &checksum.original) {
                line.push_str(&format!(" {}", format!("(declared {original})").red()));
            }
            println!("{line}");
        }
    }
    for (name, values) in info.properties.iter() {
        println!("  {:<14} {} = {}", "Property:".dimmed(), name, values.join(", "));
    }
    Ok(())
}
