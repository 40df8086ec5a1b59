//! binrepo CLI
//!
//! Drives the repository manager core against an on-disk storage root and
//! a repository configuration file.

mod cli;
mod commands;
mod context;
mod error;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use context::CliContext;
use error::Result;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

/// Log to stderr; `--verbose` raises the default level to debug.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
    tracing::debug!("Verbose mode enabled");
}

fn run(cli: Cli) -> Result<()> {
    let ctx = CliContext::open(&cli)?;
    let result = execute_command(&ctx, &cli.command);
    ctx.close();
    result
}

fn execute_command(ctx: &CliContext, cmd: &Commands) -> Result<()> {
    match cmd {
        Commands::Repos { json } => commands::run_repos(ctx, *json),
        Commands::List { repo, path, json } => commands::run_list(ctx, repo, path, *json),
        Commands::Deploy {
            repo,
            path,
            file,
            checksums,
        } => commands::run_deploy(ctx, repo, path, file.as_deref(), checksums),
        Commands::Info { repo, path, json } => commands::run_info(ctx, repo, path, *json),
        Commands::Move { relocation, prune } => {
            commands::run_relocate(ctx, relocation, false, *prune)
        }
        Commands::Copy { relocation } => commands::run_relocate(ctx, relocation, true, false),
        Commands::Delete { repo, path } => commands::run_delete(ctx, repo, path),
        Commands::Derive { checksums } => commands::run_derive(ctx, checksums),
    }
}
