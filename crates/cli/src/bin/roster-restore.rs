//! `roster-restore`: replay a backup directory into the store.
//!
//! Run without arguments to list the available backups.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use backup::config::base_dir_from_env;
use backup::layout::{list_backups, resolve_backup_path};
use backup::{Config, Loader};
use clap::Parser;
use tracing::error;

#[derive(Parser)]
#[command(name = "roster-restore", about = "Restore the roster tables from a backup directory", version)]
struct Cli {
    /// Backup directory; relative paths resolve against BACKUP_HOME, then the backups root.
    backup_dir: Option<PathBuf>,

    /// Report what would change without writing to the store.
    #[arg(long)]
    dry_run: bool,

    /// Directory holding the timestamped backup folders (default: <BACKUP_HOME>/backups).
    #[arg(long)]
    backups_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    cli::init_tracing();
    let args = Cli::parse();

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> anyhow::Result<bool> {
    let base_dir = base_dir_from_env();
    let root = cli::backups_root(&base_dir, args.backups_root.as_deref());

    let Some(dir) = args.backup_dir else {
        let names = list_backups(&root)?;
        println!("Usage: roster-restore <BACKUP_DIR> [--dry-run]");
        println!("{}", cli::format_backup_list(&root, &names));
        return Ok(false);
    };

    let directory = locate(&base_dir, &root, &dir)
        .with_context(|| format!("backup directory not found: {}", dir.display()))?;

    let config = Config::from_env_in(&base_dir)?.with_dry_run(args.dry_run);
    let store = config
        .store
        .connect()
        .await
        .context("failed to open store client")?;
    let report = Loader::new(&config, store)?.restore(&directory).await?;

    println!("{}", cli::format_restore_report(&report));
    Ok(!report.has_failures())
}

/// Resolve `dir` against the base directory first, then the backups root.
fn locate(base_dir: &Path, root: &Path, dir: &Path) -> Option<PathBuf> {
    [resolve_backup_path(base_dir, dir), root.join(dir)]
        .into_iter()
        .find(|candidate| candidate.is_dir())
}
