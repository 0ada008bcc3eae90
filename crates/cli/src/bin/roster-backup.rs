//! `roster-backup`: snapshot every roster table into a new backup directory.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use backup::config::base_dir_from_env;
use backup::{Config, Dumper};
use clap::Parser;
use tracing::error;

#[derive(Parser)]
#[command(name = "roster-backup", about = "Back up the roster tables to JSON files", version)]
struct Cli {
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
    let config = Config::from_env_in(&base_dir)?
        .with_backups_root(cli::backups_root(&base_dir, args.backups_root.as_deref()));

    let store = config
        .store
        .connect()
        .await
        .context("failed to open store client")?;
    let run = Dumper::new(&config, store).run().await?;

    println!("{}", cli::format_backup_summary(&run));
    Ok(run.is_success())
}
