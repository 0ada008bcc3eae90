//! Table dumper.
//!
//! `Dumper` writes a point-in-time snapshot of every configured table:
//! 1. Creates `backup_<timestamp>` under the backups root.
//! 2. Selects every row of each table in order, writing `<table>.json`.
//! 3. Records a per-table outcome; one failing table never stops the others.
//! 4. Writes `backup_summary.json` with the outcomes and the total row count.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use store::RowStore;
use tracing::{error, info, instrument};

use crate::config::Config;
use crate::layout::{create_backup_dir, write_json_atomic};
use crate::models::{BackupManifest, BackupRun, TableDump, TableOutcome, MANIFEST_FILE_NAME};
use crate::tables::TableSpec;
use crate::BackupError;

pub struct Dumper {
    store: Arc<dyn RowStore>,
    tables: Vec<TableSpec>,
    backups_root: PathBuf,
}

impl Dumper {
    pub fn new(config: &Config, store: Arc<dyn RowStore>) -> Self {
        Self {
            store,
            tables: config.tables.clone(),
            backups_root: config.backups_root.clone(),
        }
    }

    /// Back up every table now.
    pub async fn run(&self) -> Result<BackupRun, BackupError> {
        self.run_at(Local::now()).await
    }

    /// Back up every table into the directory named after `captured_at`.
    ///
    /// # Errors
    /// Only run-level failures are returned: the directory cannot be created
    /// or already exists, or the manifest cannot be written. Table failures
    /// are recorded in the manifest instead.
    #[instrument(skip(self), fields(endpoint = %self.store.endpoint()))]
    pub async fn run_at(&self, captured_at: DateTime<Local>) -> Result<BackupRun, BackupError> {
        let directory = create_backup_dir(&self.backups_root, captured_at)?;
        info!("Backup directory: {}", directory.display());

        let mut outcomes = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            info!("Backing up table: {}", table.name);
            let outcome = match self.dump_table(&directory, table).await {
                Ok(count) => {
                    info!("{}: {} records saved", table.name, count);
                    TableOutcome::succeeded(count)
                }
                Err(e) => {
                    error!("Error backing up {}: {}", table.name, e);
                    TableOutcome::failed(e.to_string())
                }
            };
            outcomes.push((table.name.to_owned(), outcome));
        }

        let manifest = BackupManifest::new(Utc::now(), self.store.endpoint(), outcomes);
        write_json_atomic(&directory.join(MANIFEST_FILE_NAME), &manifest)?;

        if manifest.all_succeeded() {
            info!("Backup completed: {} records", manifest.total_records);
        } else {
            error!(
                "Backup incomplete, failed tables: {}",
                manifest.failed_tables().join(", ")
            );
        }

        Ok(BackupRun {
            directory,
            manifest,
        })
    }

    async fn dump_table(&self, directory: &Path, table: &TableSpec) -> Result<usize, BackupError> {
        let rows = self.store.select_all(table.name).await?;
        let dump = TableDump::new(table.name, Utc::now(), rows);
        write_json_atomic(&directory.join(table.file_name()), &dump)?;
        Ok(dump.record_count)
    }
}
