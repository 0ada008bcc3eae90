//! Backup loader.
//!
//! `Loader` replays a dumper directory into the store, one table at a time in
//! configured order, because link rows reference rows of earlier tables.
//! Each table is merged according to its [`MergeStrategy`]:
//! - `UpsertByKey`: upsert on the natural key; replaying twice is a no-op.
//! - `ReplaceByFilter`: delete live rows sharing a dumped row's filter values, then insert.
//! - `ReplaceAll`: delete every live row, then insert.
//!
//! Unless the store is transactional, a crash between a table's delete and
//! insert leaves that table short of the deleted rows. Two loaders running
//! against the same store at once are not coordinated.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use store::{Row, RowStore};
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::layout::{read_json, resolve_backup_path};
use crate::models::{
    BackupManifest, RestoreReport, TableDump, TableOutcome, TablePlan, MANIFEST_FILE_NAME,
};
use crate::tables::{validate_order, MergeStrategy, TableSpec};
use crate::BackupError;

pub struct Loader {
    store: Arc<dyn RowStore>,
    tables: Vec<TableSpec>,
    base_dir: PathBuf,
    dry_run: bool,
}

impl Loader {
    /// Create a loader for the configured tables.
    ///
    /// # Errors
    /// Fails if the table list cannot be restored front to back.
    pub fn new(config: &Config, store: Arc<dyn RowStore>) -> Result<Self, BackupError> {
        validate_order(&config.tables)?;
        Ok(Self {
            store,
            tables: config.tables.clone(),
            base_dir: config.base_dir.clone(),
            dry_run: config.dry_run,
        })
    }

    /// Restore every table found in `backup_dir`.
    ///
    /// # Errors
    /// Returns [`BackupError::NotFound`] if the directory does not exist.
    /// Table failures are recorded in the report instead.
    #[instrument(skip(self), fields(dry_run = self.dry_run))]
    pub async fn restore(&self, backup_dir: &Path) -> Result<RestoreReport, BackupError> {
        let directory = resolve_backup_path(&self.base_dir, backup_dir);
        if !directory.is_dir() {
            return Err(BackupError::NotFound(directory));
        }
        info!("Restoring from {}", directory.display());
        self.log_manifest(&directory);

        let mut outcomes = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            let outcome = self.restore_table(&directory, table).await;
            outcomes.push((table.name.to_owned(), outcome));
        }

        let report = RestoreReport::new(directory, self.dry_run, outcomes);
        if report.has_failures() {
            error!("Restore finished with errors: {} records restored", report.total_restored);
        } else {
            info!("Restore completed: {} records restored", report.total_restored);
        }
        Ok(report)
    }

    fn log_manifest(&self, directory: &Path) {
        let path = directory.join(MANIFEST_FILE_NAME);
        if !path.exists() {
            return;
        }
        match read_json::<BackupManifest>(&path) {
            Ok(manifest) => {
                info!(
                    "Backup taken {} from {}: {} records",
                    manifest.backup_date, manifest.supabase_url, manifest.total_records
                );
                let failed = manifest.failed_tables();
                if !failed.is_empty() {
                    warn!("Backup reported failures for: {}", failed.join(", "));
                }
            }
            Err(e) => warn!("Ignoring unreadable manifest: {}", e),
        }
    }

    async fn restore_table(&self, directory: &Path, table: &TableSpec) -> TableOutcome {
        let file = directory.join(table.file_name());
        if !file.exists() {
            warn!("Skipping {}: backup file not found", table.name);
            return TableOutcome::skipped();
        }

        info!("Restoring table: {} ({})", table.name, table.strategy);
        match self.try_restore_table(&file, table).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Error restoring {}: {}", table.name, e);
                TableOutcome::failed(e.to_string())
            }
        }
    }

    async fn try_restore_table(
        &self,
        file: &Path,
        table: &TableSpec,
    ) -> Result<TableOutcome, BackupError> {
        let dump: TableDump = read_json(file)?;
        if !dump.table.is_empty() && dump.table != table.name {
            return Err(BackupError::TableMismatch {
                path: file.to_path_buf(),
                expected: table.name,
                found: dump.table,
            });
        }
        let rows = table.prepare_rows(dump.data)?;

        if rows.is_empty() {
            info!("{}: no records to restore", table.name);
            return Ok(TableOutcome::succeeded(0));
        }

        if self.dry_run {
            let plan = self.plan_table(table, &rows).await?;
            info!(
                "{}: would delete {}, insert {}, update {}",
                table.name, plan.deletes, plan.inserts, plan.updates
            );
            return Ok(TableOutcome::planned(plan));
        }

        match &table.strategy {
            MergeStrategy::UpsertByKey { key, .. } => {
                self.store.upsert(table.name, &rows, key).await?;
            }
            MergeStrategy::ReplaceByFilter { .. } | MergeStrategy::ReplaceAll => {
                let filters = table.delete_filters(&rows);
                self.store.replace(table.name, &filters, &rows).await?;
            }
        }

        info!("{}: {} records restored", table.name, rows.len());
        Ok(TableOutcome::succeeded(rows.len()))
    }

    /// Work out what a restore of `rows` would change, reading the live table only.
    async fn plan_table(&self, table: &TableSpec, rows: &[Row]) -> Result<TablePlan, BackupError> {
        let live = self.store.select_all(table.name).await?;
        let strategy = table.strategy.to_string();

        let plan = match &table.strategy {
            MergeStrategy::UpsertByKey { key, .. } => {
                let live_keys: HashSet<String> = live
                    .iter()
                    .filter_map(|row| row.get(*key))
                    .map(|value| value.to_string())
                    .collect();
                let mut planned_keys = HashSet::new();
                let (mut inserts, mut updates) = (0, 0);
                for row in rows {
                    let key_value = row.get(*key).map(|v| v.to_string()).unwrap_or_default();
                    if live_keys.contains(&key_value) || !planned_keys.insert(key_value) {
                        updates += 1;
                    } else {
                        inserts += 1;
                    }
                }
                TablePlan {
                    strategy,
                    deletes: 0,
                    inserts,
                    updates,
                }
            }
            MergeStrategy::ReplaceByFilter { .. } | MergeStrategy::ReplaceAll => {
                let filters = table.delete_filters(rows);
                let deletes = live
                    .iter()
                    .filter(|row| filters.iter().any(|f| f.matches(row)))
                    .count();
                TablePlan {
                    strategy,
                    deletes,
                    inserts: rows.len(),
                    updates: 0,
                }
            }
        };
        Ok(plan)
    }
}
