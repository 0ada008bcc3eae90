//! On-disk backup documents and run results.
//!
//! `TableDump` and `BackupManifest` define the backup directory format; field
//! names and nesting must not change or older backups stop loading.

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use store::Row;

/// File name of the per-run summary inside a backup directory.
pub const MANIFEST_FILE_NAME: &str = "backup_summary.json";

/// ISO-8601 UTC timestamp with millisecond precision, e.g. `2024-01-15T14:30:00.123Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ---------------------------------------------------------------------------
// <table>.json
// ---------------------------------------------------------------------------

/// One table's rows as captured, plus when and how many.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableDump {
    pub table: String,
    pub backup_date: String,
    pub record_count: usize,
    /// Rows verbatim from the store.
    pub data: Vec<Row>,
}

impl TableDump {
    pub fn new(table: impl Into<String>, captured_at: DateTime<Utc>, data: Vec<Row>) -> Self {
        Self {
            table: table.into(),
            backup_date: iso_timestamp(captured_at),
            record_count: data.len(),
            data,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-table outcome
// ---------------------------------------------------------------------------

/// Dry-run preview of one table's restore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePlan {
    /// Human-readable merge strategy, e.g. `upsert by pass_number`.
    pub strategy: String,
    /// Live rows that would be deleted.
    pub deletes: usize,
    /// Rows that would be inserted as new records.
    pub inserts: usize,
    /// Live rows whose attributes would be overwritten.
    pub updates: usize,
}

/// What happened to one table during a backup or restore run.
///
/// Only `success`, `count` and `error` are part of the manifest format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The table file was absent; not a failure.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<TablePlan>,
}

impl TableOutcome {
    pub fn succeeded(count: usize) -> Self {
        Self {
            success: true,
            count: Some(count),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn skipped() -> Self {
        Self {
            success: true,
            skipped: true,
            ..Self::default()
        }
    }

    pub fn planned(plan: TablePlan) -> Self {
        Self {
            success: true,
            count: Some(0),
            plan: Some(plan),
            ..Self::default()
        }
    }

    pub fn is_failure(&self) -> bool {
        !self.success && !self.skipped
    }
}

/// Serialise `(name, outcome)` pairs as a JSON object, keeping table order.
mod ordered_tables {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::{Map, Value};

    use super::TableOutcome;

    pub fn serialize<S: Serializer>(
        tables: &[(String, TableOutcome)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(tables.iter().map(|(name, outcome)| (name, outcome)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, TableOutcome)>, D::Error> {
        Map::<String, Value>::deserialize(deserializer)?
            .into_iter()
            .map(|(name, value)| {
                serde_json::from_value(value)
                    .map(|outcome| (name, outcome))
                    .map_err(D::Error::custom)
            })
            .collect()
    }
}

fn outcome_total(tables: &[(String, TableOutcome)]) -> usize {
    tables.iter().filter_map(|(_, o)| o.count).sum()
}

// ---------------------------------------------------------------------------
// backup_summary.json
// ---------------------------------------------------------------------------

/// Summary of one backup run across all tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub backup_date: String,
    /// Store endpoint the backup was taken from.
    pub supabase_url: String,
    #[serde(with = "ordered_tables")]
    pub tables: Vec<(String, TableOutcome)>,
    pub total_records: usize,
}

impl BackupManifest {
    pub fn new(
        captured_at: DateTime<Utc>,
        endpoint: impl Into<String>,
        tables: Vec<(String, TableOutcome)>,
    ) -> Self {
        Self {
            backup_date: iso_timestamp(captured_at),
            supabase_url: endpoint.into(),
            total_records: outcome_total(&tables),
            tables,
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableOutcome> {
        self.tables.iter().find(|(n, _)| n == name).map(|(_, o)| o)
    }

    pub fn all_succeeded(&self) -> bool {
        self.tables.iter().all(|(_, o)| o.success)
    }

    /// Names of tables whose backup failed.
    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|(_, o)| !o.success)
            .map(|(n, _)| n.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Run results
// ---------------------------------------------------------------------------

/// Result of a completed dumper run.
#[derive(Debug, Clone)]
pub struct BackupRun {
    /// The `backup_<timestamp>` directory written by this run.
    pub directory: PathBuf,
    pub manifest: BackupManifest,
}

impl BackupRun {
    pub fn is_success(&self) -> bool {
        self.manifest.all_succeeded()
    }
}

/// Result of a completed loader run.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub directory: PathBuf,
    pub dry_run: bool,
    #[serde(with = "ordered_tables")]
    pub tables: Vec<(String, TableOutcome)>,
    pub total_restored: usize,
}

impl RestoreReport {
    pub fn new(directory: PathBuf, dry_run: bool, tables: Vec<(String, TableOutcome)>) -> Self {
        Self {
            directory,
            dry_run,
            total_restored: outcome_total(&tables),
            tables,
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableOutcome> {
        self.tables.iter().find(|(n, _)| n == name).map(|(_, o)| o)
    }

    /// Whether any table failed. Skipped tables do not count.
    pub fn has_failures(&self) -> bool {
        self.tables.iter().any(|(_, o)| o.is_failure())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap()
    }

    #[test]
    fn timestamps_use_millis_and_z_suffix() {
        assert_eq!(iso_timestamp(at()), "2024-01-15T14:30:00.000Z");
    }

    #[test]
    fn manifest_serialises_in_backup_format() {
        let manifest = BackupManifest::new(
            at(),
            "https://demo.supabase.co",
            vec![
                ("persons".into(), TableOutcome::succeeded(2)),
                ("attendance".into(), TableOutcome::failed("permission denied")),
                ("attendance_persons".into(), TableOutcome::succeeded(3)),
            ],
        );

        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(
            value,
            json!({
                "backup_date": "2024-01-15T14:30:00.000Z",
                "supabase_url": "https://demo.supabase.co",
                "tables": {
                    "persons": { "success": true, "count": 2 },
                    "attendance": { "success": false, "error": "permission denied" },
                    "attendance_persons": { "success": true, "count": 3 }
                },
                "total_records": 5
            })
        );

        let text = serde_json::to_string(&manifest).unwrap();
        let persons = text.find("\"persons\"").unwrap();
        let attendance = text.find("\"attendance\"").unwrap();
        assert!(persons < attendance, "table order preserved: {text}");

        let back: BackupManifest = serde_json::from_str(&text).unwrap();
        assert_eq!(back, manifest);
        assert_eq!(back.failed_tables(), vec!["attendance"]);
        assert!(!back.all_succeeded());
    }

    #[test]
    fn table_dump_tolerates_missing_fields() {
        let dump: TableDump = serde_json::from_str(r#"{ "table": "persons" }"#).unwrap();
        assert_eq!(dump.table, "persons");
        assert!(dump.data.is_empty());
        assert_eq!(dump.record_count, 0);
    }

    #[test]
    fn skipped_tables_are_not_failures() {
        let report = RestoreReport::new(
            PathBuf::from("backups/backup_2024-01-15_14-30-00"),
            false,
            vec![
                ("persons".into(), TableOutcome::succeeded(4)),
                ("attendance".into(), TableOutcome::skipped()),
            ],
        );
        assert!(!report.has_failures());
        assert_eq!(report.total_restored, 4);
        assert!(report.table("attendance").unwrap().skipped);
    }
}
