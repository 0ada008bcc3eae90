//! Shared plumbing for the `roster-backup` and `roster-restore` binaries.

use std::path::{Path, PathBuf};

use backup::config::default_backups_root;
use backup::layout::resolve_backup_path;
use backup::{BackupRun, RestoreReport, TableOutcome};
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Backups root from `--backups-root`, or `<base_dir>/backups`.
pub fn backups_root(base_dir: &Path, arg: Option<&Path>) -> PathBuf {
    match arg {
        Some(root) => resolve_backup_path(base_dir, root),
        None => default_backups_root(base_dir),
    }
}

fn outcome_line(name: &str, outcome: &TableOutcome) -> String {
    if outcome.skipped {
        return format!("  {name}: skipped (no backup file)");
    }
    if let Some(error) = &outcome.error {
        return format!("  {name}: FAILED ({error})");
    }
    if let Some(plan) = &outcome.plan {
        return format!(
            "  {name}: {} -> delete {}, insert {}, update {}",
            plan.strategy, plan.deletes, plan.inserts, plan.updates
        );
    }
    format!("  {name}: {} records", outcome.count.unwrap_or(0))
}

fn outcome_lines(tables: &[(String, TableOutcome)]) -> impl Iterator<Item = String> + '_ {
    tables.iter().map(|(name, outcome)| outcome_line(name, outcome))
}

pub fn format_backup_summary(run: &BackupRun) -> String {
    let mut lines = vec![format!("Backup: {}", run.directory.display())];
    lines.extend(outcome_lines(&run.manifest.tables));
    lines.push(format!("Total records: {}", run.manifest.total_records));
    if !run.is_success() {
        lines.push(format!("Failed tables: {}", run.manifest.failed_tables().join(", ")));
    }
    lines.join("\n")
}

pub fn format_restore_report(report: &RestoreReport) -> String {
    let heading = if report.dry_run { "Dry run" } else { "Restore" };
    let mut lines = vec![format!("{heading}: {}", report.directory.display())];
    lines.extend(outcome_lines(&report.tables));
    lines.push(format!("Total restored: {}", report.total_restored));
    lines.join("\n")
}

/// Listing shown when `roster-restore` is run without a directory.
pub fn format_backup_list(root: &Path, names: &[String]) -> String {
    let mut lines = vec![format!("Available backups in {}:", root.display())];
    if names.is_empty() {
        lines.push("  (no backups found)".to_owned());
    }
    lines.extend(names.iter().map(|name| format!("  {name}")));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use backup::{BackupManifest, TablePlan};
    use chrono::{TimeZone, Utc};

    #[test]
    fn backup_summary_lists_failures() {
        let manifest = BackupManifest::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 13, 30, 0).unwrap(),
            "memory://local",
            vec![
                ("persons".to_owned(), TableOutcome::succeeded(4)),
                ("attendance".to_owned(), TableOutcome::failed("timeout")),
            ],
        );
        let run = BackupRun {
            directory: PathBuf::from("/srv/backups/backup_2024-01-15_14-30-00"),
            manifest,
        };

        let text = format_backup_summary(&run);
        assert!(text.contains("  persons: 4 records"));
        assert!(text.contains("  attendance: FAILED (timeout)"));
        assert!(text.contains("Total records: 4"));
        assert!(text.ends_with("Failed tables: attendance"));
    }

    #[test]
    fn dry_run_report_shows_plans() {
        let report = RestoreReport::new(
            PathBuf::from("backups/backup_2024-01-15_14-30-00"),
            true,
            vec![
                (
                    "attendance".to_owned(),
                    TableOutcome::planned(TablePlan {
                        strategy: "replace by (date, activity_type)".into(),
                        deletes: 1,
                        inserts: 2,
                        updates: 0,
                    }),
                ),
                ("attendance_persons".to_owned(), TableOutcome::skipped()),
            ],
        );

        let text = format_restore_report(&report);
        assert!(text.starts_with("Dry run: "));
        assert!(text.contains("attendance: replace by (date, activity_type) -> delete 1, insert 2, update 0"));
        assert!(text.contains("attendance_persons: skipped"));
    }

    #[test]
    fn backups_root_resolves_against_base_dir() {
        let base = Path::new("/srv/roster");
        assert_eq!(backups_root(base, None), PathBuf::from("/srv/roster/backups"));
        assert_eq!(
            backups_root(base, Some(Path::new("snapshots"))),
            PathBuf::from("/srv/roster/snapshots")
        );
        assert_eq!(
            backups_root(base, Some(Path::new("/mnt/backups"))),
            PathBuf::from("/mnt/backups")
        );
    }

    #[test]
    fn backup_list_is_one_name_per_line() {
        let names = vec!["backup_2024-01-16_09-00-00".to_owned(), "backup_2024-01-15_14-30-00".to_owned()];
        assert_eq!(
            format_backup_list(Path::new("/srv/backups"), &names),
            "Available backups in /srv/backups:\n  backup_2024-01-16_09-00-00\n  backup_2024-01-15_14-30-00"
        );
    }

    #[test]
    fn empty_backup_list_says_so() {
        let text = format_backup_list(Path::new("/srv/backups"), &[]);
        assert_eq!(text, "Available backups in /srv/backups:\n  (no backups found)");
    }
}
