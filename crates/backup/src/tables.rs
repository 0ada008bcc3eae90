//! Table descriptors: what gets backed up, in which order, and how each
//! table is merged back on restore.
//!
//! Rules enforced by [`validate_order`]:
//! 1. Table names are unique.
//! 2. Every dependency names a listed table.
//! 3. Every dependency is listed before its dependant.

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;
use store::{Filter, Row};

use crate::natural_key::{encode_key, field_text};
use crate::BackupError;

pub const PERSONS: &str = "persons";
pub const ATTENDANCE: &str = "attendance";
pub const ATTENDANCE_PERSONS: &str = "attendance_persons";

/// How a missing natural key is filled in before an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDerivation {
    /// Base64 of the listed fields concatenated in order.
    Base64Concat(&'static [&'static str]),
}

impl KeyDerivation {
    fn derive(&self, row: &Row) -> String {
        match self {
            Self::Base64Concat(fields) => {
                let parts: Vec<String> = fields.iter().map(|f| field_text(row, f)).collect();
                encode_key(parts.iter().map(String::as_str))
            }
        }
    }
}

/// How dumped rows are reconciled with what the store currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Upsert every row on a unique natural key.
    UpsertByKey {
        key: &'static str,
        derive: Option<KeyDerivation>,
    },
    /// Delete live rows sharing any dumped row's `fields` values, then insert.
    ///
    /// Stands in for an upsert on a composite unique key, which the store's
    /// upsert primitive cannot target.
    ReplaceByFilter { fields: &'static [&'static str] },
    /// Delete every live row, then insert.
    ReplaceAll,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpsertByKey { key, .. } => write!(f, "upsert by {key}"),
            Self::ReplaceByFilter { fields } => write!(f, "replace by ({})", fields.join(", ")),
            Self::ReplaceAll => write!(f, "replace all"),
        }
    }
}

/// One table taking part in backup and restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub strategy: MergeStrategy,
    /// Tables whose rows this table references.
    pub depends_on: &'static [&'static str],
}

impl TableSpec {
    /// File name of this table's dump inside a backup directory.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.name)
    }

    /// Fill in derivable natural keys and reject rows that still lack one.
    pub fn prepare_rows(&self, mut rows: Vec<Row>) -> Result<Vec<Row>, BackupError> {
        let MergeStrategy::UpsertByKey { key, derive } = self.strategy else {
            return Ok(rows);
        };

        for (index, row) in rows.iter_mut().enumerate() {
            if has_key(row, key) {
                continue;
            }
            let derived = derive.map(|d| d.derive(row)).unwrap_or_default();
            if derived.is_empty() {
                return Err(BackupError::MissingKey {
                    table: self.name,
                    key,
                    index,
                });
            }
            row.insert(key.to_owned(), Value::String(derived));
        }
        Ok(rows)
    }

    /// Delete filters to run before inserting `rows`.
    ///
    /// For [`MergeStrategy::ReplaceByFilter`] this is one filter per distinct
    /// value combination, in first-seen order.
    pub fn delete_filters(&self, rows: &[Row]) -> Vec<Filter> {
        match &self.strategy {
            MergeStrategy::UpsertByKey { .. } => Vec::new(),
            MergeStrategy::ReplaceAll => vec![Filter::all()],
            MergeStrategy::ReplaceByFilter { fields } => {
                let mut seen = HashSet::new();
                let mut filters = Vec::new();
                for row in rows {
                    let values: Vec<Value> = fields
                        .iter()
                        .map(|f| row.get(*f).cloned().unwrap_or(Value::Null))
                        .collect();
                    if !seen.insert(Value::Array(values.clone()).to_string()) {
                        continue;
                    }
                    let filter = fields
                        .iter()
                        .zip(values)
                        .fold(Filter::all(), |filter, (field, value)| filter.eq(*field, value));
                    filters.push(filter);
                }
                filters
            }
        }
    }
}

fn has_key(row: &Row, key: &str) -> bool {
    match row.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

/// The three roster tables in dependency order.
pub fn default_tables() -> Vec<TableSpec> {
    vec![
        TableSpec {
            name: PERSONS,
            strategy: MergeStrategy::UpsertByKey {
                key: "pass_number",
                derive: Some(KeyDerivation::Base64Concat(&["first_name", "last_name", "team"])),
            },
            depends_on: &[],
        },
        TableSpec {
            name: ATTENDANCE,
            strategy: MergeStrategy::ReplaceByFilter {
                fields: &["date", "activity_type"],
            },
            depends_on: &[],
        },
        TableSpec {
            name: ATTENDANCE_PERSONS,
            strategy: MergeStrategy::ReplaceAll,
            depends_on: &[PERSONS, ATTENDANCE],
        },
    ]
}

/// Check that `tables` can be restored front to back.
pub fn validate_order(tables: &[TableSpec]) -> Result<(), BackupError> {
    let names: HashSet<&str> = tables.iter().map(|t| t.name).collect();
    let mut restored: HashSet<&str> = HashSet::new();

    for table in tables {
        for &dependency in table.depends_on {
            if !names.contains(dependency) {
                return Err(BackupError::UnknownDependency {
                    table: table.name,
                    dependency,
                });
            }
            if !restored.contains(dependency) {
                return Err(BackupError::DependencyOrder {
                    table: table.name,
                    dependency,
                });
            }
        }
        if !restored.insert(table.name) {
            return Err(BackupError::DuplicateTable(table.name));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().expect("object")
    }

    fn spec(name: &'static str) -> TableSpec {
        default_tables()
            .into_iter()
            .find(|t| t.name == name)
            .expect("known table")
    }

    #[test]
    fn default_tables_are_in_restore_order() {
        let tables = default_tables();
        let names: Vec<&str> = tables.iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["persons", "attendance", "attendance_persons"]);
        validate_order(&tables).expect("default order is valid");
    }

    #[test]
    fn link_table_before_parent_is_rejected() {
        let mut tables = default_tables();
        tables.swap(0, 2);
        assert!(matches!(
            validate_order(&tables),
            Err(BackupError::DependencyOrder { table: "attendance_persons", .. })
        ));
    }

    #[test]
    fn unknown_dependency_and_duplicates_are_rejected() {
        let tables = vec![spec(ATTENDANCE_PERSONS)];
        assert!(matches!(
            validate_order(&tables),
            Err(BackupError::UnknownDependency { dependency: "persons", .. })
        ));

        let tables = vec![spec(PERSONS), spec(PERSONS)];
        assert!(matches!(validate_order(&tables), Err(BackupError::DuplicateTable("persons"))));
    }

    #[test]
    fn distinct_pairs_become_one_filter_each() {
        let rows = vec![
            row(json!({ "date": "2024-01-15", "activity_type": "Training", "total": 10 })),
            row(json!({ "date": "2024-01-15", "activity_type": "Training", "total": 11 })),
            row(json!({ "date": "2024-01-15", "activity_type": "Match" })),
            row(json!({ "date": "2024-01-22", "activity_type": "Training" })),
        ];

        let filters = spec(ATTENDANCE).delete_filters(&rows);
        assert_eq!(filters.len(), 3);
        assert_eq!(
            filters[1],
            Filter::all()
                .eq("date", json!("2024-01-15"))
                .eq("activity_type", json!("Match"))
        );
    }

    #[test]
    fn replace_all_uses_one_unconditional_filter() {
        let filters = spec(ATTENDANCE_PERSONS).delete_filters(&[]);
        assert_eq!(filters, vec![Filter::all()]);
        assert!(spec(PERSONS).delete_filters(&[]).is_empty());
    }

    #[test]
    fn missing_pass_number_is_derived_from_name_and_team() {
        let rows = vec![
            row(json!({ "pass_number": "abc", "first_name": "Ana" })),
            row(json!({ "pass_number": " ", "first_name": "Ana", "last_name": "Müller", "team": "U10" })),
            row(json!({ "first_name": "Jonas", "last_name": "Weber", "team": "U12" })),
        ];

        let prepared = spec(PERSONS).prepare_rows(rows).expect("derivable");
        assert_eq!(prepared[0]["pass_number"], "abc");
        assert_eq!(prepared[1]["pass_number"], "QW5hTcO8bGxlclUxMA==");
        assert_eq!(prepared[2]["pass_number"], "Sm9uYXNXZWJlclUxMg==");
    }

    #[test]
    fn underivable_key_is_an_error() {
        let rows = vec![row(json!({ "birth_date": "2015-04-01" }))];
        assert!(matches!(
            spec(PERSONS).prepare_rows(rows),
            Err(BackupError::MissingKey { table: "persons", index: 0, .. })
        ));
    }

    #[test]
    fn strategies_describe_themselves() {
        assert_eq!(spec(PERSONS).strategy.to_string(), "upsert by pass_number");
        assert_eq!(spec(ATTENDANCE).strategy.to_string(), "replace by (date, activity_type)");
        assert_eq!(spec(ATTENDANCE_PERSONS).strategy.to_string(), "replace all");
    }
}
