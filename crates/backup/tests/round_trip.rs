//! Dump a populated store, restore into an empty one, dump again.

use std::path::Path;
use std::sync::Arc;

use backup::layout::read_json;
use backup::{Config, Dumper, Loader, StoreSettings, TableDump};
use chrono::{Local, TimeZone};
use serde_json::{json, Value};
use store::{MemoryStore, Row};

fn rows(value: Value) -> Vec<Row> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
}

fn config(base: &Path) -> Config {
    Config::new(
        StoreSettings::Postgres {
            url: "postgres://localhost/roster".into(),
        },
        base,
    )
}

fn sorted(mut data: Vec<Row>) -> Vec<String> {
    let mut out: Vec<String> = data
        .drain(..)
        .map(|r| Value::Object(r).to_string())
        .collect();
    out.sort();
    out
}

#[tokio::test]
async fn restored_store_dumps_the_same_rows() {
    let base = tempfile::tempdir().unwrap();
    let source = Arc::new(
        MemoryStore::new()
            .with_rows(
                "persons",
                rows(json!([
                    { "id": 1, "pass_number": "QW5hTcO8bGxlclUxMA==", "first_name": "Ana", "last_name": "Müller", "team": "U10" },
                    { "id": 2, "pass_number": "QmVuS2F5YVUxMg==", "first_name": "Ben", "last_name": "Kaya", "team": "U12" }
                ])),
            )
            .with_rows(
                "attendance",
                rows(json!([
                    { "id": 1, "date": "2024-01-15", "activity_type": "Training", "total": 12, "absent": 2 },
                    { "id": 2, "date": "2024-01-20", "activity_type": "Match", "total": 14, "absent": 0 }
                ])),
            )
            .with_rows(
                "attendance_persons",
                rows(json!([
                    { "id": 1, "attendance_id": 1, "person_id": 1 },
                    { "id": 2, "attendance_id": 1, "person_id": 2 },
                    { "id": 3, "attendance_id": 2, "person_id": 2 }
                ])),
            ),
    );
    let target = Arc::new(MemoryStore::new().with_unique("attendance", &["date", "activity_type"]));
    let config = config(base.path());

    let first = Dumper::new(&config, source)
        .run_at(Local.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap())
        .await
        .unwrap();
    assert!(first.is_success());
    assert_eq!(first.manifest.total_records, 7);

    let report = Loader::new(&config, target.clone())
        .unwrap()
        .restore(&first.directory)
        .await
        .unwrap();
    assert!(!report.has_failures());
    assert_eq!(report.total_restored, 7);

    let second = Dumper::new(&config, target)
        .run_at(Local.with_ymd_and_hms(2024, 1, 15, 14, 31, 0).unwrap())
        .await
        .unwrap();
    assert_ne!(first.directory, second.directory);

    for table in ["persons", "attendance", "attendance_persons"] {
        let file = format!("{table}.json");
        let before: TableDump = read_json(&first.directory.join(&file)).unwrap();
        let after: TableDump = read_json(&second.directory.join(&file)).unwrap();
        assert_eq!(before.record_count, after.record_count, "{table}");
        assert_eq!(sorted(before.data), sorted(after.data), "{table}");
    }
}
