//! `MemoryStore`: an in-process test double for `RowStore`.
//!
//! Useful in unit and integration tests where the hosted database is either
//! unavailable or irrelevant. Tables can be seeded, given unique constraints,
//! and made to fail on chosen operations.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::{Filter, Row, RowStore, StoreError};

/// Store operation, used for failure injection and call recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Select,
    Upsert,
    Delete,
    Insert,
}

/// A single call observed by the store, in call order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub op: StoreOp,
    pub table: String,
    /// Rows sent with the call (0 for select and delete).
    pub rows: usize,
}

/// A store that keeps every table in memory.
pub struct MemoryStore {
    endpoint: String,
    tables: Mutex<HashMap<String, Vec<Row>>>,
    unique: HashMap<String, Vec<String>>,
    failures: HashMap<(String, StoreOp), String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            endpoint: "memory://local".to_owned(),
            tables: Mutex::new(HashMap::new()),
            unique: HashMap::new(),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Seed `table` with `rows`, replacing anything already there.
    pub fn with_rows(self, table: impl Into<String>, rows: Vec<Row>) -> Self {
        lock(&self.tables).insert(table.into(), rows);
        self
    }

    /// Enforce uniqueness of the column tuple `columns` on insert.
    pub fn with_unique(mut self, table: impl Into<String>, columns: &[&str]) -> Self {
        self.unique
            .insert(table.into(), columns.iter().map(|c| (*c).to_owned()).collect());
        self
    }

    /// Make every `op` on `table` fail with `message`.
    pub fn failing(mut self, table: impl Into<String>, op: StoreOp, message: impl Into<String>) -> Self {
        self.failures.insert((table.into(), op), message.into());
        self
    }

    /// Current contents of `table` (empty if it was never written).
    pub fn rows(&self, table: &str) -> Vec<Row> {
        lock(&self.tables).get(table).cloned().unwrap_or_default()
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Calls that would have changed data.
    pub fn mutation_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.op != StoreOp::Select)
            .count()
    }

    fn record(&self, op: StoreOp, table: &str, rows: usize) -> Result<(), StoreError> {
        lock(&self.calls).push(RecordedCall {
            op,
            table: table.to_owned(),
            rows,
        });
        match self.failures.get(&(table.to_owned(), op)) {
            Some(message) => Err(StoreError::Rejected(message.clone())),
            None => Ok(()),
        }
    }

    fn unique_key(&self, table: &str, row: &Row) -> Option<String> {
        let columns = self.unique.get(table)?;
        let values: Vec<&Value> = columns
            .iter()
            .map(|c| row.get(c).unwrap_or(&Value::Null))
            .collect();
        Some(serde_json::to_string(&values).unwrap_or_default())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl RowStore for MemoryStore {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn select_all(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        self.record(StoreOp::Select, table, 0)?;
        Ok(self.rows(table))
    }

    async fn upsert(&self, table: &str, rows: &[Row], on_conflict: &str) -> Result<(), StoreError> {
        self.record(StoreOp::Upsert, table, rows.len())?;

        if rows.iter().any(|r| r.get(on_conflict).map_or(true, Value::is_null)) {
            return Err(StoreError::Rejected(format!(
                "null value in column \"{on_conflict}\" violates not-null constraint"
            )));
        }

        let mut tables = lock(&self.tables);
        let existing = tables.entry(table.to_owned()).or_default();
        for row in rows {
            let key = &row[on_conflict];
            match existing.iter_mut().find(|e| e.get(on_conflict) == Some(key)) {
                Some(current) => {
                    for (column, value) in row {
                        current.insert(column.clone(), value.clone());
                    }
                }
                None => existing.push(row.clone()),
            }
        }
        Ok(())
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<(), StoreError> {
        self.record(StoreOp::Delete, table, 0)?;
        if let Some(existing) = lock(&self.tables).get_mut(table) {
            existing.retain(|row| !filter.matches(row));
        }
        Ok(())
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<(), StoreError> {
        self.record(StoreOp::Insert, table, rows.len())?;

        let mut tables = lock(&self.tables);
        let existing = tables.entry(table.to_owned()).or_default();

        if self.unique.contains_key(table) {
            let mut seen: HashSet<String> = existing
                .iter()
                .filter_map(|row| self.unique_key(table, row))
                .collect();
            for row in rows {
                if let Some(key) = self.unique_key(table, row) {
                    if !seen.insert(key.clone()) {
                        return Err(StoreError::Rejected(format!(
                            "duplicate key value violates unique constraint on {table}: {key}"
                        )));
                    }
                }
            }
        }

        existing.extend(rows.iter().cloned());
        Ok(())
    }
}
