//! The `RowStore` trait: the contract every store client must fulfil.

use async_trait::async_trait;

use crate::{Filter, Row, StoreError};

/// Row-oriented access to one hosted database.
///
/// Implementations are called strictly sequentially by the dumper and loader;
/// they need not coordinate concurrent callers.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Identifier of the store recorded in backup manifests. Must not carry secrets.
    fn endpoint(&self) -> &str;

    /// Every row of `table`, unfiltered.
    async fn select_all(&self, table: &str) -> Result<Vec<Row>, StoreError>;

    /// Insert `rows`, overwriting the attributes of rows whose `on_conflict`
    /// column already holds the same value.
    async fn upsert(&self, table: &str, rows: &[Row], on_conflict: &str)
        -> Result<(), StoreError>;

    /// Delete every row matching `filter`.
    async fn delete(&self, table: &str, filter: &Filter) -> Result<(), StoreError>;

    /// Insert `rows` as new records.
    async fn insert(&self, table: &str, rows: &[Row]) -> Result<(), StoreError>;

    /// Whether [`RowStore::replace`] runs as a single transaction.
    fn is_transactional(&self) -> bool {
        false
    }

    /// Delete the rows matched by each filter, then insert `rows`.
    ///
    /// The default runs each step as its own call: a failure after the deletes
    /// leaves the table short of the deleted rows.
    async fn replace(
        &self,
        table: &str,
        filters: &[Filter],
        rows: &[Row],
    ) -> Result<(), StoreError> {
        for filter in filters {
            self.delete(table, filter).await?;
        }
        self.insert(table, rows).await
    }
}
