//! `PgStore`: direct Postgres connection to the same database.
//!
//! Rows travel as JSONB in both directions (`to_jsonb` on the way out,
//! `jsonb_populate_recordset` on the way in), so the store stays schema-agnostic
//! like the HTTP client. Unlike the HTTP client it can run a table's
//! delete+insert as one transaction.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use tracing::info;

use crate::{Filter, Row, RowStore, StoreError};

pub struct PgStore {
    pool: PgPool,
    endpoint: String,
}

impl PgStore {
    /// Connect to `database_url`.
    ///
    /// `max_connections` controls the pool ceiling; the dumper and loader only
    /// ever use one connection at a time.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let endpoint = redact_password(database_url);
        info!("Connecting to {} (max_connections={})", endpoint, max_connections);
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool, endpoint })
    }
}

/// Hide the password part of a connection URL.
pub fn redact_password(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_owned();
    };
    let authority_start = scheme_end + 3;
    let rest = &url[authority_start..];
    let Some(at) = rest.rfind('@') else {
        return url.to_owned();
    };
    match rest[..at].find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &url[..authority_start],
            &rest[..colon],
            &rest[at..]
        ),
        None => url.to_owned(),
    }
}

/// Quote a table or column name after checking it is a plain identifier.
pub(crate) fn quote_ident(name: &str) -> Result<String, StoreError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(format!("\"{name}\""))
    } else {
        Err(StoreError::InvalidIdentifier(name.to_owned()))
    }
}

/// Union of the columns present in `rows`, in first-seen order.
fn columns_of(rows: &[Row]) -> Vec<&str> {
    let mut columns: Vec<&str> = Vec::new();
    for column in rows.iter().flat_map(|row| row.keys()) {
        if !columns.contains(&column.as_str()) {
            columns.push(column);
        }
    }
    columns
}

/// `INSERT … SELECT … FROM jsonb_populate_recordset(…)`, optionally with an upsert clause.
pub(crate) fn insert_sql(
    table: &str,
    rows: &[Row],
    on_conflict: Option<&str>,
) -> Result<String, StoreError> {
    let table = quote_ident(table)?;
    let columns = columns_of(rows)
        .into_iter()
        .map(|c| quote_ident(c).map(|quoted| (c, quoted)))
        .collect::<Result<Vec<_>, _>>()?;
    let column_list = columns
        .iter()
        .map(|(_, quoted)| quoted.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "INSERT INTO {table} ({column_list}) \
         SELECT {column_list} FROM jsonb_populate_recordset(NULL::{table}, $1)"
    );

    if let Some(key) = on_conflict {
        let key_quoted = quote_ident(key)?;
        let updates = columns
            .iter()
            .filter(|(name, _)| *name != key)
            .map(|(_, quoted)| format!("{quoted} = EXCLUDED.{quoted}"))
            .collect::<Vec<_>>();
        if updates.is_empty() {
            sql.push_str(&format!(" ON CONFLICT ({key_quoted}) DO NOTHING"));
        } else {
            sql.push_str(&format!(
                " ON CONFLICT ({key_quoted}) DO UPDATE SET {}",
                updates.join(", ")
            ));
        }
    }
    Ok(sql)
}

/// `DELETE` with one `$n` placeholder per filter condition, compared as JSONB.
pub(crate) fn delete_sql(table: &str, filter: &Filter) -> Result<String, StoreError> {
    let table = quote_ident(table)?;
    let mut sql = format!("DELETE FROM {table} AS t");
    for (index, (column, _)) in filter.conditions().iter().enumerate() {
        quote_ident(column)?;
        let keyword = if index == 0 { "WHERE" } else { "AND" };
        sql.push_str(&format!(
            " {keyword} to_jsonb(t) -> '{column}' = ${}::jsonb",
            index + 1
        ));
    }
    Ok(sql)
}

async fn insert_rows<'e, E: PgExecutor<'e>>(
    executor: E,
    table: &str,
    rows: &[Row],
    on_conflict: Option<&str>,
) -> Result<(), StoreError> {
    if rows.is_empty() {
        return Ok(());
    }
    let sql = insert_sql(table, rows, on_conflict)?;
    sqlx::query(&sql)
        .bind(Json(rows.to_vec()))
        .execute(executor)
        .await?;
    Ok(())
}

async fn delete_rows<'e, E: PgExecutor<'e>>(
    executor: E,
    table: &str,
    filter: &Filter,
) -> Result<(), StoreError> {
    let sql = delete_sql(table, filter)?;
    let mut query = sqlx::query(&sql);
    for (_, value) in filter.conditions() {
        query = query.bind(Json(value.clone()));
    }
    query.execute(executor).await?;
    Ok(())
}

#[async_trait]
impl RowStore for PgStore {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn select_all(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let sql = format!("SELECT to_jsonb(t) FROM {} AS t", quote_ident(table)?);
        let rows: Vec<Json<Row>> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|Json(row)| row).collect())
    }

    async fn upsert(&self, table: &str, rows: &[Row], on_conflict: &str) -> Result<(), StoreError> {
        insert_rows(&self.pool, table, rows, Some(on_conflict)).await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<(), StoreError> {
        delete_rows(&self.pool, table, filter).await
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<(), StoreError> {
        insert_rows(&self.pool, table, rows, None).await
    }

    fn is_transactional(&self) -> bool {
        true
    }

    async fn replace(
        &self,
        table: &str,
        filters: &[Filter],
        rows: &[Row],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for filter in filters {
            delete_rows(&mut *tx, table, filter).await?;
        }
        insert_rows(&mut *tx, table, rows, None).await?;
        tx.commit().await?;
        Ok(())
    }
}
