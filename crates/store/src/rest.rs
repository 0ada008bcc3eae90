//! `RestStore`: the hosted data API (PostgREST dialect) over HTTPS.
//!
//! Every table lives at `<base_url>/rest/v1/<table>`. The credential travels
//! both as the `apikey` header and as a bearer token, which is what the
//! service expects from service-role clients.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::debug;

use crate::{Filter, Row, RowStore, StoreError};

/// The data API caps a single response at this many rows by default.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

const ROW_ID_COLUMN: &str = "id";

pub struct RestStore {
    client: Client,
    base_url: String,
    page_size: usize,
}

impl RestStore {
    /// Build a client for `base_url` authenticated with `api_key`.
    pub fn new(base_url: impl Into<String>, api_key: &str) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key).map_err(|_| StoreError::InvalidCredential)?;
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| StoreError::InvalidCredential)?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(StoreError::Client)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Override the number of rows requested per page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn post_rows(
        &self,
        table: &str,
        rows: &[Row],
        query: &[(&str, &str)],
        prefer: &str,
    ) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.table_url(table))
            .query(query)
            .header("Prefer", prefer)
            .json(rows)
            .send()
            .await
            .map_err(|source| transport(table, source))?;
        check(response).await?;
        Ok(())
    }
}

fn transport(table: &str, source: reqwest::Error) -> StoreError {
    StoreError::Transport {
        table: table.to_owned(),
        source,
    }
}

/// Turn a non-success response into [`StoreError::Api`].
async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Api {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// The data API reports errors as `{"message": …, "details": …}`; fall back to the raw body.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned())
}

/// Translate a [`Filter`] into PostgREST query parameters.
///
/// The API refuses unfiltered deletes, so an empty filter selects every row
/// through a condition on the row id that is always true.
pub(crate) fn filter_params(filter: &Filter) -> Vec<(String, String)> {
    if filter.is_unconditional() {
        return vec![(ROW_ID_COLUMN.to_owned(), "not.is.null".to_owned())];
    }
    filter
        .conditions()
        .iter()
        .map(|(column, value)| {
            let condition = match value {
                Value::Null => "is.null".to_owned(),
                Value::String(s) => format!("eq.{s}"),
                other => format!("eq.{other}"),
            };
            (column.clone(), condition)
        })
        .collect()
}

#[async_trait]
impl RowStore for RestStore {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn select_all(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let mut rows = Vec::new();
        let order = format!("{ROW_ID_COLUMN}.asc");
        let limit = self.page_size.to_string();

        loop {
            let offset = rows.len().to_string();
            let response = self
                .client
                .get(self.table_url(table))
                .query(&[
                    ("select", "*"),
                    ("order", order.as_str()),
                    ("offset", offset.as_str()),
                    ("limit", limit.as_str()),
                ])
                .send()
                .await
                .map_err(|source| transport(table, source))?;

            let page: Vec<Row> = check(response)
                .await?
                .json()
                .await
                .map_err(|e| StoreError::Decode {
                    table: table.to_owned(),
                    detail: e.to_string(),
                })?;

            // The server may cap a page below `limit`, so only an empty page ends the table.
            if page.is_empty() {
                return Ok(rows);
            }
            let fetched = page.len();
            rows.extend(page);
            debug!(table, fetched, total = rows.len(), "fetched page");
        }
    }

    async fn upsert(&self, table: &str, rows: &[Row], on_conflict: &str) -> Result<(), StoreError> {
        self.post_rows(
            table,
            rows,
            &[("on_conflict", on_conflict)],
            "resolution=merge-duplicates,return=minimal",
        )
        .await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.table_url(table))
            .query(&filter_params(filter))
            .header("Prefer", "return=minimal")
            .send()
            .await
            .map_err(|source| transport(table, source))?;
        check(response).await?;
        Ok(())
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<(), StoreError> {
        self.post_rows(table, rows, &[], "return=minimal").await
    }
}
