//! Typed error type for the store crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never produced a response (DNS, TLS, connection reset, …).
    #[error("request for '{table}' failed: {source}")]
    Transport {
        table: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The data API answered with a non-success status.
    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },

    /// The response body could not be read as rows.
    #[error("unexpected response for '{table}': {detail}")]
    Decode { table: String, detail: String },

    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Table or column name that cannot be safely quoted.
    #[error("invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// Credential cannot be sent as an HTTP header.
    #[error("credential is not a valid header value")]
    InvalidCredential,

    /// The store refused the operation (constraint violation, injected failure, …).
    #[error("{0}")]
    Rejected(String),
}
