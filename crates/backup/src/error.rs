//! Backup-level error types.

use std::path::PathBuf;

use thiserror::Error;

/// Pre-flight configuration problems. Nothing has touched the store or the
/// filesystem when one of these is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("store URL not set (expected {0})")]
    MissingUrl(&'static str),

    #[error("store credential not set (expected {primary} or {fallback})")]
    MissingCredential {
        primary: &'static str,
        fallback: &'static str,
    },

    /// Service credentials are JWTs; anything else is a copy/paste mistake.
    #[error("invalid store credential format: keys should start with \"{0}\"")]
    MalformedCredential(&'static str),
}

/// Errors produced by the dumper and loader.
///
/// Per-table variants are normally caught at the table boundary and recorded
/// in the manifest or report; only run-level failures reach the caller.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("backup directory not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The timestamped directory for this run already exists.
    #[error("backup directory already exists: {}", .0.display())]
    OutputExists(PathBuf),

    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed backup file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The file parsed but holds another table's dump.
    #[error("malformed backup file {}: holds table '{found}', expected '{expected}'", path.display())]
    TableMismatch {
        path: PathBuf,
        expected: &'static str,
        found: String,
    },

    /// A row has no value for the table's natural key and none can be derived.
    #[error("{table}: row {index} has no usable '{key}'")]
    MissingKey {
        table: &'static str,
        key: &'static str,
        index: usize,
    },

    // ------ Table list validation ------
    #[error("table '{0}' is listed more than once")]
    DuplicateTable(&'static str),

    #[error("table '{table}' depends on unknown table '{dependency}'")]
    UnknownDependency {
        table: &'static str,
        dependency: &'static str,
    },

    #[error("table '{table}' must come after '{dependency}'")]
    DependencyOrder {
        table: &'static str,
        dependency: &'static str,
    },
}

impl BackupError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
