//! `backup` crate: snapshot and restore of the roster tables.
//!
//! [`Dumper`] writes one JSON file per table plus a summary into a timestamped
//! directory; [`Loader`] replays such a directory into the store using the
//! merge strategy each [`TableSpec`] declares.

pub mod config;
pub mod dumper;
pub mod error;
pub mod layout;
pub mod loader;
pub mod models;
pub mod natural_key;
pub mod tables;

pub use config::{Config, StoreSettings};
pub use dumper::Dumper;
pub use error::{BackupError, ConfigError};
pub use loader::Loader;
pub use models::{BackupManifest, BackupRun, RestoreReport, TableDump, TableOutcome, TablePlan};
pub use tables::{default_tables, MergeStrategy, TableSpec};
