//! `store` crate: the row-oriented boundary to the hosted database.
//!
//! Everything above this crate sees tables as lists of JSON objects and talks
//! to them through [`RowStore`]. No table knows its own schema here; merge
//! rules and ordering belong to the `backup` crate.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod rest;
pub mod row;
pub mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use rest::RestStore;
pub use row::{Filter, Row};
pub use traits::RowStore;
