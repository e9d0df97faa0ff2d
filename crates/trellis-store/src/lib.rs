//! DuckDB-backed store for Trellis.
//!
//! Owns the pipeline database: user data tables generated from the schema
//! graph plus the `trellis_meta` provenance schema, with versioned
//! migrations and a closure transaction helper. All mutation from the
//! engine flows through [`Store::transaction`].

pub mod connection;
pub mod ddl;
pub mod error;
pub mod migration;
pub mod rows;
pub mod schema;

pub use connection::Store;
pub use error::{StoreError, StoreResult, StoreResultExt};
