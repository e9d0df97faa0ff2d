//! Error types for the store.

use thiserror::Error;

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open or create the database (S001).
    #[error("[S001] Store connection failed: {0}")]
    ConnectionError(String),

    /// Schema migration failed (S002).
    #[error("[S002] Store migration failed: {0}")]
    MigrationError(String),

    /// SQL execution error (S003).
    #[error("[S003] Store query failed: {0}")]
    QueryError(String),

    /// Transaction management error (S004).
    #[error("[S004] Store transaction failed: {0}")]
    TransactionError(String),

    /// Generated DDL could not be applied (S005).
    #[error("[S005] Table deployment failed: {0}")]
    DeployError(String),

    /// A row does not fit the table definition (S006).
    #[error("[S006] Malformed row for table '{table}': {reason}")]
    MalformedRow { table: String, reason: String },

    /// Schema-level error from trellis-core.
    #[error(transparent)]
    Schema(#[from] trellis_core::SchemaError),

    /// DuckDB driver error with preserved source chain (S007).
    #[error("[S007] DuckDB error")]
    DuckDb(#[source] duckdb::Error),
}

/// Result type alias for [`StoreError`].
pub type StoreResult<T> = Result<T, StoreError>;

impl From<duckdb::Error> for StoreError {
    fn from(err: duckdb::Error) -> Self {
        StoreError::DuckDb(err)
    }
}

/// Attach statement context to raw DuckDB results.
pub trait StoreResultExt<T> {
    fn query_context(self, context: &str) -> StoreResult<T>;
}

impl<T> StoreResultExt<T> for Result<T, duckdb::Error> {
    fn query_context(self, context: &str) -> StoreResult<T> {
        self.map_err(|e| StoreError::QueryError(format!("{context}: {e}")))
    }
}
