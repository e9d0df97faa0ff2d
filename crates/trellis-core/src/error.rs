//! Error types for trellis-core

use thiserror::Error;

/// Schema definition, graph construction, and configuration errors.
///
/// Structural errors are fatal: they are raised while the graph is being
/// built and are never recovered at population time.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// G001: Table name already registered
    #[error("[G001] Duplicate table: {name}")]
    DuplicateTable { name: String },

    /// G002: Foreign key references a table that has not been registered
    #[error("[G002] Foreign key on '{table}' references undefined table '{parent}'")]
    UndefinedParent { table: String, parent: String },

    /// G003: Adding the edge would introduce a cycle
    #[error("[G003] Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// G004: Foreign-key attribute mapping is malformed
    #[error("[G004] Malformed foreign key on '{table}' -> '{parent}': {reason}")]
    MalformedForeignKey {
        table: String,
        parent: String,
        reason: String,
    },

    /// G005: Table definition violates its tier's invariants
    #[error("[G005] Tier violation for '{table}': {reason}")]
    TierViolation { table: String, reason: String },

    /// G006: Table not found in the graph
    #[error("[G006] Unknown table: {name}")]
    UnknownTable { name: String },

    /// G007: Attribute referenced but not defined on the table
    #[error("[G007] Unknown attribute '{attribute}' on table '{table}'")]
    UnknownAttribute { table: String, attribute: String },

    /// G008: Name is empty or not a valid identifier
    #[error("[G008] Invalid name '{name}' for {context}")]
    InvalidName { name: String, context: String },

    /// G009: Table has no primary-key attribute
    #[error("[G009] Table '{table}' declares no primary-key attribute")]
    EmptyPrimaryKey { table: String },

    /// G010: Configuration file could not be read
    #[error("[G010] Failed to read '{path}': {source}")]
    ConfigIo {
        path: String,
        source: std::io::Error,
    },

    /// G011: Configuration parse error
    #[error("[G011] Failed to parse config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// JSON error (key canonicalization)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for [`SchemaError`]
pub type CoreResult<T> = Result<T, SchemaError>;
