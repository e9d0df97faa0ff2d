//! DDL for the `trellis_meta` provenance schema, embedded at compile time.

/// One versioned DDL step.
pub struct Migration {
    pub version: i32,
    pub sql: &'static str,
}

/// All migrations in version order. [`crate::migration::run_migrations`]
/// applies the suffix newer than the database's recorded version.
pub static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("v001_provenance.sql"),
}];
