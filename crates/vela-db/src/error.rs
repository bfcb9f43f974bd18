//! # Database Error Types
//!
//! Error types for local-store operations.
//!
//! ## Error Flow
//! ```text
//! SQLite error (sqlx::Error)
//!      │
//!      ▼
//! DbError (this module)  ← adds context and categorization
//!      │
//!      ▼
//! SyncError / caller     ← surfaced asynchronously, never across a
//!                          domain-operation boundary
//! ```

use thiserror::Error;

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Local durable store errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found by its business key.
    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    /// The on-disk schema is behind what this build expects.
    ///
    /// Operations MUST fail fast with this error rather than silently
    /// behaving as empty; the caller has to run migrations (or reset).
    #[error("database schema out of date: found version {found}, need {expected} - upgrade required")]
    SchemaOutOfDate { found: i64, expected: i64 },

    /// A domain rule rejected the operation before any write happened.
    #[error(transparent)]
    Domain(#[from] vela_core::CoreError),

    /// Database connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// A JSON column could not be encoded or decoded.
    #[error("bad JSON column: {0}")]
    BadJson(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and business key.
    pub fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("row", "<unknown>"),
            sqlx::Error::PoolTimedOut => DbError::ConnectionFailed("pool timed out".into()),
            other => DbError::QueryFailed(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::BadJson(err.to_string())
    }
}
