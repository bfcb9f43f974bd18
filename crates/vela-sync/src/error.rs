//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Server              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Unreachable    │  │  Status                 │ │
//! │  │  ConfigLoad/    │  │  Timeout        │  │  MissingServerId        │ │
//! │  │  ConfigSave     │  │  WebSocket      │  │  BadResponse            │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │  Authentication │  │  Database (wrapped DbError)                 │  │
//! │  │  AuthFailed     │  │  sync reads/writes to the local store       │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these ever crosses a domain-operation boundary: sync failures are
//! recorded on the queue and surfaced through the event bus.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid terminal configuration.
    #[error("Invalid terminal configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The admin server cannot be reached.
    #[error("Cannot reach admin server at {0}")]
    Unreachable(String),

    /// Request timed out.
    #[error("Connection to {0} timed out")]
    Timeout(String),

    /// Generic network failure.
    #[error("Network error communicating with {url}: {message}")]
    Network { url: String, message: String },

    /// WebSocket protocol error on the realtime channel.
    #[error("Realtime channel error: {0}")]
    WebSocket(String),

    // =========================================================================
    // Server Errors
    // =========================================================================
    /// Non-success HTTP status, mapped to a friendly message.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// The server response did not contain what the engine needs.
    #[error("Unexpected server response: {0}")]
    BadResponse(String),

    /// A replay needs the parent's server id, which has not been backfilled.
    #[error("{entity} '{key}' has no server id yet")]
    MissingServerId { entity: &'static str, key: String },

    // =========================================================================
    // Authentication Errors
    // =========================================================================
    /// Token refresh failed; the terminal must re-authenticate.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    // =========================================================================
    // Database / Serialization
    // =========================================================================
    /// Local store access failed.
    #[error(transparent)]
    Database(#[from] vela_db::DbError),

    /// Payload (de)serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl SyncError {
    /// Whether retrying the same call later can reasonably succeed.
    ///
    /// Client-side 4xx responses (other than 401/408/429) are permanent: the
    /// payload itself is rejected, and replaying it forever only hides the
    /// bug.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Unreachable(_)
            | SyncError::Timeout(_)
            | SyncError::Network { .. }
            | SyncError::WebSocket(_)
            | SyncError::MissingServerId { .. } => true,
            SyncError::Status { status, .. } => {
                !(400..500).contains(status) || matches!(status, 401 | 408 | 429)
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}
