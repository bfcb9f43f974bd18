//! # Domain Error Types
//!
//! Error types for pure business logic. These never carry I/O failures;
//! database and network errors live in their own crates.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Domain-level errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A base-36 string contained a symbol outside `A-Z0-9`.
    #[error("invalid base-36 symbol '{symbol}' in \"{input}\"")]
    InvalidBase36Symbol { symbol: char, input: String },

    /// A base-36 string was empty.
    #[error("cannot decode an empty base-36 string")]
    EmptyBase36,

    /// A decoded base-36 value overflowed u64.
    #[error("base-36 value \"{0}\" overflows u64")]
    Base36Overflow(String),

    /// An illegal lifecycle transition was requested.
    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// A business rule was violated.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl CoreError {
    /// Shorthand for a validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }
}
