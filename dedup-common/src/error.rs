//! Common error types for the reconciliation pipeline

use thiserror::Error;

/// Common result type for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the reconciliation crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input record or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unresolved match conflict under the strict conflict policy
    #[error("Match conflict: {0}")]
    Conflict(String),

    /// Internal engine error
    #[error("Internal error: {0}")]
    Internal(String),
}
