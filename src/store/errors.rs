//! # Store Errors
//!
//! Error types surfaced by store backends. A store error fails the query
//! branch that issued the read or watch; the engine performs no retries.

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Caller is not allowed to read this path
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Store is unreachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Path is malformed for this backend
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Internal backend error
    #[error("Internal store error: {0}")]
    Internal(String),
}
