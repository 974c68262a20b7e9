//! # Engine Errors
//!
//! Error types for query-tree execution. A branch failure propagates
//! through its sibling combinator to the caller; cancellation is a normal
//! terminal transition and never appears here.

use thiserror::Error;

use crate::store::StoreError;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine errors
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A binding modifier resolved to a value of the wrong kind
    #[error("Invalid {modifier} modifier: {detail}")]
    InvalidModifier {
        /// Which modifier was malformed
        modifier: &'static str,
        /// What was wrong with it
        detail: String,
    },

    /// A node imports the name it exports
    #[error("Circular import of '{0}'")]
    CircularImport(String),

    /// Scope chain grew past the configured bound
    #[error("Scope depth exceeded (max: {0})")]
    DepthExceeded(usize),

    /// A store read or watch failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
