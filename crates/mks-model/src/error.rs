//! Model error types.

use thiserror::Error;

/// Errors raised while building or querying the discourse model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A token ID that is not part of the loaded discourse.
    #[error("unknown discourse element: {0}")]
    TokenNotFound(String),

    /// Two tokens in the base data share an ID.
    #[error("duplicate discourse element id: {0}")]
    DuplicateToken(String),

    /// A span expression that cannot be resolved against the discourse.
    #[error("invalid span expression '{expression}': {reason}")]
    InvalidSpan { expression: String, reason: String },

    /// A fragment was built from an empty token list.
    #[error("fragment must contain at least one discourse element")]
    EmptyFragment,
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
