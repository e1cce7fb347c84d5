//! Engine error types.

use mks_model::ModelError;
use thiserror::Error;

/// Errors raised by level and chart operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A discourse lookup or span problem.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// No level with this name (case-insensitive).
    #[error("unknown level: {0}")]
    UnknownLevel(String),

    /// A level with this name is already part of the chart.
    #[error("level already exists: {0}")]
    DuplicateLevel(String),

    /// No markable with this ID on the level.
    #[error("unknown markable '{id}' on level '{level}'")]
    UnknownMarkable { level: String, id: String },

    /// Markable IDs must be unique within a level.
    #[error("markable id '{id}' already exists on level '{level}'")]
    DuplicateMarkable { level: String, id: String },

    /// The attribute does not drive a relation of the expected kind.
    #[error("attribute '{attribute}' is not a {expected} relation on level '{level}'")]
    UnknownRelation {
        level: String,
        attribute: String,
        expected: &'static str,
    },

    /// More members than the set relation allows.
    #[error("attribute '{attribute}' allows at most {max} members per set, got {requested}")]
    SetTooLarge {
        attribute: String,
        max: usize,
        requested: usize,
    },

    /// A markable must cover at least one token.
    #[error("a markable needs at least one discourse element")]
    EmptySpan,

    /// A query pattern that does not compile.
    #[error("invalid query pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, CoreError>;
