//! Persistence error types.
//!
//! All persistence operations return structured errors that provide
//! user-friendly messages and optional remediation hints.

use std::path::PathBuf;

use mks_core::CoreError;
use mks_model::ModelError;
use thiserror::Error;

/// Persistence operation error.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// File I/O error.
    #[error("Failed to {operation} file: {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not well-formed or has the wrong root element.
    #[error("Invalid {kind} file {path}: {reason}")]
    InvalidFormat {
        kind: &'static str,
        path: PathBuf,
        reason: String,
    },

    /// Base data could not be turned into a discourse.
    #[error("Invalid base data in {path}")]
    BaseData {
        path: PathBuf,
        #[source]
        source: ModelError,
    },

    /// The chart rejected a level.
    #[error("Could not set up level '{level}'")]
    Level {
        level: String,
        #[source]
        source: CoreError,
    },

    /// Settings file could not be parsed or written.
    #[error("Invalid settings file: {path}")]
    Settings { path: PathBuf, reason: String },

    /// Serialization error.
    #[error("Failed to serialize level data")]
    Serialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Atomic write failed (temp file couldn't be renamed).
    #[error("Failed to complete save operation")]
    AtomicWriteFailed {
        temp_path: PathBuf,
        target_path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PersistenceError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(kind: &'static str, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            kind,
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Get a user-friendly message for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Io {
                operation, path, ..
            } => {
                format!("Could not {} the file at {}", operation, path.display())
            }
            Self::InvalidFormat { kind, path, reason } => {
                format!(
                    "The file at {} is not a valid {} file: {}",
                    path.display(),
                    kind,
                    reason
                )
            }
            Self::BaseData { path, source } => {
                format!("The base data in {} cannot be used: {}", path.display(), source)
            }
            Self::Level { level, source } => {
                format!("The level '{level}' could not be added to the project: {source}")
            }
            Self::Settings { path, reason } => {
                format!("The settings file {} could not be used: {}", path.display(), reason)
            }
            Self::Serialization { .. } => "An error occurred while writing the level data.".to_string(),
            Self::AtomicWriteFailed { target_path, .. } => {
                format!(
                    "Could not save the file to {}. Please check disk space and permissions.",
                    target_path.display()
                )
            }
        }
    }

    /// Get a suggestion for how to resolve this error.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Io { operation, .. } => {
                if *operation == "read" {
                    Some("Check that the file exists and you have permission to read it.".into())
                } else {
                    Some("Check that you have permission to write to this location.".into())
                }
            }
            Self::InvalidFormat { .. } => Some("Check the file for unbalanced tags or a wrong root element.".into()),
            Self::BaseData { .. } => Some("Every word needs a unique id attribute.".into()),
            Self::Level { .. } => Some("Give every level in the project file a distinct name.".into()),
            Self::Settings { .. } => Some("Fix the setting or delete the file to fall back to defaults.".into()),
            Self::Serialization { .. } => None,
            Self::AtomicWriteFailed { .. } => {
                Some("Free up disk space or try saving to a different location.".into())
            }
        }
    }
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
