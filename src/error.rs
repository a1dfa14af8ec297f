//! Error types for scanbase
//!
//! Provides structured error types with context for better debugging
//! and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for scanbase operations
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Collection Errors
    // ==========================================================================
    #[error("Collection '{name}' does not exist")]
    CollectionNotFound { name: String },

    #[error("Collection '{name}' already exists")]
    CollectionAlreadyExists { name: String },

    // ==========================================================================
    // Field Errors
    // ==========================================================================
    #[error("Field '{field}' does not exist in collection '{collection}'")]
    FieldNotFound { collection: String, field: String },

    #[error("Field '{field}' already exists in collection '{collection}'")]
    FieldAlreadyExists { collection: String, field: String },

    #[error("Type mismatch for field '{field}': expected {expected}, got '{value}'")]
    TypeMismatch {
        field: String,
        expected: String,
        value: String,
    },

    // ==========================================================================
    // Document Errors
    // ==========================================================================
    #[error("Document '{key}' not found in collection '{collection}'")]
    DocumentNotFound { collection: String, key: String },

    #[error("Document '{key}' already exists in collection '{collection}'")]
    DocumentAlreadyExists { collection: String, key: String },

    // ==========================================================================
    // Project Errors
    // ==========================================================================
    #[error("A project already exists at '{path}'")]
    ProjectAlreadyExists { path: PathBuf },

    #[error("No project found at '{path}'")]
    ProjectNotFound { path: PathBuf },

    // ==========================================================================
    // Filter and Query Errors
    // ==========================================================================
    #[error("Invalid filter: {message}")]
    InvalidFilter { message: String },

    #[error("Value parse error: {message}")]
    ParseError { message: String },

    // ==========================================================================
    // Import Errors
    // ==========================================================================
    #[error("Import failed for '{path}': {reason}")]
    ImportFailed { path: PathBuf, reason: String },

    // ==========================================================================
    // History Errors
    // ==========================================================================
    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    // ==========================================================================
    // IO Errors
    // ==========================================================================
    #[error("Failed to read file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ==========================================================================
    // Serialization Errors
    // ==========================================================================
    #[error("Failed to parse YAML: {message}")]
    YamlParseError { message: String },

    #[error("Failed to serialize to YAML: {message}")]
    YamlSerializeError { message: String },

    #[error("Failed to parse JSON: {message}")]
    JsonParseError { message: String },

    // ==========================================================================
    // Catch-all
    // ==========================================================================
    #[error("{0}")]
    Other(String),
}

/// Result type alias for scanbase operations
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Conversions from external error types
// =============================================================================

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::YamlParseError {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonParseError {
            message: err.to_string(),
        }
    }
}

impl From<scanql::ParseError> for Error {
    fn from(err: scanql::ParseError) -> Self {
        Error::ParseError {
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Error Display Helpers
// =============================================================================

impl Error {
    /// Returns a user-friendly suggestion for fixing the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::CollectionNotFound { .. } => {
                Some("Built-in collections are 'current', 'initial' and 'brick'")
            }
            Error::DocumentNotFound { .. } => {
                Some("Scan keys are project-relative paths like 'data/raw_data/scan.nii'")
            }
            Error::TypeMismatch { .. } => {
                Some("Dates are dd/mm/yyyy, booleans are 'true'/'false', lists render as ['a', 'b']")
            }
            Error::InvalidFilter { .. } => {
                Some("A filter's nots/fields/conditions/values rows must have equal length, with one fewer link")
            }
            Error::ProjectNotFound { .. } => {
                Some("Initialize a project first with: scanbase init <path>")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CollectionNotFound {
            name: "derived".to_string(),
        };
        assert_eq!(err.to_string(), "Collection 'derived' does not exist");
    }

    #[test]
    fn test_type_mismatch_display() {
        let err = Error::TypeMismatch {
            field: "BandWidth".to_string(),
            expected: "float".to_string(),
            value: "fast".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Type mismatch for field 'BandWidth': expected float, got 'fast'"
        );
    }

    #[test]
    fn test_error_suggestion() {
        let err = Error::ProjectNotFound {
            path: PathBuf::from("/tmp/nope"),
        };
        assert!(err.suggestion().is_some());
    }
}
