//! Error types for extraction, repository and build operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used across the megadoc crates.
pub type Result<T, E = MegaDocError> = std::result::Result<T, E>;

/// Kind of security violation detected while validating a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityThreat {
    /// Resolved path lies outside the repository base directory.
    PathTraversal,
    /// Path has more segments than the configured depth limit.
    PathTooDeep,
}

/// Errors that can occur while building a mega document.
#[derive(Debug, Error)]
pub enum MegaDocError {
    /// A referenced file is missing, unreadable or too large.
    #[error("Validation failed for {path}: {reason}")]
    FileValidation { path: String, reason: String },

    /// A path failed the traversal or depth policy.
    #[error("{message}")]
    Security {
        message: String,
        threat: SecurityThreat,
    },

    /// No usable file paths were found in a review document.
    #[error("Failed to extract file paths from {content_source}: {reason}")]
    Extraction {
        content_source: String,
        reason: String,
    },

    /// The output document could not be written.
    #[error("Failed to build document {}: {reason}", output.display())]
    Build { output: PathBuf, reason: String },

    /// A configuration setting is unusable.
    #[error("{message}")]
    Configuration {
        message: String,
        key: Option<String>,
    },
}

impl MegaDocError {
    /// Create a file validation error.
    pub fn validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FileValidation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a file validation error from an I/O failure.
    pub fn io(path: impl Into<String>, source: &std::io::Error) -> Self {
        let reason = match source.kind() {
            std::io::ErrorKind::NotFound => "File does not exist".to_string(),
            std::io::ErrorKind::PermissionDenied => "File not readable: permission denied".to_string(),
            _ => format!("I/O error: {source}"),
        };
        Self::validation(path, reason)
    }

    /// Create a path traversal error.
    pub fn traversal(path: impl std::fmt::Display) -> Self {
        Self::Security {
            message: format!("Path traversal detected: {path}"),
            threat: SecurityThreat::PathTraversal,
        }
    }

    /// Create a depth limit error.
    pub fn too_deep(path: impl std::fmt::Display, depth: usize, max: usize) -> Self {
        Self::Security {
            message: format!("Path too deep: {path} ({depth} levels, max {max})"),
            threat: SecurityThreat::PathTooDeep,
        }
    }

    /// Create an extraction error.
    pub fn extraction(content_source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Extraction {
            content_source: content_source.into(),
            reason: reason.into(),
        }
    }

    /// Create a build error.
    pub fn build(output: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Build {
            output: output.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error tied to a specific option.
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Stable code identifying the error kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::FileValidation { .. } => "FILE_VALIDATION",
            Self::Security { .. } => "SECURITY",
            Self::Extraction { .. } => "EXTRACTION",
            Self::Build { .. } => "BUILD",
            Self::Configuration { .. } => "CONFIG",
        }
    }

    /// Whether a build can skip the offending file and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::FileValidation { .. } | Self::Security { .. })
    }
}
