//! Error types for listing, transfer and sizing operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the nestfs engine.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Path resolves to nothing, real or virtual.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// The external archive tool is missing or failed.
    #[error("{tool} is required to read {archive}: {message}")]
    ToolUnavailable {
        tool: String,
        archive: PathBuf,
        message: String,
    },

    /// Some items of a batch failed while others succeeded.
    #[error("{failed} of {total} items failed")]
    PartialFailure { failed: usize, total: usize },

    /// Archive ascent gave up before finding a real file.
    #[error("Gave up resolving {path} after {depth} levels")]
    Exhausted { path: PathBuf, depth: usize },

    /// The builtin reader could not parse an archive.
    #[error("Cannot read archive {archive}: {message}")]
    Archive { archive: PathBuf, message: String },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A background task panicked or was cancelled.
    #[error("Task failed: {message}")]
    Task { message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl VfsError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create a not-found error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a task error from a join failure.
    pub fn task(error: impl std::fmt::Display) -> Self {
        Self::Task {
            message: error.to_string(),
        }
    }

    /// Whether the path simply does not exist, really or virtually.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Exhausted { .. })
    }
}

/// A per-item failure recorded during a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    /// The path that caused the error.
    pub path: PathBuf,
    /// A human-readable error message.
    pub message: String,
}

impl OperationError {
    /// Create a new operation error.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}
