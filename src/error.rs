//! Error types for the build-avoidance engine.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Snapshot storage errors.
///
/// Raised while writing the durable build state. On the read path these never reach the
/// caller: an unreadable snapshot escalates the build instead.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Snapshot I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid snapshot header in {path:?}: {reason}")]
    InvalidHeader { path: PathBuf, reason: String },

    #[error("Snapshot version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Snapshot checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Snapshot serialization error: {0}")]
    Serialization(String),
}

/// Errors surfaced by build contexts.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Resource unavailable: {path:?}: {source}")]
    ResourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Attribute '{key}' could not be converted: {reason}")]
    Attribute { key: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{context}: {cause:#}")]
    Callback {
        context: String,
        cause: anyhow::Error,
    },
}

impl BuildError {
    /// Error for an operation attempted on a committed context.
    pub(crate) fn closed() -> Self {
        BuildError::InvalidState("build context is closed".to_string())
    }

    /// Map an I/O failure observed while reading a resource.
    ///
    /// Missing, non-regular and unreadable files are caller mistakes; anything else is
    /// reported as a transient availability problem.
    pub(crate) fn from_io(path: &Path, err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::InvalidInput => {
                BuildError::InvalidArgument(format!("{}: {}", path.display(), err))
            }
            _ => BuildError::ResourceUnavailable {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

impl From<config::ConfigError> for BuildError {
    fn from(err: config::ConfigError) -> Self {
        BuildError::Config(err.to_string())
    }
}
