//! Error taxonomy for filesystem operations.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FsError>;

/// Errors surfaced by backends and the derived-operations engine.
///
/// Mirrors the taxonomy a caller needs to branch on: absence, wrong entity
/// kind, unsupported operation, and the handful of buffered-file specific
/// failures. Anything else a backend raises (network, auth, serialization)
/// is carried unmodified in [`FsError::Backend`].
#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("operation not implemented: {0}")]
    NotImplemented(String),

    #[error("illegal seek")]
    IllegalSeek,

    #[error("operation on closed file")]
    IoClosed,

    #[error("file has been force-flushed, can only close")]
    WriteAfterForce,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl FsError {
    /// True for errors that bulk operations with `on_error = "omit"` should
    /// swallow, and that `exists`/`isfile`/`isdir`/`walk` treat as absence.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            FsError::NotFound(err.to_string())
        } else {
            FsError::Backend(err.into())
        }
    }
}
