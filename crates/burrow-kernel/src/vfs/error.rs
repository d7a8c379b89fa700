//! VFS error types.

use std::io;
use thiserror::Error;

/// Coarse error classes every [`VfsError`] falls into.
///
/// Callers that only care about "why did this fail" match on this instead of
/// the full error enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation on a path that does not exist.
    NotFound,
    /// Exclusive create on a path that already exists.
    AlreadyExists,
    /// Jail escape or write against a read-only store.
    AccessDenied,
    /// A child process could not be started.
    SpawnFailed,
    /// Any other read/write/seek failure.
    IoFault,
    /// The backend does not implement the operation.
    Unimplemented,
}

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Access denied (jail escape, read-only store).
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Invalid path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Stream used after `close`.
    #[error("stream is closed")]
    Closed,

    /// Child process could not be started.
    #[error("failed to spawn {command}: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Operation not implemented by this backend.
    #[error("unimplemented: {0}")]
    Unimplemented(&'static str),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create an AccessDenied error.
    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Attach a path to a raw I/O error, promoting "not found" and
    /// "already exists" to their dedicated variants.
    pub fn from_io(path: impl Into<String>, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.into()),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.into()),
            io::ErrorKind::PermissionDenied => Self::AccessDenied(path.into()),
            _ => Self::Io(err),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VfsError::NotFound(_) => ErrorKind::NotFound,
            VfsError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            VfsError::AccessDenied(_) => ErrorKind::AccessDenied,
            VfsError::SpawnFailed { .. } => ErrorKind::SpawnFailed,
            VfsError::Unimplemented(_) => ErrorKind::Unimplemented,
            VfsError::NotADirectory(_)
            | VfsError::IsADirectory(_)
            | VfsError::InvalidPath(_)
            | VfsError::Closed
            | VfsError::Io(_)
            | VfsError::Other(_) => ErrorKind::IoFault,
        }
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::AccessDenied(msg) => io::Error::new(io::ErrorKind::PermissionDenied, msg),
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            VfsError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::Closed => io::Error::new(io::ErrorKind::BrokenPipe, "stream is closed"),
            VfsError::SpawnFailed { source, .. } => source,
            VfsError::Unimplemented(what) => io::Error::new(io::ErrorKind::Unsupported, what),
            VfsError::Io(e) => e,
            VfsError::Other(msg) => io::Error::other(msg),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(VfsError::not_found("a").kind(), ErrorKind::NotFound);
        assert_eq!(VfsError::already_exists("a").kind(), ErrorKind::AlreadyExists);
        assert_eq!(VfsError::access_denied("a").kind(), ErrorKind::AccessDenied);
        assert_eq!(VfsError::Unimplemented("watch").kind(), ErrorKind::Unimplemented);
        assert_eq!(VfsError::Closed.kind(), ErrorKind::IoFault);

        let spawn = VfsError::SpawnFailed {
            command: "nope".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(spawn.kind(), ErrorKind::SpawnFailed);
    }

    #[test]
    fn test_from_io_promotes_kinds() {
        let err = VfsError::from_io("x", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(matches!(err, VfsError::NotFound(p) if p == "x"));

        let err = VfsError::from_io("x", io::Error::other("disk on fire"));
        assert_eq!(err.kind(), ErrorKind::IoFault);
    }

    #[test]
    fn test_into_io_error() {
        let io_err: io::Error = VfsError::access_denied("../etc").into();
        assert_eq!(io_err.kind(), io::ErrorKind::PermissionDenied);
    }
}
