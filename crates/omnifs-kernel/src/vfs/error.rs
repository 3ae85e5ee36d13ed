//! Filesystem error types.

use std::io;
use thiserror::Error;

/// Filesystem error type.
///
/// Every engine operation reports failure through this enum; nothing panics
/// across the engine boundary on expected bad input.
#[derive(Debug, Error)]
pub enum FsError {
    /// Path, parent, user, or volume file missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Name collision on create.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Signature mismatch, truncated header, or corrupt metadata.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Ownership or role check failed.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No contiguous run of free blocks, or a metadata zone is full.
    #[error("out of space: {0}")]
    OutOfSpace(String),

    /// Directory still has entries.
    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// Volume not initialized, or already shut down.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed path or name.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// I/O error on the backing store.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Metadata encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] postcard::Error),
}

/// Error kind, without the message.
///
/// `code()` gives the stable integer result code protocol layers send on the
/// wire; success is `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidFormat,
    PermissionDenied,
    OutOfSpace,
    NotEmpty,
    InvalidState,
    InvalidPath,
    Io,
}

impl ErrorKind {
    /// Result code for this kind.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::NotFound => -1,
            ErrorKind::AlreadyExists => -2,
            ErrorKind::InvalidFormat => -3,
            ErrorKind::PermissionDenied => -4,
            ErrorKind::OutOfSpace => -5,
            ErrorKind::NotEmpty => -6,
            ErrorKind::InvalidState => -7,
            ErrorKind::InvalidPath => -8,
            ErrorKind::Io => -9,
        }
    }
}

impl FsError {
    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// Create an InvalidFormat error.
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create an OutOfSpace error.
    pub fn out_of_space(msg: impl Into<String>) -> Self {
        Self::OutOfSpace(msg.into())
    }

    /// Create a NotEmpty error.
    pub fn not_empty(path: impl Into<String>) -> Self {
        Self::NotEmpty(path.into())
    }

    /// Create an InvalidState error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    /// The kind of this error.
    ///
    /// Codec failures surface as `InvalidFormat`: they only happen when
    /// persisted metadata does not decode.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FsError::NotFound(_) => ErrorKind::NotFound,
            FsError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            FsError::InvalidFormat(_) | FsError::Codec(_) => ErrorKind::InvalidFormat,
            FsError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            FsError::OutOfSpace(_) => ErrorKind::OutOfSpace,
            FsError::NotEmpty(_) => ErrorKind::NotEmpty,
            FsError::InvalidState(_) => ErrorKind::InvalidState,
            FsError::InvalidPath(_) => ErrorKind::InvalidPath,
            FsError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Convert FsError to std::io::Error for compatibility.
impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            FsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            FsError::InvalidFormat(msg) => io::Error::new(io::ErrorKind::InvalidData, msg),
            FsError::PermissionDenied(msg) => io::Error::new(io::ErrorKind::PermissionDenied, msg),
            FsError::OutOfSpace(msg) => io::Error::new(io::ErrorKind::StorageFull, msg),
            FsError::NotEmpty(msg) => io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg),
            FsError::InvalidState(msg) => io::Error::other(msg),
            FsError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            FsError::Io(e) => e,
            FsError::Codec(e) => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}

/// Filesystem result type.
pub type FsResult<T> = Result<T, FsError>;
