//! Error type shared by the overlay, the archive cache and the storages.

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the overlay filesystem.
///
/// Archive-level failures are never cached: the next access to the same
/// archive retries the load from scratch.
#[derive(Debug, Error)]
pub enum Error {
    /// Path or archive entry does not exist.
    #[error("'{path}' not found")]
    NotFound { path: String },

    /// A directory operation was applied to a file.
    #[error("'{path}' is not a directory")]
    NotADirectory { path: String },

    /// A file operation was applied to a directory.
    #[error("'{path}' is a directory")]
    IsADirectory { path: String },

    /// The archive's backing resource could not be opened or read.
    #[error("cannot open archive '{path}': {source}")]
    ArchiveOpen {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The archive's central directory or entry data is malformed.
    #[error("malformed archive '{path}': {reason}")]
    ArchiveFormat { path: String, reason: String },

    /// The underlying storage refused to hand out another handle.
    #[error("no more handles available for '{path}': {source}")]
    ResourceExhausted {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The archive handle was evicted before a lease could be taken.
    #[error("archive '{path}' has been closed")]
    ArchiveClosed { path: String },

    /// Path escapes the filesystem root.
    #[error("invalid path '{path}'")]
    InvalidPath { path: String },

    /// Write attempted on an archive-mounted path.
    #[error("'{path}' is inside an archive and read-only")]
    ReadOnly { path: String },

    /// Any other I/O failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub(crate) fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory { path: path.into() }
    }

    pub(crate) fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory { path: path.into() }
    }

    pub(crate) fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    /// Classify an `io::Error` coming from base storage.
    pub fn from_io(path: impl Into<String>, err: io::Error) -> Self {
        let path = path.into();
        if is_exhaustion(&err) {
            return Self::ResourceExhausted { path, source: err };
        }
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::NotADirectory => Self::NotADirectory { path },
            io::ErrorKind::IsADirectory => Self::IsADirectory { path },
            _ => Self::Io { path, source: err },
        }
    }

    /// Classify a failure to open an archive's backing resource.
    pub(crate) fn archive_open(path: impl Into<String>, err: io::Error) -> Self {
        let path = path.into();
        if is_exhaustion(&err) {
            Self::ResourceExhausted { path, source: err }
        } else {
            Self::ArchiveOpen { path, source: err }
        }
    }

    /// Classify a decoder failure: I/O underneath means the resource is the
    /// problem, anything else is a format error.
    pub(crate) fn from_decoder(path: impl Into<String>, err: anyhow::Error) -> Self {
        let path = path.into();
        match err.downcast::<io::Error>() {
            Ok(io_err) if io_err.kind() == io::ErrorKind::InvalidData => Self::ArchiveFormat {
                path,
                reason: io_err.to_string(),
            },
            Ok(io_err) => Self::archive_open(path, io_err),
            Err(other) => Self::ArchiveFormat {
                path,
                reason: format!("{other:#}"),
            },
        }
    }

    /// True for both a missing path and an archive whose file is missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::ArchiveOpen { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// The path this error refers to.
    pub fn path(&self) -> &str {
        match self {
            Self::NotFound { path }
            | Self::NotADirectory { path }
            | Self::IsADirectory { path }
            | Self::ArchiveOpen { path, .. }
            | Self::ArchiveFormat { path, .. }
            | Self::ResourceExhausted { path, .. }
            | Self::ArchiveClosed { path }
            | Self::InvalidPath { path }
            | Self::ReadOnly { path }
            | Self::Io { path, .. } => path,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::NotFound { .. } => io::ErrorKind::NotFound,
            Error::NotADirectory { .. } => io::ErrorKind::NotADirectory,
            Error::IsADirectory { .. } => io::ErrorKind::IsADirectory,
            Error::ArchiveOpen { source, .. }
            | Error::ResourceExhausted { source, .. }
            | Error::Io { source, .. } => source.kind(),
            Error::ArchiveFormat { .. } => io::ErrorKind::InvalidData,
            Error::ArchiveClosed { .. } => io::ErrorKind::BrokenPipe,
            Error::InvalidPath { .. } => io::ErrorKind::InvalidInput,
            Error::ReadOnly { .. } => io::ErrorKind::PermissionDenied,
        };
        io::Error::new(kind, err)
    }
}

/// EMFILE / ENFILE and allocation failures.
fn is_exhaustion(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::OutOfMemory {
        return true;
    }
    #[cfg(unix)]
    {
        matches!(err.raw_os_error(), Some(23) | Some(24))
    }
    #[cfg(not(unix))]
    {
        false
    }
}
