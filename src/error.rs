//! Error taxonomy for [`crate::AsyncFile`], per spec §7.
//!
//! Every variant carries the file path so errors are self-describing at the
//! point they surface to a caller, without requiring the caller to add
//! context themselves.

use std::io;
use std::path::PathBuf;

/// Errors raised by [`crate::AsyncFile`] operations.
#[derive(Debug, thiserror::Error)]
pub enum AsyncFileError {
    /// `create`/`open` invoked against an already-open file, or a data-plane
    /// operation invoked against a closed one.
    #[error("{path}: {reason}")]
    State {
        /// File this error concerns.
        path: PathBuf,
        /// Human-readable description of which state rule was violated.
        reason: &'static str,
    },

    /// An offset fell outside `[0, size)`.
    #[error("{path}: offset {offset} out of range for size {size}")]
    Range {
        /// File this error concerns.
        path: PathBuf,
        /// The offending offset.
        offset: u64,
        /// The logical size at the time of the check.
        size: u64,
    },

    /// A read with `throw_on_eof = true` reached end of file before filling
    /// the caller's buffer.
    #[error("{path}: end of file reached before buffer was filled")]
    Eof {
        /// File this error concerns.
        path: PathBuf,
    },

    /// The underlying filesystem or io_uring channel reported a failure.
    #[error("{path}: I/O error: {source}")]
    Io {
        /// File this error concerns.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },

    /// The calling task was interrupted while awaiting completion of an I/O
    /// operation submitted to the channel.
    #[error("{path}: interrupted while awaiting I/O completion")]
    Interrupted {
        /// File this error concerns.
        path: PathBuf,
    },
}

impl AsyncFileError {
    pub(crate) fn state(path: &std::path::Path, reason: &'static str) -> Self {
        Self::State {
            path: path.to_path_buf(),
            reason,
        }
    }

    pub(crate) fn range(path: &std::path::Path, offset: u64, size: u64) -> Self {
        Self::Range {
            path: path.to_path_buf(),
            offset,
            size,
        }
    }

    pub(crate) fn eof(path: &std::path::Path) -> Self {
        Self::Eof {
            path: path.to_path_buf(),
        }
    }

    pub(crate) fn io(path: &std::path::Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::Interrupted {
            return Self::Interrupted {
                path: path.to_path_buf(),
            };
        }
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = core::result::Result<T, AsyncFileError>;
