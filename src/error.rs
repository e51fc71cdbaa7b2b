//! Error types for sstread.

use std::io;
use thiserror::Error;

/// Result type alias for sstread operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for table cache and scan operations.
///
/// Errors are `Clone` so that one failed table open can be delivered to
/// every caller that was waiting on it.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// I/O error from file operations.
    #[error("I/O error: {0}")]
    Io(String),

    /// Data corruption detected.
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid file format or magic number.
    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Invalid argument supplied by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Opening a table (footer, index, filter or properties) failed.
    #[error("Failed to open table {file_number:06}: {source}")]
    TableOpen {
        /// Table that could not be opened.
        file_number: u64,
        /// Underlying cause.
        #[source]
        source: Box<Error>,
    },

    /// Another caller's open of the same table failed while this caller waited.
    #[error("Concurrent open of table {file_number:06} failed: {source}")]
    OpenFailed {
        /// Table that could not be opened.
        file_number: u64,
        /// Error observed by the caller that performed the open.
        #[source]
        source: Box<Error>,
    },

    /// The table was retired while still referenced and no longer accepts lookups.
    #[error("Table {0:06} has been retired")]
    TableRetired(u64),

    /// Iterator used outside its contract.
    #[error("Invalid iterator use: {0}")]
    InvalidIteratorUse(String),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create a corruption error with the given message.
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        Error::Corruption(msg.into())
    }

    /// Create an invalid format error.
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Error::InvalidFormat(msg.into())
    }

    /// Create an invalid iterator use error.
    pub fn invalid_iterator_use<S: Into<String>>(msg: S) -> Self {
        Error::InvalidIteratorUse(msg.into())
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Wrap an error raised while opening a table.
    pub fn table_open(file_number: u64, source: Error) -> Self {
        Error::TableOpen {
            file_number,
            source: Box::new(source),
        }
    }

    /// Check if this error indicates corruption, looking through open wrappers.
    pub fn is_corruption(&self) -> bool {
        match self {
            Error::Corruption(_) | Error::InvalidFormat(_) => true,
            Error::TableOpen { source, .. } | Error::OpenFailed { source, .. } => {
                source.is_corruption()
            }
            _ => false,
        }
    }

    /// The table this error refers to, if any.
    pub fn file_number(&self) -> Option<u64> {
        match self {
            Error::TableOpen { file_number, .. } | Error::OpenFailed { file_number, .. } => {
                Some(*file_number)
            }
            Error::TableRetired(file_number) => Some(*file_number),
            _ => None,
        }
    }
}
