//! Storage errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while writing scan files.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying file operation failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// File being written.
        path: PathBuf,
        /// OS error.
        #[source]
        source: std::io::Error,
    },

    /// Row width does not match the header.
    #[error("row has {got} values but the header declares {expected} columns")]
    RowWidth {
        /// Header column count.
        expected: usize,
        /// Values in the row.
        got: usize,
    },

    /// Header requested a column the table does not have.
    #[error("column '{0}' is not in the scan table")]
    MissingColumn(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}
