//! Common error types for GRK sync

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for GRK operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the GRK crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Registry spreadsheet could not be read or written
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    /// Registry spreadsheet does not carry the expected tab or columns
    #[error("Schema error in {path}: {message}")]
    Schema {
        /// Registry file that failed validation
        path: PathBuf,
        /// What was missing
        message: String,
    },

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Conflicting operation in progress (e.g. a transfer on the same destination)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an I/O error with the path it happened on
    pub fn io_at(path: &std::path::Path, err: std::io::Error) -> Self {
        Error::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.display(), err),
        ))
    }
}
