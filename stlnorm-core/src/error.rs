//! Error types for stlnorm

use thiserror::Error;

/// Main error type for stlnorm operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Result type alias for stlnorm operations
pub type Result<T> = std::result::Result<T, Error>;
