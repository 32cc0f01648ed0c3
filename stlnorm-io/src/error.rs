//! Error types for I/O operations

use thiserror::Error;

/// Errors that can occur during I/O operations
#[derive(Error, Debug)]
pub enum IoError {
    #[error("Invalid file format: {format}")]
    InvalidFormat { format: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Write error: {message}")]
    WriteError { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IoError> for stlnorm_core::Error {
    fn from(err: IoError) -> Self {
        match err {
            IoError::Io(e) => stlnorm_core::Error::Io(e),
            IoError::InvalidFormat { format } => stlnorm_core::Error::UnsupportedFormat(format),
            other => stlnorm_core::Error::InvalidData(other.to_string()),
        }
    }
}
