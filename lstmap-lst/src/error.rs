//! LST-specific error types.

use thiserror::Error;

/// Result type for LST operations.
pub type Result<T> = std::result::Result<T, Error>;

/// LST-specific error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or incomplete file header.
    #[error("invalid LST header: {0}")]
    Format(String),

    /// Invalid detector configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] lstmap_core::Error),
}

impl Error {
    /// True for errors that describe a malformed input file.
    #[must_use]
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::Format(_) | Error::CoreError(lstmap_core::Error::Format(_))
        )
    }

    /// True for errors that describe an unusable detector configuration.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::Json(_) | Error::CoreError(lstmap_core::Error::Config(_))
        )
    }
}
