//! Error types for lstmap-core.

use thiserror::Error;

/// Result type alias for lstmap operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for lstmap operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or inconsistent detector definitions.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed input data.
    #[error("format error: {0}")]
    Format(String),
}
