//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Memory mapping error.
    #[error("memory mapping error: {0}")]
    MmapError(String),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Header or configuration error from the LST layer.
    #[error("LST error: {0}")]
    LstError(#[from] lstmap_lst::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] lstmap_core::Error),

    /// Malformed input search pattern.
    #[error("glob pattern error: {0}")]
    GlobPattern(#[from] glob::PatternError),

    /// Unreadable entry met during input discovery.
    #[error("glob error: {0}")]
    Glob(#[from] glob::GlobError),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

impl Error {
    /// True for errors caused by a malformed or unsupported input file.
    #[must_use]
    pub fn is_format_error(&self) -> bool {
        match self {
            Error::InvalidFormat(_) | Error::CoreError(lstmap_core::Error::Format(_)) => true,
            Error::LstError(err) => err.is_format_error(),
            _ => false,
        }
    }
}
