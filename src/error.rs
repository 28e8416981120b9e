use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for Strata operations
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("Failed to write index file {path}: {source}")]
    IndexWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unknown index mode: {0}")]
    InvalidMode(String),
}

/// Result type alias for Strata operations
pub type Result<T> = std::result::Result<T, StrataError>;
