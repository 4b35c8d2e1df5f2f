//! Memory document error type.

use thiserror::Error;

/// Errors from the persistent memory document.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("no memory file configured")]
    NotConfigured,

    #[error("memory file {path}: {message}")]
    Io { path: String, message: String },
}
