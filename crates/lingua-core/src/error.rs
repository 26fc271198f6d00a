//! Error types for lingua-ci.
//!
//! Nothing here is fatal to a host process: load failures degrade the
//! affected tree, resolution failures degrade one build, and unknown
//! branches are not errors at all (they are silently ignored by the
//! classifier).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Manifest / descriptor loading
    #[error("fetch of {url} failed: {message}")]
    Fetch { url: String, message: String },

    #[error("fetch of {url} timed out after {timeout_ms}ms")]
    FetchTimeout { url: String, timeout_ms: u64 },

    #[error("malformed manifest {path}: {message}")]
    Manifest { path: String, message: String },

    #[error("malformed builds descriptor: {0}")]
    Descriptor(String),

    // Metadata store
    #[error("metadata store error: {0}")]
    Store(String),

    // Infrastructure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
