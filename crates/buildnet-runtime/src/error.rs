//! Error types for the runtime gateway and trust material

use std::path::PathBuf;
use thiserror::Error;

/// Runtime gateway error
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Container engine is not reachable
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    /// A runtime verb reported failure
    #[error("{verb} failed: {message}")]
    CommandFailed {
        /// Runtime verb (run, stop, rm, ...)
        verb: String,
        /// Truncated runtime output
        message: String,
    },

    /// Container does not exist
    #[error("container not found: {0}")]
    NotFound(String),

    /// Output could not be parsed
    #[error("unexpected runtime output: {0}")]
    Parse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Trust material error
#[derive(Debug, Error)]
pub enum TrustError {
    /// Key pair has not been generated
    #[error("no key pair at {0}")]
    Missing(PathBuf),

    /// Key pair already exists and overwrite was not requested
    #[error("key pair already exists at {0}")]
    AlreadyExists(PathBuf),

    /// Key generation tool failed
    #[error("key generation failed: {0}")]
    Generation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for trust material operations
pub type TrustResult<T> = std::result::Result<T, TrustError>;
