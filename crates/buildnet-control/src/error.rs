//! Error types for the control-plane client

use thiserror::Error;

/// Control-plane client error
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// Trust credential could not be registered or verified
    #[error("credential registration failed: {0}")]
    CredentialRegistration(String),

    /// Worker node could not be registered or verified
    #[error("node registration failed: {0}")]
    NodeRegistration(String),

    /// CSRF crumb could not be obtained
    #[error("failed to obtain crumb: {0}")]
    Crumb(String),

    /// Extension listing or install request failed
    #[error("extension request failed: {0}")]
    Extension(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for control-plane operations
pub type Result<T> = std::result::Result<T, ControlPlaneError>;
