//! CLI error types

use buildnet_control::ControlPlaneError;
use buildnet_orchestrator::{CoordinatorError, PipelineError, WorkerError};
use buildnet_runtime::{RuntimeError, TrustError};
use buildnet_types::ConfigError;
use thiserror::Error;

/// CLI error types
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration file could not be read or written
    #[error("Configuration error: {0}")]
    Config(String),

    /// Loaded configuration is not usable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// A set-up gate failed
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Some workers of a batch were not fully provisioned
    #[error("{succeeded} of {requested} workers provisioned")]
    PartialBatch { succeeded: usize, requested: u32 },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
