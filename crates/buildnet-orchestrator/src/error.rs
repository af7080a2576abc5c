//! Error types for orchestration

use buildnet_runtime::{RuntimeError, TrustError};
use buildnet_types::{ConfigError, ExtensionReport};
use std::time::Duration;
use thiserror::Error;

/// Coordinator lifecycle error
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Container engine does not answer
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// Coordinator container did not start
    #[error("coordinator deployment failed: {0}")]
    DeploymentFailed(String),

    /// Control plane never answered
    #[error("coordinator not ready after {0:?}")]
    ReadinessTimeout(Duration),

    /// Control plane never answered, so setup could not run
    #[error("coordinator not ready for initial setup after {0:?}")]
    SetupTimeout(Duration),

    /// Setup script could not be placed in the container
    #[error("setup script delivery failed: {0}")]
    ScriptDelivery(String),

    #[error(transparent)]
    Restart(#[from] RestartError),

    /// Some extensions are missing or the coordinator did not come back
    #[error("extension installation incomplete: failed [{}], ready after restart: {}", .0.failed.join(", "), .0.ready_after_restart)]
    ExtensionInstall(ExtensionReport),

    /// Coordinator container is not running
    #[error("coordinator container {0} is not running")]
    NotRunning(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Restart step that failed
#[derive(Debug, Error)]
pub enum RestartError {
    #[error("failed to stop: {0}")]
    StopFailed(String),

    #[error("failed to start: {0}")]
    StartFailed(String),
}

/// Worker operation error
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Trust(#[from] TrustError),

    /// No container with this name
    #[error("worker {0} does not exist")]
    NotFound(String),

    /// Stop failed; the container was left in place
    #[error("failed to stop {name}: {message}")]
    StopFailed { name: String, message: String },

    #[error("failed to remove {name}: {message}")]
    RemoveFailed { name: String, message: String },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sequential step of the set-up-everything pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    RuntimeCheck,
    SharedResources,
    TrustMaterial,
    CoordinatorDeploy,
    Readiness,
    InitialSetup,
    Extensions,
    Workers,
}

impl std::fmt::Display for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Gate::RuntimeCheck => "runtime check",
            Gate::SharedResources => "network and volume",
            Gate::TrustMaterial => "trust material",
            Gate::CoordinatorDeploy => "coordinator deployment",
            Gate::Readiness => "coordinator readiness",
            Gate::InitialSetup => "initial setup",
            Gate::Extensions => "extensions",
            Gate::Workers => "workers",
        };
        f.write_str(name)
    }
}

/// Cause of a failed gate
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A fatal pipeline failure, naming the gate it stopped at
#[derive(Debug, Error)]
#[error("{gate} failed: {source}")]
pub struct PipelineError {
    pub gate: Gate,
    #[source]
    pub source: StageError,
}

impl PipelineError {
    pub fn new(gate: Gate, source: impl Into<StageError>) -> Self {
        Self {
            gate,
            source: source.into(),
        }
    }
}

/// Result type for coordinator operations
pub type CoordinatorResult<T> = std::result::Result<T, CoordinatorError>;

/// Result type for worker operations
pub type WorkerResult<T> = std::result::Result<T, WorkerError>;
