//! buildnet Orchestrator - Cluster bring-up on top of the runtime and control plane
//!
//! - [`CoordinatorManager`]: deploy/start/stop/restart of the coordinator,
//!   readiness polling, first-run script, extension installation
//! - [`WorkerProvisioner`]: sequential worker batches with a single shared
//!   credential gate, worker removal and listing
//! - [`Pipeline`]: the set-up-everything sequence of gates
//!
//! Services are built from an owned [`ClusterConfig`](buildnet_types::ClusterConfig)
//! and trait objects for their collaborators.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod coordinator;
pub mod error;
pub mod pipeline;
pub mod readiness;
pub mod setup_script;
pub mod workers;

pub use coordinator::{CoordinatorManager, DeployOutcome};
pub use error::{
    CoordinatorError, CoordinatorResult, Gate, PipelineError, RestartError, StageError,
    WorkerError, WorkerResult,
};
pub use pipeline::{Pipeline, PipelineReport};
pub use readiness::{wait_for_ready, ReadinessPolicy};
pub use workers::{RemovalOutcome, WorkerProvisioner};
