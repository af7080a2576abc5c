//! buildnet Types - Core types for local build-cluster provisioning
//!
//! buildnet stands up a coordinator container and N worker containers on a
//! shared network, then drives the coordinator's HTTP control plane so every
//! worker is registered as a build executor.
//!
//! ## Key Concepts
//!
//! - **ClusterConfig**: Immutable desired state, built once from defaults
//!   merged with operator overrides
//! - **WorkerSlot**: Name and external port of one worker, derived purely
//!   from its index
//! - **ProvisioningResult**: Per-worker outcome, container and registration
//!   tracked separately
//! - **ExtensionReport**: Installed/failed extension names of one install pass

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod coordinator;
pub mod outcome;
pub mod worker;

pub use config::{
    AdminCredentials, ClusterConfig, ClusterOverrides, ConfigError, CoordinatorConfig,
    Directories, ExtensionConfig, NetworkConfig, Timings, VolumeConfig, WorkerConfig,
};
pub use coordinator::CoordinatorPhase;
pub use outcome::{
    truncate_diagnostic, BatchReport, ExtensionReport, Failure, FailureKind, ProvisioningResult,
    RegistrationOutcome, StepStatus, WorkerOutcome, DIAGNOSTIC_LIMIT,
};
pub use worker::{assigned_port, worker_name, WorkerSlot};
