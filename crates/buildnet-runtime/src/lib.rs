//! buildnet Runtime - Container runtime gateway and SSH trust material
//!
//! The two leaf collaborators of the orchestrator:
//!
//! - [`ContainerRuntime`]: container lifecycle verbs returning a success flag
//!   plus raw output, implemented over the docker CLI by [`DockerCli`]
//! - [`TrustMaterial`]: the shared SSH key pair, implemented by [`KeyStore`]
//!
//! With the `test-utils` feature, `testing` provides in-memory fakes of both.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod docker;
pub mod error;
pub mod gateway;
pub mod trust;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use docker::{docker_group_id, DockerCli};
pub use error::{Result, RuntimeError, TrustError, TrustResult};
pub use gateway::{
    status_is_running, CommandOutput, ContainerRuntime, ContainerSpec, ContainerSummary, Mount,
};
pub use trust::{KeyStore, TrustMaterial};
